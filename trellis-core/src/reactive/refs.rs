//! Scalar References
//!
//! A [`Ref`] is an observable single slot. It either owns its slot (a
//! reactive record with one `value` field, see [`Runtime::ref_`]) or points
//! at a field of an existing handle ([`Runtime::to_ref`]), in which case
//! reads and writes go straight to that field and nothing is copied.
//!
//! [`ProxyRefs`] is a facade over a record holding a mix of refs and plain
//! values: reads unwrap refs, writes to a ref slot go through the ref.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::runtime::Runtime;
use crate::observe::Handle;
use crate::value::{Target, Value};

const VALUE_KEY: &str = "value";

enum RefInner {
    /// Owns a reactive `{ value }` record.
    Cell(Handle),
    /// Delegates to `source[key]`.
    Property { source: Handle, key: Value },
}

/// An observable reference to a single value.
///
/// # Example
///
/// ```rust
/// use trellis_core::{Runtime, Target, Value};
///
/// let rt = Runtime::new();
/// let state = rt.reactive(Target::record([("foo", 1)]));
/// let foo = rt.to_ref(&state, "foo");
///
/// foo.set(2);
/// assert_eq!(state.get("foo"), Value::from(2));
///
/// state.set("foo", 3);
/// assert_eq!(foo.get(), Value::from(3));
/// ```
#[derive(Clone)]
pub struct Ref(Rc<RefInner>);

impl Ref {
    /// Read the value, tracking the underlying field.
    pub fn get(&self) -> Value {
        match &*self.0 {
            RefInner::Cell(cell) => cell.get(VALUE_KEY),
            RefInner::Property { source, key } => source.get(key.clone()),
        }
    }

    /// Write the value. Returns whether the write was applied.
    pub fn set(&self, value: impl Into<Value>) -> bool {
        match &*self.0 {
            RefInner::Cell(cell) => cell.set(VALUE_KEY, value),
            RefInner::Property { source, key } => source.set(key.clone(), value),
        }
    }

    /// Read the value without tracking it.
    pub fn peek(&self) -> Value {
        self.handle().untracked(|| self.get())
    }

    /// The handle the value lives in.
    pub fn handle(&self) -> &Handle {
        match &*self.0 {
            RefInner::Cell(cell) => cell,
            RefInner::Property { source, .. } => source,
        }
    }

    /// Whether this ref points at a field of another handle.
    pub fn is_property(&self) -> bool {
        matches!(&*self.0, RefInner::Property { .. })
    }

    pub fn ptr_eq(&self, other: &Ref) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Ref {}

impl Hash for Ref {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            RefInner::Cell(cell) => f.debug_tuple("Ref").field(cell).finish(),
            RefInner::Property { source, key } => f
                .debug_struct("Ref")
                .field("source", source)
                .field("key", key)
                .finish(),
        }
    }
}

/// Whether `value` is a [`Ref`].
pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// The value behind a ref, or `value` itself if it is not one.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(reference) => reference.get(),
        other => other.clone(),
    }
}

/// Record facade that unwraps refs on read and writes through them.
#[derive(Clone, Debug)]
pub struct ProxyRefs {
    source: Value,
}

impl ProxyRefs {
    /// Wrap `source`, a raw record or a handle. Anything else reads as empty.
    pub fn new(source: impl Into<Value>) -> Self {
        Self {
            source: source.into(),
        }
    }

    fn read(&self, key: &Value) -> Value {
        match &self.source {
            Value::Handle(handle) => handle.get(key.clone()),
            Value::Target(target) => target.get(key),
            _ => Value::Undefined,
        }
    }

    /// Read `key`; a ref stored there is unwrapped.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        unref(&self.read(&key.into()))
    }

    /// Write `key`. If the slot holds a ref the value is written through it,
    /// otherwise the slot is replaced.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> bool {
        let key = key.into();
        if let Value::Ref(reference) = self.read(&key) {
            return reference.set(value);
        }
        match &self.source {
            Value::Handle(handle) => handle.set(key, value),
            Value::Target(target) => target.set(key, value),
            _ => false,
        }
    }

    pub fn keys(&self) -> Vec<Value> {
        match &self.source {
            Value::Handle(handle) => handle.keys(),
            Value::Target(target) => target.keys(),
            _ => Vec::new(),
        }
    }

    /// The wrapped record.
    pub fn source(&self) -> &Value {
        &self.source
    }
}

impl Runtime {
    /// A new reference holding `value`. Aggregates are read back wrapped.
    pub fn ref_(&self, value: impl Into<Value>) -> Ref {
        let cell = self.reactive(Target::record([(VALUE_KEY, value.into())]));
        Ref(Rc::new(RefInner::Cell(cell)))
    }

    /// A reference to `source[key]`.
    pub fn to_ref(&self, source: &Handle, key: impl Into<Value>) -> Ref {
        Ref(Rc::new(RefInner::Property {
            source: source.clone(),
            key: key.into(),
        }))
    }

    /// A raw record mapping every key of `source` to a reference to it.
    pub fn to_refs(&self, source: &Handle) -> Target {
        let refs = Target::empty_record();
        for key in source.keys() {
            let reference = self.to_ref(source, key.clone());
            refs.set(key, reference);
        }
        refs
    }

    /// See [`ProxyRefs`].
    pub fn proxy_refs(&self, source: impl Into<Value>) -> ProxyRefs {
        ProxyRefs::new(source)
    }
}
