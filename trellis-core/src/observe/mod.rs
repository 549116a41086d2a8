//! Observation Wrappers
//!
//! An observed [`Handle`] stands in front of a raw [`Target`]. Every access
//! made through it is intercepted: reads call [`Runtime::track`], writes
//! update the raw target and then call [`Runtime::trigger`].
//!
//! # Interceptors
//!
//! How an access is intercepted depends on the structural kind of the target,
//! so each handle carries an [`Interceptor`] picked by [`RawKind`]:
//!
//! - [`RecordWrapper`] for records (named properties, prototype delegation);
//! - [`SequenceWrapper`] for sequences (indices and length);
//! - [`MapWrapper`] for maps and weak maps;
//! - [`SetWrapper`] for sets and weak sets.
//!
//! # Wrap modes
//!
//! Two orthogonal flags give four modes. *Readonly* handles record nothing
//! and ignore every write with a warning. *Shallow* handles do not wrap the
//! aggregates they return, and store written values as given.
//!
//! # Identity
//!
//! For one runtime there is at most one live handle per `(target, mode)`;
//! wrapping the same target twice yields the same handle. The cache holds
//! handles weakly, so it never keeps a target alive on its own.

mod base;
mod collection;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use base::{RecordWrapper, SequenceWrapper};
pub use collection::{MapWrapper, SetWrapper};

use crate::config::DEFAULT_MAX_SEQUENCE_GAP;
use crate::error::ReactiveError;
use crate::graph::{DepKey, Operation};
use crate::reactive::{Runtime, WeakRuntime};
use crate::value::{RawKind, Target, TargetId, Value, WeakTarget};

/// Cache size at which dead handles are first swept.
const INITIAL_CACHE_PRUNE: usize = 64;

/// How a handle intercepts access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct WrapMode {
    /// Reads record nothing; writes are ignored.
    pub readonly: bool,
    /// Nested aggregates are returned unwrapped.
    pub shallow: bool,
}

impl WrapMode {
    pub const REACTIVE: WrapMode = WrapMode {
        readonly: false,
        shallow: false,
    };
    pub const SHALLOW_REACTIVE: WrapMode = WrapMode {
        readonly: false,
        shallow: true,
    };
    pub const READONLY: WrapMode = WrapMode {
        readonly: true,
        shallow: false,
    };
    pub const SHALLOW_READONLY: WrapMode = WrapMode {
        readonly: true,
        shallow: true,
    };
}

/// The capability set every wrapper implements.
///
/// Operations a kind does not support (adding to a record, setting a key on
/// a set) log a warning and report failure.
pub trait Interceptor {
    /// Read `key`. Tracks it unless the handle is readonly; wraps aggregates
    /// unless the handle is shallow.
    fn get(&self, handle: &Handle, key: &Value) -> Value;

    /// Write `value` under `key`. Returns whether the write was applied.
    fn set(&self, handle: &Handle, key: Value, value: Value) -> bool;

    /// Insert a set member.
    fn add(&self, handle: &Handle, _member: Value) -> bool {
        handle.unsupported("add")
    }

    fn has(&self, handle: &Handle, key: &Value) -> bool;

    /// Remove `key`. Returns whether it existed.
    fn delete(&self, handle: &Handle, key: &Value) -> bool;

    /// Own keys, in order.
    fn keys(&self, handle: &Handle) -> Vec<Value>;

    /// `(key, value)` pairs, in order.
    fn entries(&self, handle: &Handle) -> Vec<(Value, Value)>;

    fn len(&self, handle: &Handle) -> usize;

    /// Remove everything. Returns whether anything was removed.
    fn clear(&self, handle: &Handle) -> bool;
}

static RECORD: RecordWrapper = RecordWrapper;
static SEQUENCE: SequenceWrapper = SequenceWrapper;
static MAP: MapWrapper = MapWrapper;
static SET: SetWrapper = SetWrapper;

fn interceptor_for(kind: RawKind) -> &'static dyn Interceptor {
    match kind {
        RawKind::Sequence => &SEQUENCE,
        RawKind::Map | RawKind::WeakMap => &MAP,
        RawKind::Set | RawKind::WeakSet => &SET,
        RawKind::Record | RawKind::Unsupported => &RECORD,
    }
}

// ----------------------------------------------------------------------------
// Handle
// ----------------------------------------------------------------------------

pub(crate) struct HandleInner {
    target: Target,
    mode: WrapMode,
    runtime: WeakRuntime,
    interceptor: &'static dyn Interceptor,
}

/// An observed view of a raw target.
///
/// Handles compare and hash by identity. Cloning shares the handle.
#[derive(Clone)]
pub struct Handle(Rc<HandleInner>);

impl Handle {
    /// Read `key`.
    pub fn get(&self, key: impl Into<Value>) -> Value {
        self.0.interceptor.get(self, &key.into())
    }

    /// Write `value` under `key`. Returns whether the write was applied.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> bool {
        self.0.interceptor.set(self, key.into(), value.into())
    }

    /// Insert a member into a set.
    pub fn add(&self, member: impl Into<Value>) -> bool {
        self.0.interceptor.add(self, member.into())
    }

    pub fn has(&self, key: impl Into<Value>) -> bool {
        self.0.interceptor.has(self, &key.into())
    }

    /// Remove `key`. Returns whether it existed.
    pub fn delete(&self, key: impl Into<Value>) -> bool {
        self.0.interceptor.delete(self, &key.into())
    }

    pub fn keys(&self) -> Vec<Value> {
        self.0.interceptor.keys(self)
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, value)| value).collect()
    }

    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.0.interceptor.entries(self)
    }

    /// Call `f` with every `(key, value)` pair.
    pub fn for_each(&self, mut f: impl FnMut(&Value, &Value)) {
        for (key, value) in self.entries() {
            f(&key, &value);
        }
    }

    /// Number of fields, elements, entries or members.
    pub fn len(&self) -> usize {
        self.0.interceptor.len(self)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> bool {
        self.0.interceptor.clear(self)
    }

    /// The raw target behind this handle. Access through it is unobserved.
    pub fn raw(&self) -> &Target {
        &self.0.target
    }

    pub fn mode(&self) -> WrapMode {
        self.0.mode
    }

    pub fn kind(&self) -> RawKind {
        self.0.target.kind()
    }

    pub fn is_reactive(&self) -> bool {
        !self.0.mode.readonly
    }

    pub fn is_readonly(&self) -> bool {
        self.0.mode.readonly
    }

    pub fn is_shallow(&self) -> bool {
        self.0.mode.shallow
    }

    /// The runtime this handle reports to, if it is still alive.
    pub fn runtime(&self) -> Option<Runtime> {
        self.0.runtime.upgrade()
    }

    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    // ---- Interception helpers ----

    pub(crate) fn track(&self, key: DepKey) {
        if self.is_readonly() {
            return;
        }
        if let Some(rt) = self.runtime() {
            rt.track(&self.0.target, key);
        }
    }

    pub(crate) fn trigger(&self, key: DepKey, op: Operation) {
        if let Some(rt) = self.runtime() {
            rt.trigger(&self.0.target, key, op);
        }
    }

    /// Wrap an aggregate read through this handle in the same mode.
    pub(crate) fn wrap_child(&self, value: Value) -> Value {
        if self.is_shallow() {
            return value;
        }
        match (&value, self.runtime()) {
            (Value::Target(_) | Value::Handle(_), Some(rt)) => rt.wrap(value, self.0.mode),
            _ => value,
        }
    }

    /// Reduce a value about to be stored to raw data, unless shallow.
    pub(crate) fn store_value(&self, value: Value) -> Value {
        if self.is_shallow() {
            value
        } else {
            value.into_raw()
        }
    }

    /// Run `f` with tracking paused on this handle's runtime.
    pub(crate) fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        match self.runtime() {
            Some(rt) => rt.untracked(f),
            None => f(),
        }
    }

    /// Report an ignored write on a readonly handle.
    pub(crate) fn reject_write(&self, op: &'static str, key: Option<&Value>) -> bool {
        let warn_enabled = self
            .runtime()
            .map_or(true, |rt| rt.config().warn_on_readonly_write);
        if warn_enabled {
            match key {
                Some(key) => warn!(op, key = %key, kind = ?self.kind(), "write on readonly handle ignored"),
                None => warn!(op, kind = ?self.kind(), "write on readonly handle ignored"),
            }
        }
        false
    }

    /// Report a write the raw target refused.
    pub(crate) fn rejected(&self, op: &'static str, err: &ReactiveError) -> bool {
        warn!(op, kind = ?self.kind(), %err, "write rejected");
        false
    }

    pub(crate) fn max_sequence_gap(&self) -> usize {
        self.runtime()
            .map_or(DEFAULT_MAX_SEQUENCE_GAP, |rt| rt.config().max_sequence_gap)
    }

    /// Report an operation this target kind does not support.
    pub(crate) fn unsupported(&self, op: &'static str) -> bool {
        warn!(op, kind = ?self.kind(), "operation not supported on this target");
        false
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("kind", &self.kind())
            .field("mode", &self.0.mode)
            .field("target", &format_args!("{:#x}", self.0.target.id()))
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Identity cache
// ----------------------------------------------------------------------------

struct CachedHandle {
    witness: WeakTarget,
    handle: Weak<HandleInner>,
}

/// Side table from `(target, mode)` to the live handle for it.
pub(crate) struct HandleCache {
    entries: RefCell<HashMap<(TargetId, WrapMode), CachedHandle>>,
    prune_at: Cell<usize>,
}

impl Default for HandleCache {
    fn default() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            prune_at: Cell::new(INITIAL_CACHE_PRUNE),
        }
    }
}

impl HandleCache {
    fn get_or_create(&self, runtime: &Runtime, target: &Target, mode: WrapMode) -> Handle {
        let key = (target.id(), mode);
        let mut entries = self.entries.borrow_mut();
        if let Some(inner) = entries.get(&key).and_then(|cached| cached.handle.upgrade()) {
            return Handle(inner);
        }

        if entries.len() >= self.prune_at.get() {
            entries.retain(|_, cached| cached.handle.strong_count() > 0);
            self.prune_at
                .set((entries.len() * 2).max(INITIAL_CACHE_PRUNE));
            debug!(remaining = entries.len(), "pruned handle cache");
        }

        let inner = Rc::new(HandleInner {
            target: target.clone(),
            mode,
            runtime: runtime.downgrade(),
            interceptor: interceptor_for(target.kind()),
        });
        entries.insert(
            key,
            CachedHandle {
                witness: target.downgrade(),
                handle: Rc::downgrade(&inner),
            },
        );
        Handle(inner)
    }

    /// Drop entries whose handle or target is gone.
    pub(crate) fn prune(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|_, cached| cached.witness.is_alive() && cached.handle.strong_count() > 0);
        before - entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

// ----------------------------------------------------------------------------
// Wrap factory
// ----------------------------------------------------------------------------

impl Runtime {
    /// Deep, mutable observed handle.
    pub fn reactive(&self, target: impl Into<Target>) -> Handle {
        self.wrap_target(&target.into(), WrapMode::REACTIVE)
    }

    /// Mutable handle that tracks only its own top-level keys.
    pub fn shallow_reactive(&self, target: impl Into<Target>) -> Handle {
        self.wrap_target(&target.into(), WrapMode::SHALLOW_REACTIVE)
    }

    /// Deep handle that ignores writes and records nothing.
    pub fn readonly(&self, target: impl Into<Target>) -> Handle {
        self.wrap_target(&target.into(), WrapMode::READONLY)
    }

    pub fn shallow_readonly(&self, target: impl Into<Target>) -> Handle {
        self.wrap_target(&target.into(), WrapMode::SHALLOW_READONLY)
    }

    /// The handle for `(target, mode)`, reusing a live one if it exists.
    pub fn wrap_target(&self, target: &Target, mode: WrapMode) -> Handle {
        self.handles().get_or_create(self, target, mode)
    }

    /// Wrap any value.
    ///
    /// Raw targets are wrapped, handles are re-wrapped around their raw
    /// target (a readonly handle asked to become mutable is returned as is),
    /// and everything else comes back unchanged.
    pub fn wrap(&self, value: impl Into<Value>, mode: WrapMode) -> Value {
        match value.into() {
            Value::Target(target) => Value::Handle(self.wrap_target(&target, mode)),
            Value::Handle(handle) if handle.is_readonly() && !mode.readonly => {
                Value::Handle(handle)
            }
            Value::Handle(handle) => Value::Handle(self.wrap_target(handle.raw(), mode)),
            other => other,
        }
    }

    /// Number of handles in the identity cache, live or not yet pruned.
    pub fn cached_handle_count(&self) -> usize {
        self.handles().len()
    }
}

// ----------------------------------------------------------------------------
// Flag queries
// ----------------------------------------------------------------------------

/// Whether `value` is a mutable observed handle.
pub fn is_reactive(value: &Value) -> bool {
    value.as_handle().is_some_and(Handle::is_reactive)
}

/// Whether `value` is a readonly observed handle.
pub fn is_readonly(value: &Value) -> bool {
    value.as_handle().is_some_and(Handle::is_readonly)
}

/// Whether `value` is any observed handle.
pub fn is_proxy(value: &Value) -> bool {
    value.as_handle().is_some()
}

/// The raw data behind `value`.
pub fn to_raw(value: &Value) -> Value {
    value.to_raw()
}
