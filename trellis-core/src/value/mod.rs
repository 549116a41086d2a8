//! Data Model
//!
//! Everything the engine observes is expressed as a [`Value`]: primitives,
//! raw aggregates ([`Target`]), observed handles and scalar references.
//!
//! # Equality
//!
//! Values compare with *SameValueZero* semantics. Numbers compare numerically
//! except that NaN equals NaN; `0.0` and `-0.0` are the same value. Aggregates,
//! handles and references compare by identity. `Hash` agrees with this, so
//! any value can be a map key or set member.

mod json;
mod kind;
mod target;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::rc::Rc;

pub use kind::RawKind;
pub use target::{Record, Target, TargetId, WeakTable, WeakTarget};

pub(crate) use target::{resize_sequence, write_index};

use crate::observe::Handle;
use crate::reactive::Ref;

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    /// A raw aggregate. Reads and writes through it are never observed.
    Target(Target),
    /// An observed handle around a raw aggregate.
    Handle(Handle),
    /// A scalar reference.
    Ref(Ref),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Target(_) | Value::Handle(_) | Value::Ref(_) => true,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Target(target) => Some(target),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            Value::Handle(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Ref> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Interpret the value as a sequence index.
    ///
    /// Accepts integral numbers in `0..=MAX_INDEX` and canonical decimal
    /// strings (`"0"`, `"12"`, but not `"01"`). Anything larger is an
    /// ordinary property name.
    pub fn as_index(&self) -> Option<usize> {
        self.as_bounded(MAX_INDEX)
    }

    /// Interpret the value as a sequence length, at most `MAX_LENGTH`.
    pub fn as_length(&self) -> Option<usize> {
        self.as_bounded(MAX_LENGTH)
    }

    fn as_bounded(&self, max: usize) -> Option<usize> {
        match self {
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= max as f64 => {
                Some(*n as usize)
            }
            Value::Str(s) => parse_index(s).filter(|&n| n <= max),
            _ => None,
        }
    }

    /// The raw aggregate behind this value, unwrapping observed handles.
    pub fn raw_target(&self) -> Option<Target> {
        match self {
            Value::Target(target) => Some(target.clone()),
            Value::Handle(handle) => Some(handle.raw().clone()),
            _ => None,
        }
    }

    /// Reduce an observed handle to its raw target. Other values are
    /// returned unchanged.
    pub fn to_raw(&self) -> Value {
        match self {
            Value::Handle(handle) => Value::Target(handle.raw().clone()),
            other => other.clone(),
        }
    }

    pub fn into_raw(self) -> Value {
        match self {
            Value::Handle(handle) => Value::Target(handle.raw().clone()),
            other => other,
        }
    }

    /// Structural kind, see [`RawKind::of`].
    pub fn kind(&self) -> RawKind {
        RawKind::of(self)
    }

    /// Convert to a record property name.
    pub fn to_property_key(&self) -> Rc<str> {
        match self {
            Value::Str(s) => s.clone(),
            other => Rc::from(other.to_string()),
        }
    }
}

/// Largest index a sequence can be addressed with.
pub const MAX_INDEX: usize = 4_294_967_294;

/// Largest length a sequence can be given.
pub const MAX_LENGTH: usize = 4_294_967_295;

/// How a key addresses a sequence.
pub(crate) enum SeqKey {
    Index(usize),
    Length,
    Other,
}

impl SeqKey {
    pub(crate) fn parse(key: &Value) -> Self {
        if let Some(index) = key.as_index() {
            SeqKey::Index(index)
        } else if key.as_str() == Some("length") {
            SeqKey::Length
        } else {
            SeqKey::Other
        }
    }
}

fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok().and_then(|n| usize::try_from(n).ok())
}

fn format_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{n}")
    }
}

// ----------------------------------------------------------------------------
// Equality
// ----------------------------------------------------------------------------

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Target(a), Value::Target(b)) => a == b,
            (Value::Handle(a), Value::Handle(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(self).hash(state);
        match self {
            Value::Undefined | Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Number(n) => {
                let bits = if n.is_nan() {
                    f64::NAN.to_bits()
                } else if *n == 0.0 {
                    0.0f64.to_bits()
                } else {
                    n.to_bits()
                };
                bits.hash(state);
            }
            Value::Str(s) => s.hash(state),
            Value::Target(target) => target.hash(state),
            Value::Handle(handle) => handle.hash(state),
            Value::Ref(r) => r.hash(state),
        }
    }
}

// ----------------------------------------------------------------------------
// Formatting
// ----------------------------------------------------------------------------

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => format_number(*n, f),
            Value::Str(s) => f.write_str(s),
            Value::Target(target) => write!(f, "[{:?}]", target.kind()),
            Value::Handle(handle) => write!(f, "[{:?} handle]", handle.raw().kind()),
            Value::Ref(_) => f.write_str("[ref]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Target(target) => fmt::Debug::fmt(target, f),
            Value::Handle(handle) => fmt::Debug::fmt(handle, f),
            Value::Ref(r) => fmt::Debug::fmt(r, f),
        }
    }
}

// ----------------------------------------------------------------------------
// Conversions
// ----------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Target> for Value {
    fn from(target: Target) -> Self {
        Value::Target(target)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Target(Target::from_record(record))
    }
}

impl From<Handle> for Value {
    fn from(handle: Handle) -> Self {
        Value::Handle(handle)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Value::Ref(r)
    }
}

impl From<&Value> for Value {
    fn from(value: &Value) -> Self {
        value.clone()
    }
}
