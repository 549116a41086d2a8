//! Map and set interception.
//!
//! Keys and members are always stored raw: a handle used as a key is reduced
//! to its target, so the same entry is found whether it is addressed through
//! the handle or the raw data. Weak containers track keys by identity and do
//! not support size or iteration.

use tracing::warn;

use super::{Handle, Interceptor};
use crate::error::ReactiveError;
use crate::graph::{DepKey, Operation};
use crate::value::Value;

/// The dependency key a map key or set member is tracked under.
///
/// `None` for weak containers given something that is not an aggregate.
fn member_key(handle: &Handle, member: &Value) -> Option<DepKey> {
    if handle.kind().is_weak() {
        member.raw_target().map(|target| DepKey::Object(target.id()))
    } else {
        Some(DepKey::Entry(member.to_raw()))
    }
}

fn invalid_weak_key(handle: &Handle, op: &'static str) -> bool {
    let err = ReactiveError::InvalidWeakKey { kind: handle.kind() };
    warn!(op, %err, "weak container operation rejected");
    false
}

/// Size and iteration are not available on weak containers.
fn not_enumerable(handle: &Handle, op: &'static str) -> bool {
    if handle.kind().is_weak() {
        handle.unsupported(op);
        true
    } else {
        false
    }
}

/// Shared by both collection kinds: remove a key or member.
fn delete_member(handle: &Handle, member: &Value) -> bool {
    if handle.is_readonly() {
        return handle.reject_write("delete", Some(member));
    }
    let Some(dep_key) = member_key(handle, member) else {
        return false;
    };
    let existed = handle.raw().remove(&member.to_raw());
    if existed {
        handle.trigger(dep_key, Operation::Removed);
    }
    existed
}

fn has_member(handle: &Handle, member: &Value) -> bool {
    let Some(dep_key) = member_key(handle, member) else {
        return false;
    };
    handle.track(dep_key);
    handle.raw().has(&member.to_raw())
}

fn clear_all(handle: &Handle) -> bool {
    if handle.is_readonly() {
        return handle.reject_write("clear", None);
    }
    if handle.kind().is_weak() {
        return handle.unsupported("clear");
    }
    let target = handle.raw();
    if target.is_empty() {
        return false;
    }
    target.clear();
    handle.trigger(DepKey::Iterate, Operation::Clear);
    true
}

// ----------------------------------------------------------------------------
// Maps
// ----------------------------------------------------------------------------

/// Interceptor for maps and weak maps.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapWrapper;

impl Interceptor for MapWrapper {
    fn get(&self, handle: &Handle, key: &Value) -> Value {
        let Some(dep_key) = member_key(handle, key) else {
            return Value::Undefined;
        };
        handle.track(dep_key);

        let raw_key = key.to_raw();
        let target = handle.raw();
        if target.has(&raw_key) {
            handle.wrap_child(target.get(&raw_key))
        } else {
            Value::Undefined
        }
    }

    fn set(&self, handle: &Handle, key: Value, value: Value) -> bool {
        if handle.is_readonly() {
            return handle.reject_write("set", Some(&key));
        }
        let Some(dep_key) = member_key(handle, &key) else {
            return invalid_weak_key(handle, "set");
        };
        let value = handle.store_value(value);
        let raw_key = key.into_raw();
        let target = handle.raw();

        let had_key = target.has(&raw_key);
        let old = target.get(&raw_key);
        if let Err(err) = target.try_set(raw_key, value.clone()) {
            warn!(%err, "map write rejected");
            return false;
        }

        if !had_key {
            handle.trigger(dep_key, Operation::Added);
        } else if old != value {
            handle.trigger(dep_key, Operation::Set);
        }
        true
    }

    fn has(&self, handle: &Handle, key: &Value) -> bool {
        has_member(handle, key)
    }

    fn delete(&self, handle: &Handle, key: &Value) -> bool {
        delete_member(handle, key)
    }

    fn keys(&self, handle: &Handle) -> Vec<Value> {
        if not_enumerable(handle, "keys") {
            return Vec::new();
        }
        handle.track(DepKey::KeyIterate);
        handle
            .raw()
            .keys()
            .into_iter()
            .map(|key| handle.wrap_child(key))
            .collect()
    }

    fn entries(&self, handle: &Handle) -> Vec<(Value, Value)> {
        if not_enumerable(handle, "entries") {
            return Vec::new();
        }
        handle.track(DepKey::Iterate);
        handle
            .raw()
            .entries()
            .into_iter()
            .map(|(key, value)| (handle.wrap_child(key), handle.wrap_child(value)))
            .collect()
    }

    fn len(&self, handle: &Handle) -> usize {
        if not_enumerable(handle, "len") {
            return 0;
        }
        handle.track(DepKey::Iterate);
        handle.raw().len()
    }

    fn clear(&self, handle: &Handle) -> bool {
        clear_all(handle)
    }
}

// ----------------------------------------------------------------------------
// Sets
// ----------------------------------------------------------------------------

/// Interceptor for sets and weak sets.
///
/// Sets have no values to read or write by key; `get` yields undefined and
/// `set` is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetWrapper;

impl Interceptor for SetWrapper {
    fn get(&self, _handle: &Handle, _key: &Value) -> Value {
        Value::Undefined
    }

    fn set(&self, handle: &Handle, _key: Value, _value: Value) -> bool {
        handle.unsupported("set")
    }

    fn add(&self, handle: &Handle, member: Value) -> bool {
        if handle.is_readonly() {
            return handle.reject_write("add", Some(&member));
        }
        let Some(dep_key) = member_key(handle, &member) else {
            return invalid_weak_key(handle, "add");
        };
        match handle.raw().try_add(member.into_raw()) {
            Ok(true) => {
                handle.trigger(dep_key, Operation::Added);
                true
            }
            Ok(false) => false,
            Err(err) => {
                warn!(%err, "set insertion rejected");
                false
            }
        }
    }

    fn has(&self, handle: &Handle, member: &Value) -> bool {
        has_member(handle, member)
    }

    fn delete(&self, handle: &Handle, member: &Value) -> bool {
        delete_member(handle, member)
    }

    fn keys(&self, handle: &Handle) -> Vec<Value> {
        self.entries(handle).into_iter().map(|(member, _)| member).collect()
    }

    fn entries(&self, handle: &Handle) -> Vec<(Value, Value)> {
        if not_enumerable(handle, "entries") {
            return Vec::new();
        }
        handle.track(DepKey::Iterate);
        handle
            .raw()
            .keys()
            .into_iter()
            .map(|member| {
                let member = handle.wrap_child(member);
                (member.clone(), member)
            })
            .collect()
    }

    fn len(&self, handle: &Handle) -> usize {
        if not_enumerable(handle, "len") {
            return 0;
        }
        handle.track(DepKey::Iterate);
        handle.raw().len()
    }

    fn clear(&self, handle: &Handle) -> bool {
        clear_all(handle)
    }
}
