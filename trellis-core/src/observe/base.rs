//! Record and sequence interception.

use super::{Handle, Interceptor};
use crate::error::ReactiveError;
use crate::graph::{DepKey, Operation};
use crate::value::{resize_sequence, write_index, SeqKey, Target, Value};

// ----------------------------------------------------------------------------
// Records
// ----------------------------------------------------------------------------

/// Interceptor for records.
///
/// Reads of keys the record does not own fall through to its prototype; if
/// the prototype is itself observed, the read is tracked there as well.
/// Writes always land on the record that received them, and only that
/// record's subscribers are notified.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordWrapper;

impl RecordWrapper {
    /// Write `key` with an explicit receiver.
    ///
    /// `handle` is the handle whose interceptor is running, `receiver` the
    /// record the write was addressed to. When the handle's own target lacks
    /// the key and its prototype is observed, the write is routed through the
    /// prototype's handle; the value still ends up on `receiver`. Subscribers
    /// are notified only by the handle whose target is the receiver.
    pub fn set_on(handle: &Handle, key: Value, value: Value, receiver: &Target) -> bool {
        if handle.is_readonly() {
            return handle.reject_write("set", Some(&key));
        }
        let value = handle.store_value(value);
        let target = handle.raw();
        let owns = target.ptr_eq(receiver);
        let had_key = receiver.has_own(&key);
        let old = if had_key {
            receiver.get(&key)
        } else {
            Value::Undefined
        };

        let written = match observed_proto(target) {
            Some(proto) if !target.has_own(&key) => {
                Self::set_on(&proto, key.clone(), value.clone(), receiver)
            }
            _ => receiver.set(key.clone(), value.clone()),
        };

        if written && owns {
            let name = key.to_property_key();
            if !had_key {
                handle.trigger(DepKey::Prop(name), Operation::Added);
            } else if old != value {
                handle.trigger(DepKey::Prop(name), Operation::Set);
            }
        }
        written
    }
}

/// The prototype of a record, if it is an observed record handle.
fn observed_proto(target: &Target) -> Option<Handle> {
    match target {
        Target::Record(record) => match record.borrow().proto() {
            Some(Value::Handle(proto)) => Some(proto.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn raw_proto(target: &Target) -> Option<Value> {
    match target {
        Target::Record(record) => record.borrow().proto().cloned(),
        _ => None,
    }
}

impl Interceptor for RecordWrapper {
    fn get(&self, handle: &Handle, key: &Value) -> Value {
        let target = handle.raw();
        handle.track(DepKey::Prop(key.to_property_key()));

        let value = if target.has_own(key) {
            target.get(key)
        } else {
            match raw_proto(target) {
                Some(Value::Handle(proto)) => proto.get(key.clone()),
                Some(proto) => proto
                    .raw_target()
                    .map(|proto| proto.get(key))
                    .unwrap_or_default(),
                None => Value::Undefined,
            }
        };
        handle.wrap_child(value)
    }

    fn set(&self, handle: &Handle, key: Value, value: Value) -> bool {
        Self::set_on(handle, key, value, handle.raw())
    }

    fn has(&self, handle: &Handle, key: &Value) -> bool {
        let target = handle.raw();
        handle.track(DepKey::Prop(key.to_property_key()));
        if target.has_own(key) {
            return true;
        }
        match raw_proto(target) {
            Some(Value::Handle(proto)) => proto.has(key.clone()),
            Some(proto) => proto.raw_target().is_some_and(|proto| proto.has(key)),
            None => false,
        }
    }

    fn delete(&self, handle: &Handle, key: &Value) -> bool {
        if handle.is_readonly() {
            return handle.reject_write("delete", Some(key));
        }
        let existed = handle.raw().remove(key);
        if existed {
            handle.trigger(DepKey::Prop(key.to_property_key()), Operation::Removed);
        }
        existed
    }

    fn keys(&self, handle: &Handle) -> Vec<Value> {
        handle.track(DepKey::Iterate);
        handle.raw().keys()
    }

    fn entries(&self, handle: &Handle) -> Vec<(Value, Value)> {
        self.keys(handle)
            .into_iter()
            .map(|key| {
                let value = self.get(handle, &key);
                (key, value)
            })
            .collect()
    }

    fn len(&self, handle: &Handle) -> usize {
        handle.track(DepKey::Iterate);
        handle.raw().len()
    }

    fn clear(&self, handle: &Handle) -> bool {
        if handle.is_readonly() {
            return handle.reject_write("clear", None);
        }
        let keys = handle.raw().keys();
        let mut removed = false;
        for key in keys {
            removed |= self.delete(handle, &key);
        }
        removed
    }
}

// ----------------------------------------------------------------------------
// Sequences
// ----------------------------------------------------------------------------

/// Interceptor for sequences.
///
/// Elements are tracked per index and the length separately. Enumeration
/// observes the length. The length-changing mutators below run with tracking
/// paused: their internal reads are bookkeeping, not dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceWrapper;

impl SequenceWrapper {
    fn set_index(handle: &Handle, index: usize, value: Value) -> bool {
        if handle.is_readonly() {
            return handle.reject_write("set", Some(&Value::from(index)));
        }
        let value = handle.store_value(value);
        let Target::Sequence(items) = handle.raw() else {
            return false;
        };

        let written = {
            let mut items = items.borrow_mut();
            let added = index >= items.len();
            let old = items.get(index).cloned().unwrap_or_default();
            write_index(&mut items, index, value.clone(), handle.max_sequence_gap())
                .map(|()| (added, old))
        };
        let (added, old) = match written {
            Ok(applied) => applied,
            Err(err) => return handle.rejected("set", &err),
        };

        if added {
            handle.trigger(DepKey::Index(index), Operation::Added);
        } else if old != value {
            handle.trigger(DepKey::Index(index), Operation::Set);
        }
        true
    }

    /// Truncate or pad the sequence to `len`.
    fn set_len(handle: &Handle, len: usize) -> bool {
        if handle.is_readonly() {
            return handle.reject_write("set_len", Some(&Value::from(len)));
        }
        let Target::Sequence(items) = handle.raw() else {
            return false;
        };

        let resized = {
            let mut items = items.borrow_mut();
            let changed = items.len() != len;
            resize_sequence(&mut items, len, handle.max_sequence_gap()).map(|()| changed)
        };
        let changed = match resized {
            Ok(changed) => changed,
            Err(err) => return handle.rejected("set_len", &err),
        };
        if changed {
            handle.trigger(DepKey::Length, Operation::Set);
        }
        true
    }

    /// Replace the whole contents, writing element by element so only the
    /// slots that actually change notify.
    fn rewrite(handle: &Handle, items: Vec<Value>) {
        let len = items.len();
        for (index, value) in items.into_iter().enumerate() {
            Self::set_index(handle, index, value);
        }
        Self::set_len(handle, len);
    }

    fn raw_items(handle: &Handle) -> Vec<Value> {
        match handle.raw() {
            Target::Sequence(items) => items.borrow().clone(),
            _ => Vec::new(),
        }
    }

    /// Search the sequence, first comparing wrapped elements, then raw ones.
    fn search(handle: &Handle, needle: &Value, from_end: bool) -> Option<usize> {
        let wrapped: Vec<Value> = (0..self_len(handle))
            .map(|index| SequenceWrapper.get(handle, &Value::from(index)))
            .collect();
        let found = position(&wrapped, needle, from_end);
        if found.is_some() {
            return found;
        }
        let needle = needle.to_raw();
        position(&Self::raw_items(handle), &needle, from_end)
    }
}

fn self_len(handle: &Handle) -> usize {
    SequenceWrapper.len(handle)
}

fn position(items: &[Value], needle: &Value, from_end: bool) -> Option<usize> {
    if from_end {
        items.iter().rposition(|item| item == needle)
    } else {
        items.iter().position(|item| item == needle)
    }
}

impl Interceptor for SequenceWrapper {
    fn get(&self, handle: &Handle, key: &Value) -> Value {
        match SeqKey::parse(key) {
            SeqKey::Index(index) => {
                handle.track(DepKey::Index(index));
                handle.wrap_child(handle.raw().get(key))
            }
            SeqKey::Length => {
                handle.track(DepKey::Length);
                Value::from(handle.raw().len())
            }
            SeqKey::Other => Value::Undefined,
        }
    }

    fn set(&self, handle: &Handle, key: Value, value: Value) -> bool {
        match SeqKey::parse(&key) {
            SeqKey::Index(index) => Self::set_index(handle, index, value),
            SeqKey::Length => match value.as_length() {
                Some(len) => Self::set_len(handle, len),
                None => {
                    let err = ReactiveError::InvalidLength {
                        value: value.to_string(),
                    };
                    handle.rejected("set_len", &err)
                }
            },
            SeqKey::Other => handle.unsupported("set"),
        }
    }

    fn has(&self, handle: &Handle, key: &Value) -> bool {
        match SeqKey::parse(key) {
            SeqKey::Index(index) => {
                handle.track(DepKey::Index(index));
                index < handle.raw().len()
            }
            SeqKey::Length => true,
            SeqKey::Other => false,
        }
    }

    fn delete(&self, handle: &Handle, key: &Value) -> bool {
        if handle.is_readonly() {
            return handle.reject_write("delete", Some(key));
        }
        let SeqKey::Index(index) = SeqKey::parse(key) else {
            return false;
        };
        let existed = handle.raw().remove(key);
        if existed {
            handle.trigger(DepKey::Index(index), Operation::Removed);
        }
        existed
    }

    fn keys(&self, handle: &Handle) -> Vec<Value> {
        (0..self.len(handle)).map(Value::from).collect()
    }

    fn entries(&self, handle: &Handle) -> Vec<(Value, Value)> {
        (0..self.len(handle))
            .map(|index| {
                let key = Value::from(index);
                let value = self.get(handle, &key);
                (key, value)
            })
            .collect()
    }

    fn len(&self, handle: &Handle) -> usize {
        handle.track(DepKey::Length);
        handle.raw().len()
    }

    fn clear(&self, handle: &Handle) -> bool {
        let had_items = !handle.raw().is_empty();
        Self::set_len(handle, 0) && had_items
    }
}

// ----------------------------------------------------------------------------
// Sequence methods on handles
// ----------------------------------------------------------------------------

impl Handle {
    fn as_sequence(&self, op: &'static str) -> bool {
        if matches!(self.raw(), Target::Sequence(_)) {
            true
        } else {
            self.unsupported(op)
        }
    }

    /// Append values. Returns the new length.
    pub fn push<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> usize {
        if !self.as_sequence("push") {
            return 0;
        }
        if self.is_readonly() {
            self.reject_write("push", None);
            return self.raw().len();
        }
        self.untracked(|| {
            for value in values {
                let next = self.raw().len();
                SequenceWrapper::set_index(self, next, value.into());
            }
            self.raw().len()
        })
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Value {
        if !self.as_sequence("pop") {
            return Value::Undefined;
        }
        if self.is_readonly() {
            self.reject_write("pop", None);
            return Value::Undefined;
        }
        self.untracked(|| {
            let len = self.raw().len();
            if len == 0 {
                return Value::Undefined;
            }
            let last = SequenceWrapper.get(self, &Value::from(len - 1));
            SequenceWrapper::set_len(self, len - 1);
            last
        })
    }

    /// Remove and return the first element, moving the rest down.
    pub fn shift(&self) -> Value {
        if !self.as_sequence("shift") {
            return Value::Undefined;
        }
        if self.is_readonly() {
            self.reject_write("shift", None);
            return Value::Undefined;
        }
        self.untracked(|| {
            let mut items = SequenceWrapper::raw_items(self);
            if items.is_empty() {
                return Value::Undefined;
            }
            let first = self.wrap_child(items.remove(0));
            SequenceWrapper::rewrite(self, items);
            first
        })
    }

    /// Insert values at the front. Returns the new length.
    pub fn unshift<V: Into<Value>>(&self, values: impl IntoIterator<Item = V>) -> usize {
        if !self.as_sequence("unshift") {
            return 0;
        }
        if self.is_readonly() {
            self.reject_write("unshift", None);
            return self.raw().len();
        }
        self.untracked(|| {
            let mut items: Vec<Value> = values.into_iter().map(Into::into).collect();
            if items.is_empty() {
                return self.raw().len();
            }
            items.extend(SequenceWrapper::raw_items(self));
            let len = items.len();
            SequenceWrapper::rewrite(self, items);
            len
        })
    }

    /// Remove `delete_count` elements starting at `start` and insert `items`
    /// in their place. Returns the removed elements.
    pub fn splice<V: Into<Value>>(
        &self,
        start: usize,
        delete_count: usize,
        items: impl IntoIterator<Item = V>,
    ) -> Vec<Value> {
        if !self.as_sequence("splice") {
            return Vec::new();
        }
        if self.is_readonly() {
            self.reject_write("splice", None);
            return Vec::new();
        }
        self.untracked(|| {
            let mut current = SequenceWrapper::raw_items(self);
            let start = start.min(current.len());
            let end = start.saturating_add(delete_count).min(current.len());
            let removed: Vec<Value> = current
                .splice(start..end, items.into_iter().map(Into::into))
                .collect();
            SequenceWrapper::rewrite(self, current);
            removed
                .into_iter()
                .map(|value| self.wrap_child(value))
                .collect()
        })
    }

    /// Set the length, truncating or padding with undefined.
    pub fn set_len(&self, len: usize) -> bool {
        self.as_sequence("set_len") && SequenceWrapper::set_len(self, len)
    }

    /// Whether the sequence contains `needle`, comparing wrapped elements
    /// first and raw elements second.
    pub fn includes(&self, needle: impl Into<Value>) -> bool {
        self.index_of(needle).is_some()
    }

    pub fn index_of(&self, needle: impl Into<Value>) -> Option<usize> {
        if !self.as_sequence("index_of") {
            return None;
        }
        SequenceWrapper::search(self, &needle.into(), false)
    }

    pub fn last_index_of(&self, needle: impl Into<Value>) -> Option<usize> {
        if !self.as_sequence("last_index_of") {
            return None;
        }
        SequenceWrapper::search(self, &needle.into(), true)
    }
}
