//! Raw Targets
//!
//! A target is a mutable aggregate owned by the application. The engine never
//! takes exclusive ownership: it only wraps targets in observed handles and
//! identifies them by allocation address.
//!
//! The methods here are the *raw* operations. They never track or trigger;
//! the observation wrappers build on top of them.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};
use tracing::warn;

use super::{RawKind, SeqKey, Value, MAX_LENGTH};
use crate::config::DEFAULT_MAX_SEQUENCE_GAP;
use crate::error::{ReactiveError, Result};

/// Identity of a target: the address of its allocation.
///
/// Stable for as long as a strong or weak reference to the target exists.
pub type TargetId = usize;

/// A weak witness of a target allocation.
///
/// Holding one keeps the address reserved, so a [`TargetId`] recorded next to
/// it can never be reused by a different target.
#[derive(Clone)]
pub struct WeakTarget(Weak<dyn Any>);

impl WeakTarget {
    /// Whether the target is still referenced by anyone.
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for WeakTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakTarget")
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Record
// ----------------------------------------------------------------------------

/// A plain record: ordered named fields plus an optional prototype.
///
/// Reads of absent keys fall through to the prototype, which may be a raw
/// record or an observed record handle.
#[derive(Clone, Default)]
pub struct Record {
    fields: IndexMap<Rc<str>, Value>,
    proto: Option<Value>,
}

impl Record {
    /// Create an empty record without a prototype.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record that delegates absent keys to `proto`.
    pub fn with_proto(proto: impl Into<Value>) -> Self {
        Self {
            fields: IndexMap::new(),
            proto: Some(proto.into()),
        }
    }

    /// Insert or replace an own field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<Rc<str>>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Own field lookup. Does not consult the prototype.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Remove an own field, preserving the order of the remaining ones.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    /// Own field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Rc<str>> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn proto(&self) -> Option<&Value> {
        self.proto.as_ref()
    }

    pub fn set_proto(&mut self, proto: Option<Value>) {
        self.proto = proto;
    }

    pub(crate) fn clear(&mut self) {
        self.fields.clear();
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<Rc<str>>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            proto: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Weak tables
// ----------------------------------------------------------------------------

struct WeakEntry<V> {
    key: WeakTarget,
    value: V,
}

/// Storage for weak containers: entries keyed by target identity.
///
/// Keys are held weakly and entries whose key died are pruned on insert.
pub struct WeakTable<V> {
    entries: HashMap<TargetId, WeakEntry<V>>,
}

impl<V> Default for WeakTable<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V> WeakTable<V> {
    fn live(&self, id: TargetId) -> Option<&WeakEntry<V>> {
        self.entries.get(&id).filter(|entry| entry.key.is_alive())
    }

    pub fn get(&self, key: &Target) -> Option<&V> {
        self.live(key.id()).map(|entry| &entry.value)
    }

    pub fn contains(&self, key: &Target) -> bool {
        self.live(key.id()).is_some()
    }

    pub fn insert(&mut self, key: &Target, value: V) -> Option<V> {
        self.prune();
        self.entries
            .insert(
                key.id(),
                WeakEntry {
                    key: key.downgrade(),
                    value,
                },
            )
            .map(|entry| entry.value)
    }

    pub fn remove(&mut self, key: &Target) -> Option<V> {
        self.entries
            .remove(&key.id())
            .filter(|entry| entry.key.is_alive())
            .map(|entry| entry.value)
    }

    /// Number of entries whose key is still alive.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.key.is_alive())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose key has been released.
    pub fn prune(&mut self) {
        self.entries.retain(|_, entry| entry.key.is_alive());
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

// ----------------------------------------------------------------------------
// Target
// ----------------------------------------------------------------------------

/// A raw mutable aggregate.
///
/// Cloning a target clones the reference, not the data.
#[derive(Clone)]
pub enum Target {
    Record(Rc<RefCell<Record>>),
    Sequence(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<IndexMap<Value, Value>>>),
    Set(Rc<RefCell<IndexSet<Value>>>),
    WeakMap(Rc<RefCell<WeakTable<Value>>>),
    WeakSet(Rc<RefCell<WeakTable<()>>>),
}

impl Target {
    /// Build a record from `(name, value)` pairs.
    pub fn record<K, V, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        Self::from_record(fields.into_iter().collect())
    }

    pub fn empty_record() -> Self {
        Self::from_record(Record::new())
    }

    pub fn from_record(record: Record) -> Self {
        Target::Record(Rc::new(RefCell::new(record)))
    }

    pub fn sequence<V, I>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Target::Sequence(Rc::new(RefCell::new(
            items.into_iter().map(Into::into).collect(),
        )))
    }

    pub fn map<K, V, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        Target::Map(Rc::new(RefCell::new(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )))
    }

    pub fn set_of<V, I>(members: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Target::Set(Rc::new(RefCell::new(
            members.into_iter().map(Into::into).collect(),
        )))
    }

    pub fn weak_map() -> Self {
        Target::WeakMap(Rc::new(RefCell::new(WeakTable::default())))
    }

    pub fn weak_set() -> Self {
        Target::WeakSet(Rc::new(RefCell::new(WeakTable::default())))
    }

    pub fn kind(&self) -> RawKind {
        match self {
            Target::Record(_) => RawKind::Record,
            Target::Sequence(_) => RawKind::Sequence,
            Target::Map(_) => RawKind::Map,
            Target::Set(_) => RawKind::Set,
            Target::WeakMap(_) => RawKind::WeakMap,
            Target::WeakSet(_) => RawKind::WeakSet,
        }
    }

    pub fn id(&self) -> TargetId {
        match self {
            Target::Record(rc) => Rc::as_ptr(rc) as *const () as usize,
            Target::Sequence(rc) => Rc::as_ptr(rc) as *const () as usize,
            Target::Map(rc) => Rc::as_ptr(rc) as *const () as usize,
            Target::Set(rc) => Rc::as_ptr(rc) as *const () as usize,
            Target::WeakMap(rc) => Rc::as_ptr(rc) as *const () as usize,
            Target::WeakSet(rc) => Rc::as_ptr(rc) as *const () as usize,
        }
    }

    pub fn downgrade(&self) -> WeakTarget {
        let any: Rc<dyn Any> = match self {
            Target::Record(rc) => rc.clone() as Rc<dyn Any>,
            Target::Sequence(rc) => rc.clone() as Rc<dyn Any>,
            Target::Map(rc) => rc.clone() as Rc<dyn Any>,
            Target::Set(rc) => rc.clone() as Rc<dyn Any>,
            Target::WeakMap(rc) => rc.clone() as Rc<dyn Any>,
            Target::WeakSet(rc) => rc.clone() as Rc<dyn Any>,
        };
        WeakTarget(Rc::downgrade(&any))
    }

    pub fn ptr_eq(&self, other: &Target) -> bool {
        self.id() == other.id()
    }

    /// Raw read.
    ///
    /// Records fall through to their prototype; sequences understand indices
    /// and `"length"`; maps look the key up. Sets have no values to read.
    pub fn get(&self, key: &Value) -> Value {
        match self {
            Target::Record(rc) => {
                let proto = {
                    let record = rc.borrow();
                    if let Some(value) = record.fields.get(&*key.to_property_key()) {
                        return value.clone();
                    }
                    record.proto.clone()
                };
                match proto.as_ref().and_then(Value::raw_target) {
                    Some(proto) => proto.get(key),
                    None => Value::Undefined,
                }
            }
            Target::Sequence(rc) => match SeqKey::parse(key) {
                SeqKey::Index(index) => rc.borrow().get(index).cloned().unwrap_or_default(),
                SeqKey::Length => Value::from(rc.borrow().len()),
                SeqKey::Other => Value::Undefined,
            },
            Target::Map(rc) => rc.borrow().get(key).cloned().unwrap_or_default(),
            Target::WeakMap(rc) => key
                .raw_target()
                .and_then(|key| rc.borrow().get(&key).cloned())
                .unwrap_or_default(),
            Target::Set(_) | Target::WeakSet(_) => Value::Undefined,
        }
    }

    /// Raw write. Fails for sets (use [`Target::try_add`]), for non-index
    /// sequence keys, and for weak maps given a non-aggregate key.
    pub fn try_set(&self, key: Value, value: Value) -> Result<()> {
        match self {
            Target::Record(rc) => {
                rc.borrow_mut().fields.insert(key.to_property_key(), value);
            }
            Target::Sequence(rc) => match SeqKey::parse(&key) {
                SeqKey::Index(index) => {
                    write_index(&mut rc.borrow_mut(), index, value, DEFAULT_MAX_SEQUENCE_GAP)?
                }
                SeqKey::Length => {
                    let len = value.as_length().ok_or_else(|| ReactiveError::InvalidLength {
                        value: value.to_string(),
                    })?;
                    resize_sequence(&mut rc.borrow_mut(), len, DEFAULT_MAX_SEQUENCE_GAP)?;
                }
                SeqKey::Other => {
                    return Err(ReactiveError::UnsupportedOperation {
                        op: "set",
                        kind: RawKind::Sequence,
                    })
                }
            },
            Target::Map(rc) => {
                rc.borrow_mut().insert(key, value);
            }
            Target::WeakMap(rc) => {
                let key = weak_key(&key)?;
                rc.borrow_mut().insert(&key, value);
            }
            Target::Set(_) | Target::WeakSet(_) => {
                return Err(ReactiveError::UnsupportedOperation {
                    op: "set",
                    kind: self.kind(),
                })
            }
        }
        Ok(())
    }

    /// Raw write that logs instead of failing. Returns whether it applied.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> bool {
        match self.try_set(key.into(), value.into()) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "raw write rejected");
                false
            }
        }
    }

    /// Raw insertion into a set. Returns whether the member is new.
    pub fn try_add(&self, member: Value) -> Result<bool> {
        match self {
            Target::Set(rc) => Ok(rc.borrow_mut().insert(member)),
            Target::WeakSet(rc) => {
                let member = weak_key(&member)?;
                Ok(rc.borrow_mut().insert(&member, ()).is_none())
            }
            _ => Err(ReactiveError::UnsupportedOperation {
                op: "add",
                kind: self.kind(),
            }),
        }
    }

    /// Raw insertion that logs instead of failing.
    pub fn add(&self, member: impl Into<Value>) -> bool {
        match self.try_add(member.into()) {
            Ok(added) => added,
            Err(err) => {
                warn!(%err, "raw add rejected");
                false
            }
        }
    }

    /// Raw membership test. Records consult their prototype.
    pub fn has(&self, key: &Value) -> bool {
        match self {
            Target::Record(rc) => {
                let proto = {
                    let record = rc.borrow();
                    if record.fields.contains_key(&*key.to_property_key()) {
                        return true;
                    }
                    record.proto.clone()
                };
                proto
                    .as_ref()
                    .and_then(Value::raw_target)
                    .is_some_and(|proto| proto.has(key))
            }
            Target::Sequence(rc) => match SeqKey::parse(key) {
                SeqKey::Index(index) => index < rc.borrow().len(),
                SeqKey::Length => true,
                SeqKey::Other => false,
            },
            Target::Map(rc) => rc.borrow().contains_key(key),
            Target::Set(rc) => rc.borrow().contains(key),
            Target::WeakMap(rc) => key
                .raw_target()
                .is_some_and(|key| rc.borrow().contains(&key)),
            Target::WeakSet(rc) => key
                .raw_target()
                .is_some_and(|key| rc.borrow().contains(&key)),
        }
    }

    /// Own-key membership. Unlike [`Target::has`] this ignores prototypes.
    pub fn has_own(&self, key: &Value) -> bool {
        match self {
            Target::Record(rc) => rc.borrow().fields.contains_key(&*key.to_property_key()),
            _ => self.has(key),
        }
    }

    /// Raw removal. Returns whether the key existed.
    ///
    /// Removing a sequence element leaves an undefined slot; the length is
    /// unchanged.
    pub fn remove(&self, key: &Value) -> bool {
        match self {
            Target::Record(rc) => rc
                .borrow_mut()
                .fields
                .shift_remove(&*key.to_property_key())
                .is_some(),
            Target::Sequence(rc) => match SeqKey::parse(key) {
                SeqKey::Index(index) => {
                    let mut items = rc.borrow_mut();
                    match items.get_mut(index) {
                        Some(slot) => {
                            *slot = Value::Undefined;
                            true
                        }
                        None => false,
                    }
                }
                _ => false,
            },
            Target::Map(rc) => rc.borrow_mut().shift_remove(key).is_some(),
            Target::Set(rc) => rc.borrow_mut().shift_remove(key),
            Target::WeakMap(rc) => key
                .raw_target()
                .is_some_and(|key| rc.borrow_mut().remove(&key).is_some()),
            Target::WeakSet(rc) => key
                .raw_target()
                .is_some_and(|key| rc.borrow_mut().remove(&key).is_some()),
        }
    }

    /// Number of own fields, elements, entries or members.
    pub fn len(&self) -> usize {
        match self {
            Target::Record(rc) => rc.borrow().len(),
            Target::Sequence(rc) => rc.borrow().len(),
            Target::Map(rc) => rc.borrow().len(),
            Target::Set(rc) => rc.borrow().len(),
            Target::WeakMap(rc) => rc.borrow().len(),
            Target::WeakSet(rc) => rc.borrow().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Own keys: field names, indices, map keys or set members.
    /// Weak containers are not enumerable and yield nothing.
    pub fn keys(&self) -> Vec<Value> {
        match self {
            Target::Record(rc) => rc
                .borrow()
                .keys()
                .map(|key| Value::Str(key.clone()))
                .collect(),
            Target::Sequence(rc) => (0..rc.borrow().len()).map(Value::from).collect(),
            Target::Map(rc) => rc.borrow().keys().cloned().collect(),
            Target::Set(rc) => rc.borrow().iter().cloned().collect(),
            Target::WeakMap(_) | Target::WeakSet(_) => Vec::new(),
        }
    }

    /// Snapshot of `(key, value)` pairs. Sets pair each member with itself.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        match self {
            Target::Record(rc) => rc
                .borrow()
                .iter()
                .map(|(key, value)| (Value::Str(key.clone()), value.clone()))
                .collect(),
            Target::Sequence(rc) => rc
                .borrow()
                .iter()
                .enumerate()
                .map(|(index, value)| (Value::from(index), value.clone()))
                .collect(),
            Target::Map(rc) => rc
                .borrow()
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            Target::Set(rc) => rc
                .borrow()
                .iter()
                .map(|member| (member.clone(), member.clone()))
                .collect(),
            Target::WeakMap(_) | Target::WeakSet(_) => Vec::new(),
        }
    }

    /// Remove everything.
    pub fn clear(&self) {
        match self {
            Target::Record(rc) => rc.borrow_mut().clear(),
            Target::Sequence(rc) => rc.borrow_mut().clear(),
            Target::Map(rc) => rc.borrow_mut().clear(),
            Target::Set(rc) => rc.borrow_mut().clear(),
            Target::WeakMap(rc) => rc.borrow_mut().clear(),
            Target::WeakSet(rc) => rc.borrow_mut().clear(),
        }
    }
}

/// Write `value` at `index`, padding with at most `max_gap` undefined slots.
pub(crate) fn write_index(
    items: &mut Vec<Value>,
    index: usize,
    value: Value,
    max_gap: usize,
) -> Result<()> {
    match items.get_mut(index) {
        Some(slot) => *slot = value,
        None => {
            check_gap(items.len(), index - items.len(), max_gap)?;
            items.resize(index, Value::Undefined);
            items.push(value);
        }
    }
    Ok(())
}

/// Truncate or pad `items` to `len`. Padding is limited to `max_gap` slots.
pub(crate) fn resize_sequence(items: &mut Vec<Value>, len: usize, max_gap: usize) -> Result<()> {
    if len > MAX_LENGTH {
        return Err(ReactiveError::InvalidLength {
            value: len.to_string(),
        });
    }
    if len > items.len() {
        check_gap(items.len(), len - items.len(), max_gap)?;
    }
    items.resize(len, Value::Undefined);
    Ok(())
}

fn check_gap(len: usize, holes: usize, limit: usize) -> Result<()> {
    if holes > limit {
        return Err(ReactiveError::SequenceGap { len, holes, limit });
    }
    Ok(())
}

fn weak_key(key: &Value) -> Result<Target> {
    key.raw_target()
        .ok_or(ReactiveError::InvalidWeakKey { kind: key.kind() })
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Target {}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("kind", &self.kind())
            .field("id", &format_args!("{:#x}", self.id()))
            .finish()
    }
}

impl From<Record> for Target {
    fn from(record: Record) -> Self {
        Target::from_record(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_reads_fall_through_to_proto() {
        let parent = Target::record([("inherited", 1)]);
        let child = Target::from_record(Record::with_proto(parent.clone()));

        assert_eq!(child.get(&Value::from("inherited")), Value::from(1));
        assert!(child.has(&Value::from("inherited")));
        assert!(!child.has_own(&Value::from("inherited")));
        assert_eq!(child.get(&Value::from("missing")), Value::Undefined);
    }

    #[test]
    fn sequence_writes_pad_with_undefined() {
        let seq = Target::sequence([1]);
        assert!(seq.set(3, "x"));
        assert_eq!(seq.len(), 4);
        assert_eq!(seq.get(&Value::from(1)), Value::Undefined);
        assert_eq!(seq.get(&Value::from("length")), Value::from(4));

        assert!(seq.set("length", 1));
        assert_eq!(seq.len(), 1);
        assert!(!seq.set("name", 1));
    }

    #[test]
    fn oversized_sequence_writes_are_refused() {
        let seq = Target::sequence([1]);
        assert!(matches!(
            seq.try_set(Value::from("length"), Value::from(1e19)),
            Err(ReactiveError::InvalidLength { .. })
        ));
        assert!(matches!(
            seq.try_set(Value::from(DEFAULT_MAX_SEQUENCE_GAP + 2), Value::from(2)),
            Err(ReactiveError::SequenceGap { len: 1, .. })
        ));
        assert!(!seq.set(4_294_967_295_u64, 2));
        assert_eq!(seq.len(), 1);

        assert!(seq.set(DEFAULT_MAX_SEQUENCE_GAP + 1, 2));
        assert_eq!(seq.len(), DEFAULT_MAX_SEQUENCE_GAP + 2);
    }

    #[test]
    fn sequence_remove_keeps_length() {
        let seq = Target::sequence(["a", "b"]);
        assert!(seq.remove(&Value::from(1)));
        assert_eq!(seq.len(), 2);
        assert!(!seq.remove(&Value::from(5)));
    }

    #[test]
    fn set_rejects_keyed_writes() {
        let set = Target::set_of([1, 2]);
        assert!(matches!(
            set.try_set(Value::from(1), Value::from(2)),
            Err(ReactiveError::UnsupportedOperation { op: "set", .. })
        ));
        assert!(set.add(3));
        assert!(!set.add(3));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn weak_map_requires_aggregate_keys() {
        let weak = Target::weak_map();
        assert!(matches!(
            weak.try_set(Value::from("k"), Value::from(1)),
            Err(ReactiveError::InvalidWeakKey { .. })
        ));

        let key = Target::empty_record();
        weak.try_set(Value::Target(key.clone()), Value::from(1)).unwrap();
        assert_eq!(weak.get(&Value::Target(key.clone())), Value::from(1));
        assert_eq!(weak.len(), 1);

        drop(key);
        assert_eq!(weak.len(), 0);
    }

    #[test]
    fn weak_set_forgets_released_members() {
        let weak = Target::weak_set();
        let member = Target::sequence([1]);
        assert!(weak.add(member.clone()));
        assert!(weak.has(&Value::Target(member.clone())));
        drop(member);
        assert!(weak.is_empty());
    }

    #[test]
    fn identity_is_by_allocation() {
        let a = Target::empty_record();
        let b = Target::empty_record();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(a.downgrade().is_alive());
    }

    #[test]
    fn record_removal_preserves_order() {
        let record = Target::record([("a", 1), ("b", 2), ("c", 3)]);
        assert!(record.remove(&Value::from("b")));
        assert_eq!(record.keys(), vec![Value::from("a"), Value::from("c")]);
    }
}
