//! Dependency Store
//!
//! `target -> key -> subscribers`, created lazily on the first tracked read.
//!
//! Targets are identified by address. Each entry keeps a [`WeakTarget`]
//! witness so the address cannot be recycled while the entry exists; entries
//! whose target has been released are pruned once the table grows. Sets
//! left without subscribers are dropped after a removal on their target.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::reactive::{Subscriber, SubscriberId};
use crate::value::{RawKind, Target, TargetId, Value, WeakTarget};

/// Table size at which dead entries are first swept.
const INITIAL_PRUNE_THRESHOLD: usize = 64;

/// The subscribers of one `(target, key)` pair, in the order they first
/// tracked it.
pub type Dep = RefCell<IndexMap<SubscriberId, Subscriber>>;

/// What a read or write addressed on a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A named record property.
    Prop(Rc<str>),
    /// A sequence element.
    Index(usize),
    /// A sequence length.
    Length,
    /// A map key or set member.
    Entry(Value),
    /// A weak-container key, by identity.
    Object(TargetId),
    /// The shape of the target: enumeration, additions, removals.
    Iterate,
    /// The key set of a map, independent of the values stored under it.
    KeyIterate,
}

/// The kind of write being reported to [`DependencyStore::collect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// A key or member that did not exist before.
    Added,
    /// An existing key now holds a different value.
    Set,
    /// An existing key or member was deleted.
    Removed,
    /// The whole target was emptied.
    Clear,
}

struct TargetDeps {
    witness: WeakTarget,
    keys: IndexMap<DepKey, Rc<Dep>>,
}

impl TargetDeps {
    fn release_unused(&mut self) -> usize {
        let before = self.keys.len();
        self.keys.retain(|_, dep| !dep.borrow().is_empty());
        before - self.keys.len()
    }
}

/// Registry of every tracked `(target, key)` pair.
pub struct DependencyStore {
    targets: RefCell<HashMap<TargetId, TargetDeps>>,
    prune_at: Cell<usize>,
}

impl DependencyStore {
    pub fn new() -> Self {
        Self {
            targets: RefCell::new(HashMap::new()),
            prune_at: Cell::new(INITIAL_PRUNE_THRESHOLD),
        }
    }

    /// The dependency set for `(target, key)`, created if missing.
    pub fn dep_for(&self, target: &Target, key: DepKey) -> Rc<Dep> {
        let id = target.id();
        let mut targets = self.targets.borrow_mut();

        if !targets.contains_key(&id) && targets.len() >= self.prune_at.get() {
            let before = targets.len();
            targets.retain(|_, entry| entry.witness.is_alive());
            self.prune_at
                .set((targets.len() * 2).max(INITIAL_PRUNE_THRESHOLD));
            debug!(
                removed = before - targets.len(),
                remaining = targets.len(),
                "pruned dependency store"
            );
        }

        let entry = targets.entry(id).or_insert_with(|| TargetDeps {
            witness: target.downgrade(),
            keys: IndexMap::new(),
        });
        entry.keys.entry(key).or_default().clone()
    }

    /// Resolve the subscribers a write of `op` on `(target, key)` reaches.
    ///
    /// The write must already have been applied: for a sequence length
    /// change the current length is taken as the new one. `exclude` is the
    /// subscriber currently running, which never re-triggers itself.
    pub fn collect(
        &self,
        target: &Target,
        key: &DepKey,
        op: Operation,
        exclude: Option<SubscriberId>,
    ) -> Vec<Subscriber> {
        let targets = self.targets.borrow();
        let Some(entry) = targets.get(&target.id()) else {
            return Vec::new();
        };

        let mut reached = IndexMap::new();
        let mut pull = |dep: Option<&Rc<Dep>>| {
            if let Some(dep) = dep {
                for (id, subscriber) in dep.borrow().iter() {
                    if Some(*id) != exclude {
                        reached.entry(*id).or_insert_with(|| subscriber.clone());
                    }
                }
            }
        };

        let kind = target.kind();
        if op == Operation::Clear {
            for dep in entry.keys.values() {
                pull(Some(dep));
            }
        } else if kind == RawKind::Sequence && *key == DepKey::Length {
            let len = target.len();
            for (key, dep) in &entry.keys {
                match key {
                    DepKey::Length => pull(Some(dep)),
                    DepKey::Index(index) if *index >= len => pull(Some(dep)),
                    _ => {}
                }
            }
        } else {
            pull(entry.keys.get(key));
            let keyed = kind.is_keyed();
            match op {
                Operation::Added => {
                    pull(entry.keys.get(&DepKey::Iterate));
                    if keyed {
                        pull(entry.keys.get(&DepKey::KeyIterate));
                    }
                    if kind == RawKind::Sequence {
                        pull(entry.keys.get(&DepKey::Length));
                    }
                }
                Operation::Removed => {
                    pull(entry.keys.get(&DepKey::Iterate));
                    if keyed {
                        pull(entry.keys.get(&DepKey::KeyIterate));
                    }
                }
                Operation::Set if keyed => pull(entry.keys.get(&DepKey::Iterate)),
                Operation::Set | Operation::Clear => {}
            }
        }

        reached.into_values().collect()
    }

    /// Number of subscribers currently registered for `(target, key)`.
    pub fn subscriber_count(&self, target: &Target, key: &DepKey) -> usize {
        self.targets
            .borrow()
            .get(&target.id())
            .and_then(|entry| entry.keys.get(key))
            .map_or(0, |dep| dep.borrow().len())
    }

    /// Number of targets with an entry, dead or alive.
    pub fn target_count(&self) -> usize {
        self.targets.borrow().len()
    }

    /// Number of keys tracked on `target`, with or without subscribers.
    pub fn key_count(&self, target: &Target) -> usize {
        self.targets
            .borrow()
            .get(&target.id())
            .map_or(0, |entry| entry.keys.len())
    }

    /// Drop the dependency sets of `target` that no subscriber sits in, and
    /// the target's entry once it has none left. Returns how many sets were
    /// dropped.
    pub fn release_unused(&self, target: &Target) -> usize {
        let id = target.id();
        let mut targets = self.targets.borrow_mut();
        let Some(entry) = targets.get_mut(&id) else {
            return 0;
        };
        let released = entry.release_unused();
        if entry.keys.is_empty() {
            targets.remove(&id);
        }
        released
    }

    /// Drop every entry whose target has been released, and every dependency
    /// set without subscribers. Returns how many target entries were removed.
    pub fn prune(&self) -> usize {
        let mut targets = self.targets.borrow_mut();
        let before = targets.len();
        targets.retain(|_, entry| {
            entry.release_unused();
            entry.witness.is_alive() && !entry.keys.is_empty()
        });
        before - targets.len()
    }
}

impl Default for DependencyStore {
    fn default() -> Self {
        Self::new()
    }
}
