//! Subscriber types for the reactive system.
//!
//! A Subscriber is any computation that depends on observed state: effects,
//! the getter behind a computed value, the source of a watcher.
//!
//! # Lifecycle
//!
//! Every run first detaches the subscriber from all dependency sets it joined
//! during the previous run, then pushes it on the runtime's active stack and
//! executes the body. Reads made by the body re-attach it to exactly the sets
//! it needs this time, so a branch that was not taken leaves no edge behind.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::trace;

use super::context::ReactiveContext;
use super::runtime::{Runtime, WeakRuntime};
use crate::graph::Dep;

/// Identifies a subscriber within its runtime, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Take the next id from a runtime's counter.
    pub(crate) fn next(counter: &Cell<u64>) -> Self {
        let id = counter.get();
        counter.set(id + 1);
        Self(id)
    }
}

/// A notification override.
///
/// When present it is called instead of re-running the subscriber, and
/// decides if and when the subscriber actually runs.
pub type Scheduler = Rc<dyn Fn(&Subscriber)>;

struct SubscriberInner {
    id: SubscriberId,
    runtime: WeakRuntime,
    body: Box<dyn Fn()>,
    deps: RefCell<SmallVec<[Weak<Dep>; 4]>>,
    scheduler: RefCell<Option<Scheduler>>,
    active: Cell<bool>,
    run_count: Cell<usize>,
}

/// A re-runnable computation registered with the dependency graph.
///
/// Cloning shares the same subscriber.
#[derive(Clone)]
pub struct Subscriber(Rc<SubscriberInner>);

impl Subscriber {
    /// Create a subscriber bound to `runtime`. It does not run.
    pub fn new(runtime: &Runtime, body: Box<dyn Fn()>, scheduler: Option<Scheduler>) -> Self {
        Self(Rc::new(SubscriberInner {
            id: runtime.next_subscriber_id(),
            runtime: runtime.downgrade(),
            body,
            deps: RefCell::new(SmallVec::new()),
            scheduler: RefCell::new(scheduler),
            active: Cell::new(true),
            run_count: Cell::new(0),
        }))
    }

    pub fn id(&self) -> SubscriberId {
        self.0.id
    }

    /// Whether the subscriber still reacts to changes.
    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.0.run_count.get()
    }

    /// Number of dependency sets the subscriber currently sits in.
    pub fn dependency_count(&self) -> usize {
        self.0
            .deps
            .borrow()
            .iter()
            .filter(|dep| dep.strong_count() > 0)
            .count()
    }

    /// Run the subscriber's own body.
    pub fn run(&self) {
        self.execute(|| (self.0.body)());
    }

    /// Run `f` as this subscriber: detach from the previous run's
    /// dependencies, then execute `f` with this subscriber active.
    ///
    /// An inactive subscriber, or one whose runtime is gone, executes `f`
    /// without tracking anything.
    pub fn execute<R>(&self, f: impl FnOnce() -> R) -> R {
        let Some(runtime) = self.0.runtime.upgrade() else {
            return f();
        };
        if !self.is_active() {
            return runtime.untracked(f);
        }

        self.cleanup();
        let _ctx = ReactiveContext::enter(&runtime, self.clone());
        self.0.run_count.set(self.0.run_count.get() + 1);
        trace!(subscriber = ?self.0.id, run = self.0.run_count.get(), "running subscriber");
        f()
    }

    /// React to a change: hand the subscriber to its scheduler if it has one,
    /// otherwise run it.
    pub fn notify(&self) {
        let scheduler = self.0.scheduler.borrow().clone();
        match scheduler {
            Some(scheduler) => scheduler(self),
            None => self.run(),
        }
    }

    /// Stop reacting: leave every dependency set and drop the scheduler.
    pub fn dispose(&self) {
        if self.0.active.replace(false) {
            self.cleanup();
            self.0.scheduler.borrow_mut().take();
            trace!(subscriber = ?self.0.id, "disposed subscriber");
        }
    }

    /// Join `dep`. Returns `false` if already a member.
    pub(crate) fn link(&self, dep: &Rc<Dep>) -> bool {
        {
            let mut members = dep.borrow_mut();
            if members.contains_key(&self.0.id) {
                return false;
            }
            members.insert(self.0.id, self.clone());
        }
        self.0.deps.borrow_mut().push(Rc::downgrade(dep));
        true
    }

    /// Leave every dependency set joined so far.
    pub(crate) fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.0.deps.borrow_mut());
        for dep in deps {
            if let Some(dep) = dep.upgrade() {
                dep.borrow_mut().shift_remove(&self.0.id);
            }
        }
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Subscriber {}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.0.id)
            .field("active", &self.is_active())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DepKey;
    use crate::value::Target;

    #[test]
    fn ids_follow_creation_order_per_runtime() {
        let rt = Runtime::new();
        let first = Subscriber::new(&rt, Box::new(|| {}), None);
        let second = Subscriber::new(&rt, Box::new(|| {}), None);
        assert!(first.id() < second.id());

        let other = Runtime::new();
        let elsewhere = Subscriber::new(&other, Box::new(|| {}), None);
        assert_eq!(elsewhere.id(), first.id());
    }

    #[test]
    fn run_detaches_previous_dependencies() {
        let rt = Runtime::new();
        let target = Target::empty_record();
        let sub = Subscriber::new(&rt, Box::new(|| {}), None);

        sub.execute(|| rt.track(&target, DepKey::Iterate));
        assert_eq!(sub.dependency_count(), 1);
        assert_eq!(rt.subscriber_count(&target, &DepKey::Iterate), 1);

        sub.run();
        assert_eq!(sub.dependency_count(), 0);
        assert_eq!(rt.subscriber_count(&target, &DepKey::Iterate), 0);
        assert_eq!(sub.run_count(), 2);
    }

    #[test]
    fn linking_twice_is_one_edge() {
        let rt = Runtime::new();
        let target = Target::empty_record();
        let sub = Subscriber::new(&rt, Box::new(|| {}), None);

        sub.execute(|| {
            rt.track(&target, DepKey::Iterate);
            rt.track(&target, DepKey::Iterate);
        });
        assert_eq!(sub.dependency_count(), 1);
    }

    #[test]
    fn notify_prefers_the_scheduler() {
        let rt = Runtime::new();
        let ran = Rc::new(Cell::new(0));
        let scheduled = Rc::new(Cell::new(0));

        let r = ran.clone();
        let s = scheduled.clone();
        let sub = Subscriber::new(
            &rt,
            Box::new(move || r.set(r.get() + 1)),
            Some(Rc::new(move |_: &Subscriber| s.set(s.get() + 1))),
        );

        sub.notify();
        assert_eq!(ran.get(), 0);
        assert_eq!(scheduled.get(), 1);

        let plain = Subscriber::new(&rt, Box::new(move || {}), None);
        plain.notify();
        assert_eq!(plain.run_count(), 1);
    }

    #[test]
    fn disposed_subscribers_run_untracked() {
        let rt = Runtime::new();
        let target = Target::empty_record();
        let sub = Subscriber::new(&rt, Box::new(|| {}), None);

        sub.dispose();
        assert!(!sub.is_active());
        sub.execute(|| rt.track(&target, DepKey::Iterate));
        assert_eq!(sub.dependency_count(), 0);
        assert_eq!(sub.run_count(), 0);
    }
}
