//! Reactive Runtime
//!
//! The runtime is the context object every reactive operation goes through.
//! It owns the dependency store, the active-subscriber stack, the tracking
//! gate, the handle identity cache and the deferred job queue.
//!
//! # How It Works
//!
//! 1. An observed read calls [`Runtime::track`], which records the active
//!    subscriber against `(target, key)`.
//!
//! 2. An observed write calls [`Runtime::trigger`], which asks the store for
//!    every subscriber the write reaches and notifies each of them, either by
//!    running it or by handing it to its scheduler.
//!
//! 3. Schedulers that defer work park it in the job queue; the host drains it
//!    with [`Runtime::flush`].
//!
//! # Isolation
//!
//! Runtimes are independent: state observed through one never notifies
//! subscribers of another. [`Runtime::current`] returns a per-thread default
//! for code that does not need isolation. A runtime is `!Send`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::context::{current_runtime, PauseTracking};
use super::subscriber::{Subscriber, SubscriberId};
use crate::config::RuntimeConfig;
use crate::graph::{DepKey, DependencyStore, FlushStage, JobQueue, Operation};
use crate::observe::HandleCache;
use crate::value::Target;

pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    store: DependencyStore,
    stack: RefCell<Vec<Subscriber>>,
    should_track: Cell<bool>,
    handles: HandleCache,
    queue: JobQueue,
    next_subscriber: Cell<u64>,
}

/// Handle to a reactive graph. Cloning shares the graph.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

/// Non-owning reference to a runtime.
///
/// Subscribers and handles hold one so the graph does not keep itself alive.
/// Schedulers and flush hooks that need the runtime should capture one too.
#[derive(Clone)]
pub struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    /// The runtime, if it is still alive.
    pub fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }
}

impl fmt::Debug for WeakRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRuntime")
            .field("alive", &(self.0.strong_count() > 0))
            .finish()
    }
}

impl Runtime {
    /// Create an isolated runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(RuntimeInner {
                config,
                store: DependencyStore::new(),
                stack: RefCell::new(Vec::new()),
                should_track: Cell::new(true),
                handles: HandleCache::default(),
                queue: JobQueue::new(),
                next_subscriber: Cell::new(0),
            }),
        }
    }

    /// The default runtime of the calling thread.
    pub fn current() -> Self {
        current_runtime()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Whether both handles refer to the same graph.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// A non-owning reference to this runtime.
    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.inner))
    }

    pub(crate) fn next_subscriber_id(&self) -> SubscriberId {
        SubscriberId::next(&self.inner.next_subscriber)
    }

    pub(crate) fn stack(&self) -> &RefCell<Vec<Subscriber>> {
        &self.inner.stack
    }

    pub(crate) fn tracking_gate(&self) -> &Cell<bool> {
        &self.inner.should_track
    }

    pub(crate) fn handles(&self) -> &HandleCache {
        &self.inner.handles
    }

    // ---- Tracking ----

    /// Whether a read right now would record a dependency.
    pub fn is_tracking(&self) -> bool {
        self.inner.should_track.get() && !self.inner.stack.borrow().is_empty()
    }

    /// The subscriber currently running, if any.
    pub fn active_subscriber(&self) -> Option<Subscriber> {
        self.inner.stack.borrow().last().cloned()
    }

    /// Stop recording dependencies until the returned guard is dropped.
    pub fn pause_tracking(&self) -> PauseTracking {
        PauseTracking::new(self)
    }

    /// Run `f` without recording any dependency.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _pause = self.pause_tracking();
        f()
    }

    /// Record that the active subscriber read `key` on `target`.
    ///
    /// Does nothing when tracking is paused or nothing is running.
    pub fn track(&self, target: &Target, key: DepKey) {
        if !self.inner.should_track.get() {
            return;
        }
        let Some(subscriber) = self.active_subscriber() else {
            return;
        };
        let dep = self.inner.store.dep_for(target, key.clone());
        if subscriber.link(&dep) {
            trace!(subscriber = ?subscriber.id(), target_id = target.id(), ?key, "track");
        }
    }

    /// Notify every subscriber reached by a write of `op` on `(target, key)`.
    ///
    /// Subscribers are resolved before any of them runs, so edges added or
    /// removed by those runs do not affect this notification round.
    ///
    /// After a removal or clear, dependency sets of `target` that no
    /// subscriber sits in any more are dropped.
    pub fn trigger(&self, target: &Target, key: DepKey, op: Operation) {
        let active = self.inner.stack.borrow().last().map(Subscriber::id);
        let reached = self.inner.store.collect(target, &key, op, active);
        if !reached.is_empty() {
            trace!(target_id = target.id(), ?key, ?op, reached = reached.len(), "trigger");
            for subscriber in reached {
                // an earlier notification may have disposed it
                if subscriber.is_active() {
                    subscriber.notify();
                }
            }
        }

        if matches!(op, Operation::Removed | Operation::Clear) {
            let released = self.inner.store.release_unused(target);
            if released > 0 {
                trace!(target_id = target.id(), released, "released dependency sets");
            }
        }
    }

    /// Number of subscribers that currently depend on `(target, key)`.
    pub fn subscriber_count(&self, target: &Target, key: &DepKey) -> usize {
        self.inner.store.subscriber_count(target, key)
    }

    /// Number of keys the store holds dependency sets for on `target`.
    pub fn tracked_key_count(&self, target: &Target) -> usize {
        self.inner.store.key_count(target)
    }

    /// Sweep store entries and cached handles whose target was released.
    pub fn prune(&self) -> usize {
        self.inner.store.prune() + self.inner.handles.prune()
    }

    // ---- Deferred jobs ----

    /// Queue a subscriber run for the next flush. Idempotent until flushed.
    pub fn queue_subscriber(&self, subscriber: &Subscriber) -> bool {
        self.inner.queue.queue_subscriber(subscriber)
    }

    /// Queue a one-shot job for the next flush.
    pub fn queue_job(&self, stage: FlushStage, job: impl FnOnce() + 'static) {
        self.inner.queue.queue_job(stage, job);
    }

    /// Run every queued job. See [`JobQueue::flush`].
    pub fn flush(&self) -> usize {
        self.inner.queue.flush(self.inner.config.max_flush_jobs)
    }

    pub fn has_pending_jobs(&self) -> bool {
        self.inner.queue.has_pending()
    }

    /// Register the callback invoked when a new batch of jobs needs a flush.
    ///
    /// A host event loop uses this to schedule [`Runtime::flush`] at its next
    /// boundary. The hook should capture a [`WeakRuntime`] rather than a
    /// strong clone of this runtime.
    pub fn on_flush_requested(&self, hook: impl Fn() + 'static) {
        self.inner.queue.set_hook(Some(Rc::new(hook)));
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("targets", &self.inner.store.target_count())
            .field("depth", &self.inner.stack.borrow().len())
            .field("tracking", &self.inner.should_track.get())
            .field("queue", &self.inner.queue)
            .finish()
    }
}
