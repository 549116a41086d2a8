//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when observed state is read,
//! the runtime registers the current computation as a dependent.
//!
//! # Implementation
//!
//! Each [`Runtime`] owns a stack of active subscribers and a tracking gate.
//! Entering a context pushes the subscriber and opens the gate; dropping
//! the guard pops it and restores the gate, so nested computations (an effect
//! reading a computed value) unwind correctly even when a body panics.
//!
//! A thread-local default runtime backs [`Runtime::current`] for code that
//! does not want to carry a runtime around.

use super::runtime::Runtime;
use super::subscriber::{Subscriber, SubscriberId};

thread_local! {
    static CURRENT: Runtime = Runtime::new();
}

pub(crate) fn current_runtime() -> Runtime {
    CURRENT.with(Runtime::clone)
}

/// Guard that pops the active subscriber when dropped.
pub(crate) struct ReactiveContext<'a> {
    runtime: &'a Runtime,
    subscriber_id: SubscriberId,
    was_tracking: bool,
}

impl<'a> ReactiveContext<'a> {
    /// Make `subscriber` the active computation of `runtime`.
    ///
    /// Tracking is enabled for the duration even if the caller paused it, so
    /// a subscriber triggered from inside a paused region still captures its
    /// own dependencies.
    pub(crate) fn enter(runtime: &'a Runtime, subscriber: Subscriber) -> Self {
        let subscriber_id = subscriber.id();
        runtime.stack().borrow_mut().push(subscriber);
        let was_tracking = runtime.tracking_gate().replace(true);
        Self {
            runtime,
            subscriber_id,
            was_tracking,
        }
    }
}

impl Drop for ReactiveContext<'_> {
    fn drop(&mut self) {
        let popped = self.runtime.stack().borrow_mut().pop();
        self.runtime.tracking_gate().set(self.was_tracking);

        if let Some(subscriber) = popped {
            debug_assert_eq!(
                subscriber.id(),
                self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id,
                subscriber.id()
            );
        }
    }
}

/// Guard returned by [`Runtime::pause_tracking`].
///
/// Reads made while it is alive record no dependencies. Dropping it restores
/// whatever the gate was before, so pauses nest.
#[must_use = "tracking resumes as soon as the guard is dropped"]
pub struct PauseTracking {
    runtime: Runtime,
    was_tracking: bool,
}

impl PauseTracking {
    pub(crate) fn new(runtime: &Runtime) -> Self {
        let was_tracking = runtime.tracking_gate().replace(false);
        Self {
            runtime: runtime.clone(),
            was_tracking,
        }
    }
}

impl Drop for PauseTracking {
    fn drop(&mut self) {
        self.runtime.tracking_gate().set(self.was_tracking);
    }
}
