//! Effect Implementation
//!
//! An Effect is a computation that re-runs whenever observed state it read
//! during its last run changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs immediately to capture its initial
//!    dependencies (unless it is lazy).
//!
//! 2. When any dependency changes, the effect is notified. Without a
//!    scheduler it re-runs on the spot; with one, the scheduler decides.
//!
//! 3. Before re-running, the effect leaves every dependency set it joined and
//!    tracks fresh ones during execution.
//!
//! # Return values
//!
//! The body may return a value. [`Effect::run`] hands it back to the caller,
//! which is what lets a lazy effect double as a value producer; runs caused
//! by a change discard it.

use std::fmt;
use std::rc::Rc;

use super::runtime::Runtime;
use super::subscriber::{Scheduler, Subscriber, SubscriberId};

/// Options accepted by [`Runtime::effect_with`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    lazy: bool,
    scheduler: Option<Scheduler>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the initial run. The first [`Effect::run`] captures dependencies.
    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    /// Called instead of re-running the effect when a dependency changes.
    pub fn scheduler(mut self, scheduler: impl Fn(&Subscriber) + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

/// A computation that runs when its dependencies change.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use trellis_core::{Runtime, Target};
///
/// let rt = Runtime::new();
/// let state = rt.reactive(Target::record([("count", 0)]));
///
/// let seen = Rc::new(Cell::new(0.0));
/// let s = seen.clone();
/// let reader = state.clone();
/// let _effect = rt.effect(move || s.set(reader.get("count").as_f64().unwrap_or(0.0)));
///
/// state.set("count", 5);
/// assert_eq!(seen.get(), 5.0);
/// ```
pub struct Effect<T = ()> {
    subscriber: Subscriber,
    body: Rc<dyn Fn() -> T>,
}

impl<T: 'static> Effect<T> {
    /// Run the body as this effect, re-capturing dependencies, and return
    /// its value. A disposed effect still runs, without tracking.
    pub fn run(&self) -> T {
        self.subscriber.execute(|| (self.body)())
    }

    pub fn id(&self) -> SubscriberId {
        self.subscriber.id()
    }

    /// The subscriber this effect registers in the dependency graph.
    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }

    /// Stop reacting to changes and release every dependency.
    pub fn dispose(&self) {
        self.subscriber.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        !self.subscriber.is_active()
    }

    /// Number of tracked runs so far.
    pub fn run_count(&self) -> usize {
        self.subscriber.run_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.subscriber.dependency_count()
    }
}

impl<T> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            subscriber: self.subscriber.clone(),
            body: Rc::clone(&self.body),
        }
    }
}

impl<T> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.subscriber.id())
            .field("run_count", &self.subscriber.run_count())
            .field("dependency_count", &self.subscriber.dependency_count())
            .field("disposed", &!self.subscriber.is_active())
            .finish()
    }
}

impl Runtime {
    /// Register an effect that runs now and whenever its dependencies change.
    pub fn effect<T, F>(&self, f: F) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        self.effect_with(f, EffectOptions::default())
    }

    /// Register an effect with explicit options.
    pub fn effect_with<T, F>(&self, f: F, options: EffectOptions) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        let body: Rc<dyn Fn() -> T> = Rc::new(f);
        let run_body = Rc::clone(&body);
        let subscriber = Subscriber::new(
            self,
            Box::new(move || {
                run_body();
            }),
            options.scheduler,
        );

        let effect = Effect { subscriber, body };
        if !options.lazy {
            effect.run();
        }
        effect
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
