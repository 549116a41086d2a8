//! Watchers
//!
//! A watcher re-evaluates a source whenever its dependencies change and
//! hands the new and previous results to a callback.
//!
//! # Sources
//!
//! Anything implementing [`IntoWatchSource`] can be watched:
//!
//! - a getter closure, whose reads are tracked;
//! - a [`Handle`], traversed in full so that a change to any nested field
//!   fires the watcher (the traversal tolerates cycles);
//! - a [`Ref`];
//! - a [`Computed`].
//!
//! # Timing
//!
//! [`FlushMode::Sync`] runs the callback inside the write that caused it.
//! `Pre` and `Post` queue it on the runtime's job queue, to run at the next
//! [`Runtime::flush`]; pre jobs run ahead of post jobs. Watchers do not
//! de-duplicate their own jobs: three writes queue three jobs, each of which
//! sees the state as of the flush.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::computed::Computed;
use super::effect::EffectOptions;
use super::refs::Ref;
use super::runtime::Runtime;
use super::subscriber::Subscriber;
use crate::graph::FlushStage;
use crate::observe::Handle;
use crate::value::{TargetId, Value};

/// When a watcher's callback runs relative to the write that fired it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Inside the write.
    #[default]
    Sync,
    /// At the next flush, before post jobs.
    Pre,
    /// At the next flush.
    Post,
}

/// Options accepted by [`Runtime::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Call the callback once at registration, with no previous value.
    pub immediate: bool,
    pub flush: FlushMode,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn flush(mut self, flush: FlushMode) -> Self {
        self.flush = flush;
        self
    }
}

/// Something a watcher can observe.
pub trait IntoWatchSource<T> {
    /// Turn the source into a getter. Reads made by the getter are what the
    /// watcher depends on.
    fn into_getter(self) -> Rc<dyn Fn() -> T>;
}

impl<T, F> IntoWatchSource<T> for F
where
    F: Fn() -> T + 'static,
{
    fn into_getter(self) -> Rc<dyn Fn() -> T> {
        Rc::new(self)
    }
}

impl IntoWatchSource<Value> for Handle {
    fn into_getter(self) -> Rc<dyn Fn() -> Value> {
        Rc::new(move || {
            traverse(&self);
            Value::Handle(self.clone())
        })
    }
}

impl IntoWatchSource<Value> for Ref {
    fn into_getter(self) -> Rc<dyn Fn() -> Value> {
        Rc::new(move || self.get())
    }
}

impl<T: Clone + 'static> IntoWatchSource<T> for Computed<T> {
    fn into_getter(self) -> Rc<dyn Fn() -> T> {
        Rc::new(move || self.value())
    }
}

/// Read every field reachable from `handle`, so that each is tracked.
pub fn traverse(handle: &Handle) {
    let mut seen = HashSet::new();
    traverse_value(&Value::Handle(handle.clone()), &mut seen);
}

fn traverse_value(value: &Value, seen: &mut HashSet<TargetId>) {
    let handle = match value {
        Value::Handle(handle) => handle,
        Value::Ref(reference) => return traverse_value(&reference.get(), seen),
        _ => return,
    };
    if !seen.insert(handle.raw().id()) || handle.kind().is_weak() {
        return;
    }
    for (key, value) in handle.entries() {
        traverse_value(&key, seen);
        traverse_value(&value, seen);
    }
}

/// A registered watcher.
///
/// Dropping it does not stop it; call [`Watcher::stop`].
#[derive(Clone)]
pub struct Watcher {
    subscriber: Subscriber,
}

impl Watcher {
    /// Stop watching. Jobs already queued become no-ops.
    pub fn stop(&self) {
        self.subscriber.dispose();
    }

    pub fn is_stopped(&self) -> bool {
        !self.subscriber.is_active()
    }

    /// Number of times the source has been evaluated.
    pub fn run_count(&self) -> usize {
        self.subscriber.run_count()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("subscriber", &self.subscriber)
            .finish()
    }
}

struct WatchJob<T> {
    getter: Rc<dyn Fn() -> T>,
    callback: Box<dyn Fn(&T, Option<&T>)>,
    old: RefCell<Option<T>>,
}

impl<T> WatchJob<T> {
    /// Re-evaluate the source as `subscriber`, call back, roll the old value
    /// forward.
    fn run(&self, subscriber: &Subscriber) {
        if !subscriber.is_active() {
            return;
        }
        let new = subscriber.execute(|| (self.getter)());
        let old = self.old.borrow_mut().take();
        trace!(subscriber = ?subscriber.id(), "watch callback");
        (self.callback)(&new, old.as_ref());
        *self.old.borrow_mut() = Some(new);
    }
}

impl Runtime {
    /// Watch `source` and call `callback(new, old)` whenever it changes.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    /// use trellis_core::{Runtime, Target, Value, WatchOptions};
    ///
    /// let rt = Runtime::new();
    /// let state = rt.reactive(Target::record([("count", 0)]));
    /// let log = Rc::new(RefCell::new(Vec::new()));
    ///
    /// let s = state.clone();
    /// let l = log.clone();
    /// rt.watch(
    ///     move || s.get("count"),
    ///     move |new: &Value, old: Option<&Value>| l.borrow_mut().push((new.clone(), old.cloned())),
    ///     WatchOptions::default(),
    /// );
    ///
    /// state.set("count", 1);
    /// assert_eq!(*log.borrow(), vec![(Value::from(1), Some(Value::from(0)))]);
    /// ```
    pub fn watch<T, S, C>(&self, source: S, callback: C, options: WatchOptions) -> Watcher
    where
        T: 'static,
        S: IntoWatchSource<T>,
        C: Fn(&T, Option<&T>) + 'static,
    {
        let getter = source.into_getter();
        let job = Rc::new(WatchJob {
            getter: Rc::clone(&getter),
            callback: Box::new(callback),
            old: RefCell::new(None),
        });

        let runtime = self.downgrade();
        let scheduled = Rc::clone(&job);
        let scheduler = move |subscriber: &Subscriber| {
            let stage = match options.flush {
                FlushMode::Sync => return scheduled.run(subscriber),
                FlushMode::Pre => FlushStage::Pre,
                FlushMode::Post => FlushStage::Post,
            };
            let Some(rt) = runtime.upgrade() else {
                return;
            };
            let (job, subscriber) = (Rc::clone(&scheduled), subscriber.clone());
            rt.queue_job(stage, move || job.run(&subscriber));
        };

        let effect = self.effect_with(
            move || getter(),
            EffectOptions::new().lazy(true).scheduler(scheduler),
        );

        if options.immediate {
            job.run(effect.subscriber());
        } else {
            *job.old.borrow_mut() = Some(effect.run());
        }

        Watcher {
            subscriber: effect.subscriber().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Target;
    use std::cell::Cell;

    type Log = Rc<RefCell<Vec<(Value, Option<Value>)>>>;

    fn logger(log: &Log) -> impl Fn(&Value, Option<&Value>) + 'static {
        let log = log.clone();
        move |new: &Value, old: Option<&Value>| log.borrow_mut().push((new.clone(), old.cloned()))
    }

    #[test]
    fn getter_source_reports_new_and_old() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("count", 0)]));
        let log = Log::default();

        let s = state.clone();
        rt.watch(move || s.get("count"), logger(&log), WatchOptions::new());
        assert!(log.borrow().is_empty());

        state.set("count", 1);
        state.set("count", 2);
        assert_eq!(
            *log.borrow(),
            vec![
                (Value::from(1), Some(Value::from(0))),
                (Value::from(2), Some(Value::from(1)))
            ]
        );
    }

    #[test]
    fn immediate_runs_once_without_old_value() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("count", 7)]));
        let log = Log::default();

        let s = state.clone();
        rt.watch(
            move || s.get("count"),
            logger(&log),
            WatchOptions::new().immediate(true),
        );
        assert_eq!(*log.borrow(), vec![(Value::from(7), None)]);
    }

    #[test]
    fn handle_source_is_deep() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([(
            "nested",
            Target::record([("list", Target::sequence([1, 2]))]),
        )]));
        let calls = Rc::new(Cell::new(0));

        let c = calls.clone();
        rt.watch(
            state.clone(),
            move |_: &Value, _: Option<&Value>| c.set(c.get() + 1),
            WatchOptions::new(),
        );

        let list = state.get("nested").as_handle().map(|h| h.get("list"));
        let Some(Value::Handle(list)) = list else {
            panic!("nested list should be a handle");
        };
        list.push([3]);
        assert!(calls.get() >= 1);

        let before = calls.get();
        list.set(0, 10);
        assert_eq!(calls.get(), before + 1);
    }

    #[test]
    fn traversal_tolerates_cycles() {
        let rt = Runtime::new();
        let a = Target::empty_record();
        a.set("me", a.clone());
        let state = rt.reactive(a);
        let calls = Rc::new(Cell::new(0));

        let c = calls.clone();
        rt.watch(
            state.clone(),
            move |_: &Value, _: Option<&Value>| c.set(c.get() + 1),
            WatchOptions::new(),
        );
        state.set("x", 1);
        assert_eq!(calls.get(), 1);

        // break the cycle so the record can be freed
        state.delete("me");
    }

    #[test]
    fn post_flush_defers_every_job() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("count", 0)]));
        let log = Log::default();

        let s = state.clone();
        rt.watch(
            move || s.get("count"),
            logger(&log),
            WatchOptions::new().flush(FlushMode::Post),
        );

        state.set("count", 1);
        state.set("count", 2);
        assert!(log.borrow().is_empty());

        // both queued jobs run against the final state
        assert_eq!(rt.flush(), 2);
        assert_eq!(
            *log.borrow(),
            vec![
                (Value::from(2), Some(Value::from(0))),
                (Value::from(2), Some(Value::from(2)))
            ]
        );
    }

    #[test]
    fn pre_jobs_run_before_post_jobs() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 0)]));
        let order = Rc::new(RefCell::new(Vec::new()));

        let (s, o) = (state.clone(), order.clone());
        rt.watch(
            move || s.get("n"),
            move |_: &Value, _: Option<&Value>| o.borrow_mut().push("post"),
            WatchOptions::new().flush(FlushMode::Post),
        );
        let (s, o) = (state.clone(), order.clone());
        rt.watch(
            move || s.get("n"),
            move |_: &Value, _: Option<&Value>| o.borrow_mut().push("pre"),
            WatchOptions::new().flush(FlushMode::Pre),
        );

        state.set("n", 1);
        rt.flush();
        assert_eq!(*order.borrow(), vec!["pre", "post"]);
    }

    #[test]
    fn stop_cancels_queued_jobs() {
        let rt = Runtime::new();
        let state = rt.reactive(Target::record([("n", 0)]));
        let calls = Rc::new(Cell::new(0));

        let (s, c) = (state.clone(), calls.clone());
        let watcher = rt.watch(
            move || s.get("n"),
            move |_: &Value, _: Option<&Value>| c.set(c.get() + 1),
            WatchOptions::new().flush(FlushMode::Post),
        );

        state.set("n", 1);
        watcher.stop();
        rt.flush();
        assert_eq!(calls.get(), 0);
        assert!(watcher.is_stopped());
    }

    #[test]
    fn watches_computed_and_refs() {
        let rt = Runtime::new();
        let count = rt.ref_(1);
        let c = count.clone();
        let doubled = rt.computed(move || c.get().as_f64().unwrap_or(0.0) * 2.0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let out = seen.clone();
        rt.watch(
            doubled,
            move |new: &f64, old: Option<&f64>| out.borrow_mut().push((*new, old.copied())),
            WatchOptions::new(),
        );
        let log = Log::default();
        rt.watch(count.clone(), logger(&log), WatchOptions::new());

        count.set(3);
        assert_eq!(*seen.borrow(), vec![(6.0, Some(2.0))]);
        assert_eq!(*log.borrow(), vec![(Value::from(3), Some(Value::from(1)))]);
    }

    #[test]
    fn options_deserialize() {
        let options: WatchOptions =
            serde_json::from_str(r#"{"immediate": true, "flush": "post"}"#).unwrap();
        assert_eq!(options, WatchOptions::new().immediate(true).flush(FlushMode::Post));

        let options: WatchOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.flush, FlushMode::Sync);
    }
}
