//! Thread-default API
//!
//! Free functions mirroring the [`Runtime`] methods, bound to
//! [`Runtime::current`]. Handy when a program only ever needs one graph per
//! thread; everything created here shares it.
//!
//! ```rust
//! use trellis_core::{api, Target, Value};
//!
//! let state = api::reactive(Target::record([("ok", true)]));
//! let s = state.clone();
//! let flag = api::computed(move || s.get("ok").is_truthy());
//! assert!(flag.value());
//!
//! state.set("ok", Value::Null);
//! assert!(!flag.value());
//! ```

use crate::graph::FlushStage;
use crate::observe::{Handle, WrapMode};
use crate::reactive::{
    Computed, Effect, EffectOptions, IntoWatchSource, PauseTracking, ProxyRefs, Ref, Runtime,
    Subscriber, WatchOptions, Watcher,
};
use crate::value::{Target, Value};

pub fn reactive(target: impl Into<Target>) -> Handle {
    Runtime::current().reactive(target)
}

pub fn shallow_reactive(target: impl Into<Target>) -> Handle {
    Runtime::current().shallow_reactive(target)
}

pub fn readonly(target: impl Into<Target>) -> Handle {
    Runtime::current().readonly(target)
}

pub fn shallow_readonly(target: impl Into<Target>) -> Handle {
    Runtime::current().shallow_readonly(target)
}

pub fn wrap(value: impl Into<Value>, mode: WrapMode) -> Value {
    Runtime::current().wrap(value, mode)
}

pub fn effect<T, F>(f: F) -> Effect<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    Runtime::current().effect(f)
}

pub fn effect_with<T, F>(f: F, options: EffectOptions) -> Effect<T>
where
    T: 'static,
    F: Fn() -> T + 'static,
{
    Runtime::current().effect_with(f, options)
}

pub fn computed<T, F>(getter: F) -> Computed<T>
where
    T: Clone + 'static,
    F: Fn() -> T + 'static,
{
    Runtime::current().computed(getter)
}

pub fn watch<T, S, C>(source: S, callback: C, options: WatchOptions) -> Watcher
where
    T: 'static,
    S: IntoWatchSource<T>,
    C: Fn(&T, Option<&T>) + 'static,
{
    Runtime::current().watch(source, callback, options)
}

pub fn ref_(value: impl Into<Value>) -> Ref {
    Runtime::current().ref_(value)
}

pub fn to_ref(source: &Handle, key: impl Into<Value>) -> Ref {
    Runtime::current().to_ref(source, key)
}

pub fn to_refs(source: &Handle) -> Target {
    Runtime::current().to_refs(source)
}

pub fn proxy_refs(source: impl Into<Value>) -> ProxyRefs {
    Runtime::current().proxy_refs(source)
}

pub fn pause_tracking() -> PauseTracking {
    Runtime::current().pause_tracking()
}

pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().untracked(f)
}

pub fn queue_subscriber(subscriber: &Subscriber) -> bool {
    Runtime::current().queue_subscriber(subscriber)
}

pub fn queue_job(stage: FlushStage, job: impl FnOnce() + 'static) {
    Runtime::current().queue_job(stage, job);
}

pub fn flush() -> usize {
    Runtime::current().flush()
}
