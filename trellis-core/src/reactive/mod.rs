//! Reactive Primitives
//!
//! This module implements the subscriber side of the engine: the runtime
//! that drives tracking, effects, computed values, watchers and refs.
//!
//! # Concepts
//!
//! ## Subscribers
//!
//! A [`Subscriber`] is a re-runnable computation. While it runs it sits on
//! top of the runtime's active stack, and every observed read it makes is
//! recorded against it. A later write to any of those reads notifies it.
//!
//! ## Effects
//!
//! An [`Effect`] is a subscriber the application registers directly. It runs
//! once on creation (unless lazy) and again on every change, or hands the
//! change to a scheduler.
//!
//! ## Computed values
//!
//! A [`Computed`] is a cached derived value. Its getter only re-runs when it
//! is read after an input changed, but readers are notified immediately.
//!
//! ## Watchers
//!
//! A watcher ([`Runtime::watch`]) calls back with the new and old result of a
//! source, synchronously or at the next flush.
//!
//! ## Refs
//!
//! A [`Ref`] is an observable single slot, either owned or pointing at a
//! field of an existing handle.

mod computed;
mod context;
mod effect;
mod refs;
mod runtime;
mod subscriber;
mod watch;

pub use computed::Computed;
pub use context::PauseTracking;
pub use effect::{Effect, EffectOptions};
pub use refs::{is_ref, unref, ProxyRefs, Ref};
pub use runtime::{Runtime, WeakRuntime};
pub use subscriber::{Scheduler, Subscriber, SubscriberId};
pub use watch::{traverse, FlushMode, IntoWatchSource, WatchOptions, Watcher};
