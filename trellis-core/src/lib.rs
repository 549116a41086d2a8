//! Trellis Core
//!
//! A fine-grained reactive dependency engine. Application data lives in raw
//! [`Target`]s (records, sequences, maps, sets and their weak variants).
//! Observed [`Handle`]s intercept reads and writes on them: reads made while
//! a subscriber runs are recorded, and a later write re-runs exactly the
//! subscribers that read what changed.
//!
//! It implements:
//!
//! - observation wrappers for every target kind, in deep/shallow and
//!   mutable/readonly modes
//! - effects, computed values, watchers and scalar refs on top of them
//! - an explicit job queue for deferred (`pre`/`post`) work
//!
//! # Architecture
//!
//! - `value`: raw data model and kind classification
//! - `graph`: dependency store and job queue
//! - `observe`: handles and the per-kind interceptors
//! - `reactive`: runtime, subscribers, effects, computed, watch, refs
//! - `api`: the same operations over the thread-default runtime
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use trellis_core::{Runtime, Target};
//!
//! let rt = Runtime::new();
//! let state = rt.reactive(Target::record([("count", 0)]));
//!
//! let s = state.clone();
//! let doubled = rt.computed(move || s.get("count").as_f64().unwrap_or(0.0) * 2.0);
//!
//! let seen = Rc::new(Cell::new(0.0));
//! let (d, out) = (doubled.clone(), seen.clone());
//! let _effect = rt.effect(move || out.set(d.value()));
//!
//! state.set("count", 5);
//! assert_eq!(seen.get(), 10.0);
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod graph;
pub mod observe;
pub mod reactive;
pub mod value;

pub use config::RuntimeConfig;
pub use error::{ReactiveError, Result};
pub use graph::{DepKey, FlushStage, Operation};
pub use observe::{is_proxy, is_readonly, is_reactive, to_raw, Handle, WrapMode};
pub use reactive::{
    is_ref, unref, Computed, Effect, EffectOptions, FlushMode, PauseTracking, ProxyRefs, Ref,
    Runtime, Subscriber, SubscriberId, WatchOptions, Watcher, WeakRuntime,
};
pub use value::{RawKind, Record, Target, Value};
