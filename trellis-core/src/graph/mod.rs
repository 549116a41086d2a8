//! Dependency Graph
//!
//! This module holds the two data structures that connect reads to writes:
//!
//! - the [`DependencyStore`], mapping every observed target to the keys that
//!   were read on it and, per key, the ordered set of subscribers that read it;
//! - the [`JobQueue`], where notification overrides park work that should run
//!   at the next batching boundary instead of inside the triggering write.
//!
//! # Edges
//!
//! An edge is recorded from both ends. The store owns the `target -> key ->
//! subscribers` direction; every subscriber keeps weak links back to the
//! dependency sets it sits in so it can detach itself before re-running.
//! Nothing is ever removed from the store by a write; only a subscriber's own
//! cleanup removes edges.

mod scheduler;
mod store;

pub use scheduler::{FlushStage, JobQueue};
pub use store::{Dep, DepKey, DependencyStore, Operation};
