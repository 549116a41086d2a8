//! Error Types
//!
//! Reactive operations themselves never fail: readonly writes are ignored,
//! wrapping is total and tracking outside a computation is a no-op. Errors
//! only surface at the edges where data enters or leaves the engine.

use thiserror::Error;

use crate::value::RawKind;

/// Errors produced by the data-interop edges of the engine.
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A JSON document could not be turned into an observable aggregate.
    #[error("expected a JSON object or array, found {found}")]
    NotAggregate { found: &'static str },

    /// A snapshot was requested for data that refers back to itself.
    #[error("cannot snapshot cyclic data")]
    CyclicValue,

    /// Weak containers only accept aggregates as keys or members.
    #[error("invalid weak container key of kind {kind:?}")]
    InvalidWeakKey { kind: RawKind },

    /// The target does not support the requested raw operation.
    #[error("operation `{op}` is not supported on {kind:?} targets")]
    UnsupportedOperation { op: &'static str, kind: RawKind },

    /// A sequence length outside `0..=MAX_LENGTH`, or not an integer.
    #[error("invalid sequence length {value}")]
    InvalidLength { value: String },

    /// A sequence write would pad more undefined slots than allowed.
    #[error("write would leave {holes} empty slots after length {len} (limit {limit})")]
    SequenceGap { len: usize, holes: usize, limit: usize },

    /// Malformed JSON text.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
