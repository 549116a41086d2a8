//! Runtime Configuration
//!
//! Knobs that change how a [`Runtime`](crate::reactive::Runtime) behaves.
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```rust
//! use trellis_core::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_json_str(r#"{ "max_flush_jobs": 64 }"#).unwrap();
//! assert_eq!(config.max_flush_jobs, 64);
//! assert!(config.warn_on_readonly_write);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default upper bound on jobs executed by a single flush.
pub const DEFAULT_MAX_FLUSH_JOBS: usize = 10_000;

/// Default limit on undefined slots a single sequence write may pad.
pub const DEFAULT_MAX_SEQUENCE_GAP: usize = 1 << 16;

/// Configuration for a reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of deferred jobs a single `flush()` will execute.
    ///
    /// Jobs that keep re-queueing each other would otherwise spin forever.
    /// When the limit is reached the remaining jobs are dropped and an
    /// error is logged.
    pub max_flush_jobs: usize,

    /// Log a warning whenever a write or delete hits a readonly handle.
    pub warn_on_readonly_write: bool,

    /// How many undefined slots an index or length write may pad a sequence
    /// with. Larger gaps are refused.
    pub max_sequence_gap: usize,
}

impl RuntimeConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_jobs: DEFAULT_MAX_FLUSH_JOBS,
            warn_on_readonly_write: true,
            max_sequence_gap: DEFAULT_MAX_SEQUENCE_GAP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = RuntimeConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn fields_override_defaults() {
        let config =
            RuntimeConfig::from_json_str(r#"{ "warn_on_readonly_write": false }"#).unwrap();
        assert!(!config.warn_on_readonly_write);
        assert_eq!(config.max_flush_jobs, DEFAULT_MAX_FLUSH_JOBS);
        assert_eq!(config.max_sequence_gap, DEFAULT_MAX_SEQUENCE_GAP);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(RuntimeConfig::from_json_str("not json").is_err());
    }
}
