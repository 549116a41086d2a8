//! Raw Type Classification
//!
//! The wrap factory needs to know the structural kind of a value to pick an
//! interception strategy. This is the only place that decides it.

use serde::{Deserialize, Serialize};

use super::Value;

/// Structural kind of a raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawKind {
    /// Plain record with named properties.
    Record,
    /// Indexable sequence with a length.
    Sequence,
    /// Key-value container.
    Map,
    /// Unique-value container.
    Set,
    /// Key-value container with weakly held aggregate keys.
    WeakMap,
    /// Unique-value container with weakly held aggregate members.
    WeakSet,
    /// Primitives, references and anything else that is never wrapped.
    Unsupported,
}

impl RawKind {
    /// Classify a value.
    ///
    /// Observed handles report the kind of the target they wrap.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Target(target) => target.kind(),
            Value::Handle(handle) => handle.raw().kind(),
            _ => RawKind::Unsupported,
        }
    }

    /// Whether values of this kind can be wrapped at all.
    pub fn is_observable(self) -> bool {
        self != RawKind::Unsupported
    }

    /// Whether this kind is intercepted through dedicated container
    /// operations rather than generic property access.
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            RawKind::Map | RawKind::Set | RawKind::WeakMap | RawKind::WeakSet
        )
    }

    /// Whether this kind holds its keys weakly.
    pub fn is_weak(self) -> bool {
        matches!(self, RawKind::WeakMap | RawKind::WeakSet)
    }

    /// Whether iterating this kind yields key/value pairs.
    pub fn is_keyed(self) -> bool {
        matches!(self, RawKind::Map | RawKind::WeakMap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Target;

    #[test]
    fn primitives_are_unsupported() {
        assert_eq!(RawKind::of(&Value::from(1)), RawKind::Unsupported);
        assert_eq!(RawKind::of(&Value::from("x")), RawKind::Unsupported);
        assert_eq!(RawKind::of(&Value::Null), RawKind::Unsupported);
        assert_eq!(RawKind::of(&Value::Undefined), RawKind::Unsupported);
    }

    #[test]
    fn targets_report_their_shape() {
        let cases = [
            (Target::record([("a", 1)]), RawKind::Record),
            (Target::sequence([1, 2]), RawKind::Sequence),
            (Target::map([("k", 1)]), RawKind::Map),
            (Target::set_of([1]), RawKind::Set),
            (Target::weak_map(), RawKind::WeakMap),
            (Target::weak_set(), RawKind::WeakSet),
        ];
        for (target, kind) in cases {
            assert_eq!(RawKind::of(&Value::Target(target)), kind);
        }
    }

    #[test]
    fn kind_predicates() {
        assert!(RawKind::Map.is_collection());
        assert!(RawKind::WeakSet.is_weak());
        assert!(!RawKind::Record.is_collection());
        assert!(!RawKind::Unsupported.is_observable());
        assert!(RawKind::WeakMap.is_keyed());
        assert!(!RawKind::Set.is_keyed());
    }
}
