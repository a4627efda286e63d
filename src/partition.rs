//! Partition keys: the isolation boundary between knowledge bases.
//!
//! Every node, edge and query in the shared property graph is scoped by a
//! partition key. Two partitions may contain nodes with the same display name
//! without colliding; canonical identity is always `(id, partition)`.

use std::fmt;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from partition key handling.
#[derive(Debug, Error, Diagnostic)]
pub enum PartitionError {
    #[error("partition key must not be empty")]
    #[diagnostic(
        code(tog::partition::empty),
        help("Pass the knowledge-base identifier with --partition or in the request.")
    )]
    Empty,

    #[error("partition key \"{key}\" contains control characters")]
    #[diagnostic(
        code(tog::partition::invalid),
        help("Partition keys are opaque identifiers; use printable characters only.")
    )]
    Invalid { key: String },
}

pub type PartitionResult<T> = std::result::Result<T, PartitionError>;

/// Opaque identifier of one knowledge base within the shared graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Create a partition key, rejecting empty or control-character keys.
    pub fn new(key: impl Into<String>) -> PartitionResult<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(PartitionError::Empty);
        }
        if key.chars().any(char::is_control) {
            return Err(PartitionError::Invalid { key });
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PartitionKey {
    type Error = PartitionError;

    fn try_from(value: String) -> PartitionResult<Self> {
        Self::new(value)
    }
}

impl From<PartitionKey> for String {
    fn from(key: PartitionKey) -> Self {
        key.0
    }
}

impl std::str::FromStr for PartitionKey {
    type Err = PartitionError;

    fn from_str(s: &str) -> PartitionResult<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(PartitionKey::new(""), Err(PartitionError::Empty)));
        assert!(matches!(PartitionKey::new("   "), Err(PartitionError::Empty)));
    }

    #[test]
    fn control_characters_are_rejected() {
        assert!(matches!(
            PartitionKey::new("kb\n1"),
            Err(PartitionError::Invalid { .. })
        ));
    }

    #[test]
    fn deserializes_through_validation() {
        let key: PartitionKey = serde_json::from_str("\"ops-manual\"").unwrap();
        assert_eq!(key.as_str(), "ops-manual");
        assert!(serde_json::from_str::<PartitionKey>("\"\"").is_err());
    }
}
