//! Partition key policy.
//!
//! # Invariants
//! - Partition keys are always lowercase, whatever casing the caller used.
//! - Operation documents all live in one well-known partition.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Shared partition for every operation document.
///
/// Partition-scoped queries are the only query shape the store offers, and
/// the backend needs to enumerate all operations, so they are kept in one
/// partition and cleaned up by the container TTL. Once cross-partition
/// queries are available this can move to subscription ids, with lookups
/// falling back to this partition until old items expire.
pub const OPERATIONS_PARTITION_KEY: &str = "workaround";

/// Partition holding every partition index entry.
pub const PARTITION_INDEX_PARTITION_KEY: &str = "partitionkeys";

/// Lowercase partition identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Builds a partition key, normalizing it to lowercase.
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Partition used by every operation document.
    pub fn operations() -> Self {
        Self::new(OPERATIONS_PARTITION_KEY)
    }

    /// Partition used by the partition index itself.
    pub fn partition_index() -> Self {
        Self::new(PARTITION_INDEX_PARTITION_KEY)
    }
}

impl Display for PartitionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for PartitionKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<PartitionKey> for String {
    fn from(value: PartitionKey) -> Self {
        value.0
    }
}

/// Derives the partition key for records owned by a subscription.
pub fn new_partition_key(subscription_id: &str) -> PartitionKey {
    PartitionKey::new(subscription_id)
}

#[cfg(test)]
mod tests {
    use super::{new_partition_key, PartitionKey, OPERATIONS_PARTITION_KEY};

    #[test]
    fn mixed_case_subscription_ids_share_a_partition() {
        let mixed = "0B6F2C4E-93A1-4C55-9E1D-7A2B3C4D5E6F";
        assert_eq!(
            new_partition_key(mixed),
            new_partition_key(&mixed.to_lowercase())
        );
        assert_eq!(
            new_partition_key(mixed).as_str(),
            "0b6f2c4e-93a1-4c55-9e1d-7a2b3c4d5e6f"
        );
    }

    #[test]
    fn operations_partition_is_the_literal_workaround() {
        assert_eq!(PartitionKey::operations().as_str(), OPERATIONS_PARTITION_KEY);
    }

    #[test]
    fn deserialized_keys_are_normalized() {
        let key: PartitionKey = serde_json::from_str("\"ABC\"").unwrap();
        assert_eq!(key.as_str(), "abc");
    }
}
