//! Document store access layer for a resource-provider control plane.
//! Persists resources, operations and subscriptions with optimistic
//! concurrency over a partitioned JSON document store.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod partition_key;
pub mod repo;
pub mod store;

pub use config::{ConfigError, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::document::{Document, DocumentKind, ProvisioningState};
pub use model::operation::{OperationDocument, OperationError, OperationRequest};
pub use model::resource::ResourceDocument;
pub use model::resource_id::{ResourceId, ResourceIdError};
pub use model::subscription::{
    PartitionIndexEntry, Subscription, SubscriptionDocument, SubscriptionState,
};
pub use partition_key::{new_partition_key, PartitionKey, OPERATIONS_PARTITION_KEY};
pub use repo::{
    DbClient, DbIterator, DocumentDbClient, DocumentIter, Lock, LockClient, RepoError,
    RepoResult, MAX_UPDATE_ATTEMPTS,
};
pub use store::{Container, Database, SqliteDatabase, StoreError, StoreResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
