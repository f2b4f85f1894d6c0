//! Shared document contract and container names.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

pub const LOCKS_CONTAINER: &str = "Locks";
pub const OPERATIONS_CONTAINER: &str = "Operations";
pub const PARTITION_KEYS_CONTAINER: &str = "PartitionKeys";
pub const RESOURCES_CONTAINER: &str = "Resources";
pub const SUBSCRIPTIONS_CONTAINER: &str = "Subscriptions";

/// Record kinds handled by the document layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Resource,
    Operation,
    Subscription,
    PartitionIndexEntry,
    Lock,
}

impl DocumentKind {
    pub fn container_name(self) -> &'static str {
        match self {
            Self::Resource => RESOURCES_CONTAINER,
            Self::Operation => OPERATIONS_CONTAINER,
            Self::Subscription => SUBSCRIPTIONS_CONTAINER,
            Self::PartitionIndexEntry => PARTITION_KEYS_CONTAINER,
            Self::Lock => LOCKS_CONTAINER,
        }
    }
}

impl Display for DocumentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.container_name())
    }
}

/// A JSON record stored in one container.
///
/// `etag` is the version read from the store; it is never serialized back.
pub trait Document: Serialize + DeserializeOwned {
    const KIND: DocumentKind;

    fn id(&self) -> &str;

    fn etag(&self) -> Option<&str>;
}

/// ARM provisioning state, shared by resources and operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningState {
    #[default]
    Accepted,
    Provisioning,
    Updating,
    Deleting,
    Succeeded,
    Failed,
    Canceled,
}

impl ProvisioningState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

pub(crate) fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
