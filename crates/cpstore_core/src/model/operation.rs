//! Long-running operation state.
//!
//! # Invariants
//! - `id` is lowercase; `external_id` keeps the caller's casing.
//! - `partition_key` is always the shared operations partition.
//! - Expiry is enforced by the container TTL, optionally overridden by `ttl`.

use super::document::{now_epoch_ms, Document, DocumentKind, ProvisioningState};
use super::resource_id::ResourceId;
use crate::partition_key::OPERATIONS_PARTITION_KEY;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of request that started the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationRequest {
    Create,
    Update,
    Delete,
    RequestCredential,
    RevokeCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDocument {
    pub id: String,
    pub partition_key: String,
    pub request: OperationRequest,
    /// Resource the operation acts on.
    pub external_id: ResourceId,
    #[serde(default)]
    pub internal_id: String,
    /// Status endpoint exposed to clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<ResourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_uri: Option<String>,
    /// Epoch milliseconds.
    pub start_time: i64,
    /// Epoch milliseconds.
    pub last_transition_time: i64,
    pub status: ProvisioningState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
    /// Item lifetime in seconds; `-1` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(rename = "_etag", default, skip_serializing)]
    pub etag: Option<String>,
}

impl OperationDocument {
    pub fn new(request: OperationRequest, external_id: ResourceId, internal_id: String) -> Self {
        let now = now_epoch_ms();
        Self {
            id: Uuid::new_v4().to_string(),
            partition_key: OPERATIONS_PARTITION_KEY.to_string(),
            request,
            external_id,
            internal_id,
            operation_id: None,
            notification_uri: None,
            start_time: now,
            last_transition_time: now,
            status: ProvisioningState::Accepted,
            error: None,
            ttl: None,
            etag: None,
        }
    }

    /// Moves the operation to `status`. Returns whether anything changed,
    /// so it can be used directly as an update callback.
    pub fn update_status(
        &mut self,
        status: ProvisioningState,
        error: Option<OperationError>,
    ) -> bool {
        if self.status == status && self.error == error {
            return false;
        }
        self.status = status;
        self.error = error;
        self.last_transition_time = now_epoch_ms();
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl Document for OperationDocument {
    const KIND: DocumentKind = DocumentKind::Operation;

    fn id(&self) -> &str {
        &self.id
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}
