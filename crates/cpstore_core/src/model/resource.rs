//! Managed resource state.
//!
//! # Invariants
//! - `partition_key` is the lowercase owning subscription id.
//! - `key` is the lowercase resource id and drives lookups.
//! - `resource_id` keeps the most recently supplied casing.

use super::document::{Document, DocumentKind, ProvisioningState};
use super::resource_id::ResourceId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDocument {
    /// Store id, unrelated to the resource id.
    pub id: String,
    pub partition_key: String,
    pub key: String,
    pub resource_id: ResourceId,
    #[serde(default)]
    pub internal_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_operation_id: Option<String>,
    #[serde(default)]
    pub provisioning_state: ProvisioningState,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Arbitrary resource state owned by the caller.
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub properties: JsonValue,
    #[serde(rename = "_etag", default, skip_serializing)]
    pub etag: Option<String>,
}

impl ResourceDocument {
    pub fn new(resource_id: ResourceId) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            partition_key: resource_id.subscription_id().to_lowercase(),
            key: resource_id.to_lowercase(),
            resource_id,
            internal_id: String::new(),
            active_operation_id: None,
            provisioning_state: ProvisioningState::default(),
            tags: BTreeMap::new(),
            properties: JsonValue::Null,
            etag: None,
        }
    }
}

impl Document for ResourceDocument {
    const KIND: DocumentKind = DocumentKind::Resource;

    fn id(&self) -> &str {
        &self.id
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}
