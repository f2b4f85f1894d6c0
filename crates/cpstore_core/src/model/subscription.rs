//! Subscription registration state and the partition index entry.

use super::document::{Document, DocumentKind};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// ARM subscription lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionState {
    Registered,
    Unregistered,
    Warned,
    Suspended,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub state: SubscriptionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_date: Option<String>,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub properties: JsonValue,
}

impl Subscription {
    pub fn new(state: SubscriptionState) -> Self {
        Self {
            state,
            registration_date: None,
            properties: JsonValue::Null,
        }
    }
}

/// Subscription record; its id is also its partition key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDocument {
    pub id: String,
    pub partition_key: String,
    pub subscription: Subscription,
    #[serde(rename = "_etag", default, skip_serializing)]
    pub etag: Option<String>,
}

impl SubscriptionDocument {
    pub fn new(subscription_id: &str, subscription: Subscription) -> Self {
        let id = subscription_id.to_lowercase();
        Self {
            partition_key: id.clone(),
            id,
            subscription,
            etag: None,
        }
    }
}

impl Document for SubscriptionDocument {
    const KIND: DocumentKind = DocumentKind::Subscription;

    fn id(&self) -> &str {
        &self.id
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}

/// Marks one partition key as in use. The indexed key is the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionIndexEntry {
    pub id: String,
    #[serde(rename = "_etag", default, skip_serializing)]
    pub etag: Option<String>,
}

impl Document for PartitionIndexEntry {
    const KIND: DocumentKind = DocumentKind::PartitionIndexEntry;

    fn id(&self) -> &str {
        &self.id
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }
}
