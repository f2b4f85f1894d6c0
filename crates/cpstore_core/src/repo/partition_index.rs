//! Partition key index used to list subscriptions.
//!
//! # Responsibility
//! - Record every partition key in use by the subscription and resource
//!   containers.
//! - Enumerate subscriptions by reading one document per indexed key.
//!
//! # Invariants
//! - Entries live in one well-known partition so they can be listed.
//! - Upserts are idempotent; entries are never deleted here.
//! - Listing costs one point read per indexed key. The index can go away
//!   once the store supports cross-partition queries.
//! - An indexed key without a subscription document is skipped.

use super::client::read_document;
use super::error::{RepoError, RepoResult, StoreAction};
use super::iterator::{DbIterator, PagingMode, QueryItemsIterator};
use crate::model::document::DocumentKind;
use crate::model::subscription::{PartitionIndexEntry, SubscriptionDocument};
use crate::partition_key::PartitionKey;
use crate::store::{Container, ItemQuery, QueryOptions, QueryPager};
use log::{debug, warn};
use std::sync::Arc;

pub struct PartitionIndex {
    container: Arc<dyn Container>,
}

impl PartitionIndex {
    pub fn new(container: Arc<dyn Container>) -> Self {
        Self { container }
    }

    /// Marks `key` as in use.
    pub fn upsert(&self, key: &PartitionKey) -> RepoResult<()> {
        let entry = PartitionIndexEntry {
            id: key.as_str().to_string(),
            etag: None,
        };
        let data = serde_json::to_vec(&entry).map_err(|source| RepoError::Marshal {
            kind: DocumentKind::PartitionIndexEntry,
            key: entry.id.clone(),
            source,
        })?;

        self.container
            .upsert_item(&PartitionKey::partition_index(), &data)
            .map_err(|err| {
                RepoError::store(
                    StoreAction::Upsert,
                    DocumentKind::PartitionIndexEntry,
                    key.as_str(),
                    err,
                )
            })?;
        debug!("event=partition_index_upsert module=repo status=ok key={key}");
        Ok(())
    }

    /// Every indexed partition key.
    pub fn list_keys(&self) -> QueryItemsIterator<PartitionIndexEntry> {
        let pager = QueryPager::new(
            Arc::clone(&self.container),
            PartitionKey::partition_index(),
            ItemQuery::All,
            QueryOptions::default(),
        );
        QueryItemsIterator::new(
            pager,
            PagingMode::FullDrain,
            DocumentKind::PartitionIndexEntry,
            PartitionKey::partition_index().as_str(),
        )
    }

    /// Subscription documents for every indexed key.
    pub fn list_all(&self, subscriptions: Arc<dyn Container>) -> SubscriptionIterator {
        SubscriptionIterator {
            keys: self.list_keys(),
            subscriptions,
            error: None,
            done: false,
        }
    }
}

/// Cross-partition subscription listing driven by the index.
///
/// Drains the index fully; it never yields a continuation token.
pub struct SubscriptionIterator {
    keys: QueryItemsIterator<PartitionIndexEntry>,
    subscriptions: Arc<dyn Container>,
    error: Option<RepoError>,
    done: bool,
}

impl Iterator for SubscriptionIterator {
    type Item = SubscriptionDocument;

    fn next(&mut self) -> Option<SubscriptionDocument> {
        while !self.done {
            let Some(entry) = self.keys.next() else {
                self.error = self.keys.take_error();
                self.done = true;
                break;
            };

            let partition_key = PartitionKey::new(&entry.id);
            match read_document::<SubscriptionDocument>(
                self.subscriptions.as_ref(),
                &partition_key,
                partition_key.as_str(),
            ) {
                Ok(doc) => return Some(doc),
                Err(err) if err.is_not_found() => {
                    warn!(
                        "event=subscription_list module=repo status=skip key={} reason=missing_document",
                        partition_key
                    );
                }
                Err(err) => {
                    self.error = Some(err);
                    self.done = true;
                }
            }
        }
        None
    }
}

impl DbIterator<SubscriptionDocument> for SubscriptionIterator {
    fn continuation_token(&self) -> Option<&str> {
        None
    }

    fn error(&self) -> Option<&RepoError> {
        self.error.as_ref()
    }

    fn take_error(&mut self) -> Option<RepoError> {
        self.error.take()
    }
}
