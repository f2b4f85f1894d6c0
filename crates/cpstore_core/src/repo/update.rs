//! Optimistic read-modify-write loop.
//!
//! # Responsibility
//! - Apply a caller mutation to the latest version of a document and write
//!   it back only if nobody else wrote in between.
//!
//! # Invariants
//! - Only etag precondition failures are retried, at most
//!   `MAX_UPDATE_ATTEMPTS` times in total, without delay.
//! - A mutation that reports no change never causes a write.
//! - The mutation may run once per attempt against a freshly read document.

use super::error::{RepoError, RepoResult, StoreAction};
use crate::model::document::Document;
use crate::partition_key::PartitionKey;
use crate::store::Container;
use log::{debug, warn};

/// Attempts made before a conflicting update gives up.
pub const MAX_UPDATE_ATTEMPTS: usize = 5;

/// Runs the optimistic update protocol for one document.
///
/// `fetch` reads the current document (its `NotFound` is returned as is);
/// `mutate` edits it in place and returns whether it changed anything.
///
/// Returns `Ok(true)` when the document was replaced and `Ok(false)` when
/// `mutate` declined to change it.
pub fn update_document<T, G, F>(
    container: &dyn Container,
    partition_key: &PartitionKey,
    key: &str,
    mut fetch: G,
    mut mutate: F,
) -> RepoResult<bool>
where
    T: Document,
    G: FnMut() -> RepoResult<T>,
    F: FnMut(&mut T) -> bool,
{
    let mut attempt = 0;
    loop {
        attempt += 1;

        let mut doc = fetch()?;
        if !mutate(&mut doc) {
            debug!(
                "event=doc_update module=repo status=noop kind={} key={} attempt={}",
                T::KIND,
                key,
                attempt
            );
            return Ok(false);
        }

        let data = serde_json::to_vec(&doc).map_err(|source| RepoError::Marshal {
            kind: T::KIND,
            key: key.to_string(),
            source,
        })?;

        let err = match container.replace_item(partition_key, doc.id(), &data, doc.etag()) {
            Ok(_) => {
                debug!(
                    "event=doc_update module=repo status=ok kind={} key={} attempt={}",
                    T::KIND,
                    key,
                    attempt
                );
                return Ok(true);
            }
            Err(err) => err,
        };

        if !err.is_precondition_failed() {
            return Err(RepoError::store(StoreAction::Replace, T::KIND, key, err));
        }
        if attempt >= MAX_UPDATE_ATTEMPTS {
            warn!(
                "event=doc_update module=repo status=error kind={} key={} attempts={} error_code=precondition_retries_exhausted",
                T::KIND,
                key,
                attempt
            );
            return Err(RepoError::store(StoreAction::Replace, T::KIND, key, err));
        }
        debug!(
            "event=doc_update module=repo status=retry kind={} key={} attempt={}",
            T::KIND,
            key,
            attempt
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{update_document, MAX_UPDATE_ATTEMPTS};
    use crate::db::open_db_in_memory;
    use crate::model::subscription::{Subscription, SubscriptionDocument, SubscriptionState};
    use crate::partition_key::PartitionKey;
    use crate::repo::client::read_document;
    use crate::store::{
        Container, Database, ETag, ItemQuery, ItemResponse, QueryOptions, QueryPage,
        SqliteDatabase, StoreError, StoreResult,
    };
    use std::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Delegates everything but fails every replace with a lost precondition.
    struct AlwaysStale {
        inner: Arc<dyn Container>,
        replaces: AtomicUsize,
    }

    impl Container for AlwaysStale {
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn read_item(&self, pk: &PartitionKey, id: &str) -> StoreResult<ItemResponse> {
            self.inner.read_item(pk, id)
        }
        fn create_item(&self, pk: &PartitionKey, body: &[u8]) -> StoreResult<ETag> {
            self.inner.create_item(pk, body)
        }
        fn upsert_item(&self, pk: &PartitionKey, body: &[u8]) -> StoreResult<ETag> {
            self.inner.upsert_item(pk, body)
        }
        fn replace_item(
            &self,
            _pk: &PartitionKey,
            _id: &str,
            _body: &[u8],
            _if_match: Option<&str>,
        ) -> StoreResult<ETag> {
            self.replaces.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::PreconditionFailed)
        }
        fn delete_item(&self, pk: &PartitionKey, id: &str, if_match: Option<&str>) -> StoreResult<()> {
            self.inner.delete_item(pk, id, if_match)
        }
        fn query_items(
            &self,
            pk: &PartitionKey,
            query: &ItemQuery,
            options: &QueryOptions,
        ) -> StoreResult<QueryPage> {
            self.inner.query_items(pk, query, options)
        }
    }

    fn seeded() -> (Arc<dyn Container>, PartitionKey) {
        let db = SqliteDatabase::new(open_db_in_memory().unwrap());
        let container = db.container("Subscriptions").unwrap();
        let doc = SubscriptionDocument::new("sub", Subscription::new(SubscriptionState::Registered));
        let pk = PartitionKey::new("sub");
        container
            .create_item(&pk, &serde_json::to_vec(&doc).unwrap())
            .unwrap();
        (container, pk)
    }

    #[test]
    fn declined_mutation_skips_the_write() {
        let (container, pk) = seeded();
        let before = container.read_item(&pk, "sub").unwrap();

        let changed = update_document(
            container.as_ref(),
            &pk,
            "sub",
            || read_document::<SubscriptionDocument>(container.as_ref(), &pk, "sub"),
            |_| false,
        )
        .unwrap();

        assert!(!changed);
        assert_eq!(container.read_item(&pk, "sub").unwrap(), before);
    }

    #[test]
    fn gives_up_after_bounded_attempts() {
        let (inner, pk) = seeded();
        let stale = AlwaysStale {
            inner,
            replaces: AtomicUsize::new(0),
        };
        let mutations = Cell::new(0);

        let err = update_document(
            &stale,
            &pk,
            "sub",
            || read_document::<SubscriptionDocument>(&stale, &pk, "sub"),
            |doc| {
                mutations.set(mutations.get() + 1);
                doc.subscription.state = SubscriptionState::Warned;
                true
            },
        )
        .unwrap_err();

        assert!(err.store_error().unwrap().is_precondition_failed());
        assert_eq!(stale.replaces.load(Ordering::SeqCst), MAX_UPDATE_ATTEMPTS);
        assert_eq!(mutations.get(), MAX_UPDATE_ATTEMPTS);
    }

    #[test]
    fn missing_document_is_not_retried() {
        let (container, _) = seeded();
        let pk = PartitionKey::new("other");
        let fetches = Cell::new(0);

        let err = update_document(
            container.as_ref(),
            &pk,
            "other",
            || {
                fetches.set(fetches.get() + 1);
                read_document::<SubscriptionDocument>(container.as_ref(), &pk, "other")
            },
            |_| true,
        )
        .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(fetches.get(), 1);
    }
}
