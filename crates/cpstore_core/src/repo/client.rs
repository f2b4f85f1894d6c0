//! Typed document facade over the store containers.
//!
//! # Responsibility
//! - Expose get/create/update/delete/list for resources, operations and
//!   subscriptions behind the `DbClient` trait.
//! - Normalize ids and partition keys before any store call.
//! - Keep the partition index current when subscriptions are created.
//!
//! # Invariants
//! - Callers get a decoded document, `RepoError::NotFound` or a wrapped
//!   error. Never a partially decoded document.
//! - Deleting something already gone succeeds.
//! - Updates go through `update_document` and never write blindly.

use super::error::{RepoError, RepoResult, StoreAction};
use super::iterator::{DbIterator, DocumentIter, PagingMode, QueryItemsIterator};
use super::lock::LockClient;
use super::partition_index::PartitionIndex;
use super::update::update_document;
use crate::model::document::{
    Document, DocumentKind, LOCKS_CONTAINER, OPERATIONS_CONTAINER, PARTITION_KEYS_CONTAINER,
    RESOURCES_CONTAINER, SUBSCRIPTIONS_CONTAINER,
};
use crate::model::operation::OperationDocument;
use crate::model::resource::ResourceDocument;
use crate::model::resource_id::ResourceId;
use crate::model::subscription::SubscriptionDocument;
use crate::partition_key::{new_partition_key, PartitionKey};
use crate::store::{Container, Database, ItemQuery, QueryOptions, QueryPager, StoreError};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Callback used by the update operations; returns whether it changed the
/// document.
pub type Mutation<'a, T> = &'a mut dyn FnMut(&mut T) -> bool;

/// Reads and decodes one document.
pub(crate) fn read_document<T: Document>(
    container: &dyn Container,
    partition_key: &PartitionKey,
    id: &str,
) -> RepoResult<T> {
    let response = match container.read_item(partition_key, id) {
        Ok(response) => response,
        Err(StoreError::NotFound) => return Err(RepoError::not_found(T::KIND, id)),
        Err(err) => return Err(RepoError::store(StoreAction::Read, T::KIND, id, err)),
    };
    serde_json::from_slice(&response.body).map_err(|source| RepoError::Unmarshal {
        kind: T::KIND,
        key: id.to_string(),
        source,
    })
}

fn encode<T: Document>(doc: &T, key: &str) -> RepoResult<Vec<u8>> {
    serde_json::to_vec(doc).map_err(|source| RepoError::Marshal {
        kind: T::KIND,
        key: key.to_string(),
        source,
    })
}

/// Document operations used by the control plane.
pub trait DbClient: Send + Sync {
    /// Cheap database read proving the store is reachable.
    fn db_connection_test(&self) -> RepoResult<()>;

    /// Lock manager, when the deployment provides a locks container.
    fn lock_client(&self) -> Option<&LockClient>;

    fn get_resource_doc(&self, resource_id: &ResourceId) -> RepoResult<ResourceDocument>;
    fn create_resource_doc(&self, doc: &mut ResourceDocument) -> RepoResult<()>;
    fn update_resource_doc(
        &self,
        resource_id: &ResourceId,
        mutate: Mutation<'_, ResourceDocument>,
    ) -> RepoResult<bool>;
    fn delete_resource_doc(&self, resource_id: &ResourceId) -> RepoResult<()>;
    /// Resources strictly below `prefix`. A positive `max_items` returns one
    /// page and leaves a continuation token on the iterator.
    fn list_resource_docs(
        &self,
        prefix: &ResourceId,
        max_items: i32,
        continuation_token: Option<String>,
    ) -> DocumentIter<ResourceDocument>;

    fn get_operation_doc(&self, operation_id: &str) -> RepoResult<OperationDocument>;
    /// Stores the operation and returns its id.
    fn create_operation_doc(&self, doc: &mut OperationDocument) -> RepoResult<String>;
    fn update_operation_doc(
        &self,
        operation_id: &str,
        mutate: Mutation<'_, OperationDocument>,
    ) -> RepoResult<bool>;
    fn delete_operation_doc(&self, operation_id: &str) -> RepoResult<()>;
    fn list_operation_docs(&self, subscription_id: &str) -> DocumentIter<OperationDocument>;

    fn get_subscription_doc(&self, subscription_id: &str) -> RepoResult<SubscriptionDocument>;
    fn create_subscription_doc(
        &self,
        subscription_id: &str,
        doc: &mut SubscriptionDocument,
    ) -> RepoResult<()>;
    fn update_subscription_doc(
        &self,
        subscription_id: &str,
        mutate: Mutation<'_, SubscriptionDocument>,
    ) -> RepoResult<bool>;
    fn delete_subscription_doc(&self, subscription_id: &str) -> RepoResult<()>;
    fn list_all_subscription_docs(&self) -> DocumentIter<SubscriptionDocument>;
}

/// `DbClient` backed by a partitioned document database.
pub struct DocumentDbClient {
    database: Arc<dyn Database>,
    resources: Arc<dyn Container>,
    operations: Arc<dyn Container>,
    subscriptions: Arc<dyn Container>,
    partition_index: PartitionIndex,
    lock_client: Option<LockClient>,
}

impl DocumentDbClient {
    /// Resolves every container up front. A missing `Locks` container only
    /// disables the lock client.
    pub fn new(database: Arc<dyn Database>, lock_ttl: Duration) -> RepoResult<Self> {
        let open = |kind: DocumentKind| {
            database
                .container(kind.container_name())
                .map_err(|err| RepoError::store(StoreAction::Open, kind, kind.container_name(), err))
        };

        let resources = open(DocumentKind::Resource)?;
        let operations = open(DocumentKind::Operation)?;
        let subscriptions = open(DocumentKind::Subscription)?;
        let partition_keys = open(DocumentKind::PartitionIndexEntry)?;

        let lock_client = match database.container(LOCKS_CONTAINER) {
            Ok(container) => Some(LockClient::new(container, lock_ttl)),
            Err(StoreError::ContainerNotFound(_)) => {
                warn!("event=client_open module=repo status=degraded reason=no_locks_container");
                None
            }
            Err(err) => {
                return Err(RepoError::store(
                    StoreAction::Open,
                    DocumentKind::Lock,
                    LOCKS_CONTAINER,
                    err,
                ))
            }
        };

        info!(
            "event=client_open module=repo status=ok containers={},{},{},{} locks={}",
            RESOURCES_CONTAINER,
            OPERATIONS_CONTAINER,
            SUBSCRIPTIONS_CONTAINER,
            PARTITION_KEYS_CONTAINER,
            lock_client.is_some()
        );

        Ok(Self {
            database,
            resources,
            operations,
            subscriptions,
            partition_index: PartitionIndex::new(partition_keys),
            lock_client,
        })
    }

    pub fn partition_index(&self) -> &PartitionIndex {
        &self.partition_index
    }

    fn query_iter<T>(
        &self,
        container: &Arc<dyn Container>,
        partition_key: PartitionKey,
        query: ItemQuery,
        max_items: i32,
        continuation_token: Option<String>,
        context: String,
    ) -> DocumentIter<T>
    where
        T: Document + Send + 'static,
    {
        let max_items = max_items.max(-1);
        let pager = QueryPager::new(
            Arc::clone(container),
            partition_key,
            query,
            QueryOptions {
                page_size_hint: max_items,
                continuation_token,
            },
        );
        Box::new(QueryItemsIterator::<T>::new(
            pager,
            PagingMode::for_max_items(max_items),
            T::KIND,
            context,
        ))
    }

    fn delete_ignoring_absent(
        &self,
        container: &dyn Container,
        kind: DocumentKind,
        partition_key: &PartitionKey,
        id: &str,
        key: &str,
    ) -> RepoResult<()> {
        match container.delete_item(partition_key, id, None) {
            Ok(()) => {
                debug!("event=doc_delete module=repo status=ok kind={kind} key={key}");
                Ok(())
            }
            Err(StoreError::NotFound) => {
                debug!("event=doc_delete module=repo status=absent kind={kind} key={key}");
                Ok(())
            }
            Err(err) => Err(RepoError::store(StoreAction::Delete, kind, key, err)),
        }
    }
}

impl DbClient for DocumentDbClient {
    fn db_connection_test(&self) -> RepoResult<()> {
        self.database.read().map_err(|err| {
            warn!("event=db_healthcheck module=repo status=error error={err}");
            RepoError::Connectivity(err)
        })?;
        Ok(())
    }

    fn lock_client(&self) -> Option<&LockClient> {
        self.lock_client.as_ref()
    }

    fn get_resource_doc(&self, resource_id: &ResourceId) -> RepoResult<ResourceDocument> {
        let key = resource_id.to_lowercase();
        let mut iter: DocumentIter<ResourceDocument> = self.query_iter(
            &self.resources,
            new_partition_key(resource_id.subscription_id()),
            ItemQuery::string_equals("key", key.as_str(), false),
            1,
            None,
            key.clone(),
        );

        match iter.next() {
            Some(mut doc) => {
                // Hand back the caller's casing, not whatever was stored.
                doc.resource_id = resource_id.clone();
                Ok(doc)
            }
            None => match iter.take_error() {
                Some(err) => Err(err),
                None => Err(RepoError::not_found(DocumentKind::Resource, key)),
            },
        }
    }

    fn create_resource_doc(&self, doc: &mut ResourceDocument) -> RepoResult<()> {
        doc.partition_key = new_partition_key(doc.resource_id.subscription_id()).into();
        doc.key = doc.resource_id.to_lowercase();
        doc.id = doc.id.to_lowercase();

        let data = encode(&*doc, &doc.key)?;
        let etag = self
            .resources
            .create_item(&PartitionKey::new(&doc.partition_key), &data)
            .map_err(|err| {
                RepoError::store(StoreAction::Create, DocumentKind::Resource, doc.key.as_str(), err)
            })?;
        doc.etag = Some(etag);
        debug!("event=doc_create module=repo status=ok kind=Resources key={}", doc.key);
        Ok(())
    }

    fn update_resource_doc(
        &self,
        resource_id: &ResourceId,
        mutate: Mutation<'_, ResourceDocument>,
    ) -> RepoResult<bool> {
        let partition_key = new_partition_key(resource_id.subscription_id());
        update_document(
            self.resources.as_ref(),
            &partition_key,
            resource_id.as_str(),
            || self.get_resource_doc(resource_id),
            mutate,
        )
    }

    fn delete_resource_doc(&self, resource_id: &ResourceId) -> RepoResult<()> {
        let doc = match self.get_resource_doc(resource_id) {
            Ok(doc) => doc,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };
        self.delete_ignoring_absent(
            self.resources.as_ref(),
            DocumentKind::Resource,
            &PartitionKey::new(&doc.partition_key),
            &doc.id,
            resource_id.as_str(),
        )
    }

    fn list_resource_docs(
        &self,
        prefix: &ResourceId,
        max_items: i32,
        continuation_token: Option<String>,
    ) -> DocumentIter<ResourceDocument> {
        // `key` is stored lowercased, so an exact prefix match suffices.
        let prefix_str = format!("{}/", prefix.to_lowercase());
        self.query_iter(
            &self.resources,
            new_partition_key(prefix.subscription_id()),
            ItemQuery::starts_with("key", prefix_str.as_str(), false),
            max_items,
            continuation_token,
            prefix_str,
        )
    }

    fn get_operation_doc(&self, operation_id: &str) -> RepoResult<OperationDocument> {
        read_document(
            self.operations.as_ref(),
            &PartitionKey::operations(),
            &operation_id.to_lowercase(),
        )
    }

    fn create_operation_doc(&self, doc: &mut OperationDocument) -> RepoResult<String> {
        doc.id = doc.id.to_lowercase();
        doc.partition_key = PartitionKey::operations().into();

        let data = encode(&*doc, &doc.id)?;
        let etag = self
            .operations
            .create_item(&PartitionKey::operations(), &data)
            .map_err(|err| {
                RepoError::store(StoreAction::Create, DocumentKind::Operation, doc.id.as_str(), err)
            })?;
        doc.etag = Some(etag);
        debug!("event=doc_create module=repo status=ok kind=Operations key={}", doc.id);
        Ok(doc.id.clone())
    }

    fn update_operation_doc(
        &self,
        operation_id: &str,
        mutate: Mutation<'_, OperationDocument>,
    ) -> RepoResult<bool> {
        let operation_id = operation_id.to_lowercase();
        update_document(
            self.operations.as_ref(),
            &PartitionKey::operations(),
            &operation_id,
            || self.get_operation_doc(&operation_id),
            mutate,
        )
    }

    fn delete_operation_doc(&self, operation_id: &str) -> RepoResult<()> {
        let operation_id = operation_id.to_lowercase();
        self.delete_ignoring_absent(
            self.operations.as_ref(),
            DocumentKind::Operation,
            &PartitionKey::operations(),
            &operation_id,
            &operation_id,
        )
    }

    fn list_operation_docs(&self, subscription_id: &str) -> DocumentIter<OperationDocument> {
        let prefix = format!("/subscriptions/{}/", subscription_id.to_lowercase());
        self.query_iter(
            &self.operations,
            PartitionKey::operations(),
            ItemQuery::starts_with("externalId", prefix.as_str(), true),
            -1,
            None,
            prefix,
        )
    }

    fn get_subscription_doc(&self, subscription_id: &str) -> RepoResult<SubscriptionDocument> {
        let partition_key = new_partition_key(subscription_id);
        read_document(
            self.subscriptions.as_ref(),
            &partition_key,
            partition_key.as_str(),
        )
    }

    fn create_subscription_doc(
        &self,
        subscription_id: &str,
        doc: &mut SubscriptionDocument,
    ) -> RepoResult<()> {
        let partition_key = new_partition_key(subscription_id);
        doc.id = partition_key.as_str().to_string();
        doc.partition_key = partition_key.as_str().to_string();

        let data = encode(&*doc, &doc.id)?;
        let etag = self
            .subscriptions
            .create_item(&partition_key, &data)
            .map_err(|err| {
                RepoError::store(
                    StoreAction::Create,
                    DocumentKind::Subscription,
                    partition_key.as_str(),
                    err,
                )
            })?;
        doc.etag = Some(etag);

        self.partition_index.upsert(&partition_key)?;
        debug!("event=doc_create module=repo status=ok kind=Subscriptions key={partition_key}");
        Ok(())
    }

    fn update_subscription_doc(
        &self,
        subscription_id: &str,
        mutate: Mutation<'_, SubscriptionDocument>,
    ) -> RepoResult<bool> {
        let partition_key = new_partition_key(subscription_id);
        update_document(
            self.subscriptions.as_ref(),
            &partition_key,
            partition_key.as_str(),
            || self.get_subscription_doc(subscription_id),
            mutate,
        )
    }

    fn delete_subscription_doc(&self, subscription_id: &str) -> RepoResult<()> {
        let partition_key = new_partition_key(subscription_id);
        self.delete_ignoring_absent(
            self.subscriptions.as_ref(),
            DocumentKind::Subscription,
            &partition_key,
            partition_key.as_str(),
            partition_key.as_str(),
        )
    }

    fn list_all_subscription_docs(&self) -> DocumentIter<SubscriptionDocument> {
        Box::new(
            self.partition_index
                .list_all(Arc::clone(&self.subscriptions)),
        )
    }
}
