//! Partitioned document database contracts.
//!
//! # Responsibility
//! - Describe the operations the document layer needs from a backing store:
//!   point reads, creates, upserts, conditional replace/delete and
//!   partition-scoped paged queries.
//! - Keep vendor/engine details behind the `Database` and `Container` traits.
//!
//! # Invariants
//! - Every successful write produces a fresh opaque etag.
//! - Bodies returned by reads and queries carry `_etag` and `_ts`.
//! - Expired items are invisible to every operation.
//!
//! # See also
//! - `store::sqlite` for the bundled backend.

use crate::db::DbError;
use crate::partition_key::PartitionKey;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

mod query;
pub mod sqlite;

pub use query::{ItemQuery, QueryOptions, QueryPage, QueryPager};
pub use sqlite::{ContainerTtl, SqliteDatabase, DEFAULT_MAX_PAGE_SIZE};

/// System property holding the item etag.
pub const ETAG_PROPERTY: &str = "_etag";
/// System property holding the last write time in epoch seconds.
pub const TIMESTAMP_PROPERTY: &str = "_ts";

pub type StoreResult<T> = Result<T, StoreError>;

/// Opaque version token that changes on every write.
pub type ETag = String;

/// Errors reported by a backing store.
#[derive(Debug)]
pub enum StoreError {
    /// Item does not exist (or has expired).
    NotFound,
    /// Conditional write lost against a newer version.
    PreconditionFailed,
    /// Create targeted an id that already exists in the partition.
    Conflict,
    ContainerNotFound(String),
    InvalidContinuationToken(String),
    /// Body is not a JSON object with a string `id`.
    InvalidItem(String),
    InvalidQuery(String),
    /// Store handle cannot serve requests anymore.
    Unavailable(String),
    Db(DbError),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict)
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "item not found"),
            Self::PreconditionFailed => write!(f, "etag precondition failed"),
            Self::Conflict => write!(f, "item already exists"),
            Self::ContainerNotFound(name) => write!(f, "container not found: {name}"),
            Self::InvalidContinuationToken(token) => {
                write!(f, "invalid continuation token `{token}`")
            }
            Self::InvalidItem(message) => write!(f, "invalid item: {message}"),
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Result of a point read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResponse {
    /// JSON body including system properties.
    pub body: Vec<u8>,
    pub etag: ETag,
}

/// Metadata returned by a database read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseProperties {
    pub name: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// One container (collection) of JSON items partitioned by key.
pub trait Container: Send + Sync {
    fn name(&self) -> &str;

    fn read_item(&self, partition_key: &PartitionKey, id: &str) -> StoreResult<ItemResponse>;

    /// Creates an item; fails with `Conflict` when the id is taken.
    fn create_item(&self, partition_key: &PartitionKey, body: &[u8]) -> StoreResult<ETag>;

    /// Creates or overwrites an item unconditionally.
    fn upsert_item(&self, partition_key: &PartitionKey, body: &[u8]) -> StoreResult<ETag>;

    /// Replaces an existing item, optionally only if its etag still matches.
    fn replace_item(
        &self,
        partition_key: &PartitionKey,
        id: &str,
        body: &[u8],
        if_match: Option<&str>,
    ) -> StoreResult<ETag>;

    fn delete_item(
        &self,
        partition_key: &PartitionKey,
        id: &str,
        if_match: Option<&str>,
    ) -> StoreResult<()>;

    /// Returns one page of items in a single partition.
    fn query_items(
        &self,
        partition_key: &PartitionKey,
        query: &ItemQuery,
        options: &QueryOptions,
    ) -> StoreResult<QueryPage>;
}

/// Handle to a database holding named containers.
pub trait Database: Send + Sync {
    /// Lightweight read used for connectivity checks.
    fn read(&self) -> StoreResult<DatabaseProperties>;

    fn container(&self, name: &str) -> StoreResult<Arc<dyn Container>>;
}
