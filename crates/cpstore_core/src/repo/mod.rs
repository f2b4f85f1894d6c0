//! Document access layer over the store containers.
//!
//! # Responsibility
//! - Provide typed, case-normalized access to resource, operation and
//!   subscription documents.
//! - Run every update through the optimistic concurrency loop.
//! - Keep paging and cross-partition listing behind plain iterators.
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`) in addition to
//!   store transport errors.
//! - Only etag precondition failures are retried, and only by `update`.
//!
//! # See also
//! - `store` for the backing container contracts.

pub mod client;
pub mod error;
pub mod iterator;
pub mod lock;
pub mod partition_index;
pub mod update;

pub use client::{DbClient, DocumentDbClient, Mutation};
pub use error::{RepoError, RepoResult, StoreAction};
pub use iterator::{DbIterator, DocumentIter, PagingMode, QueryItemsIterator};
pub use lock::{Lock, LockClient};
pub use partition_index::{PartitionIndex, SubscriptionIterator};
pub use update::{update_document, MAX_UPDATE_ATTEMPTS};
