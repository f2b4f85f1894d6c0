//! Named leases over the `Locks` container.
//!
//! # Responsibility
//! - Give callers coarse-grained exclusion that per-document etags do not
//!   cover (e.g. one worker per cluster).
//!
//! # Invariants
//! - A lock is one item whose id and partition key are the lowercase name.
//! - Expiry is enforced by the container TTL; a holder that stops renewing
//!   loses the lock after `ttl`.
//! - Renew and release are conditional on the holder's etag, so a holder
//!   can never touch a lock someone else has since acquired.

use super::error::{RepoError, RepoResult, StoreAction};
use crate::model::document::DocumentKind;
use crate::partition_key::PartitionKey;
use crate::store::{Container, StoreError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Serialize, Deserialize)]
struct LockDocument {
    id: String,
    owner: String,
    ttl: i64,
}

/// A held lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    name: String,
    owner: String,
    etag: String,
}

impl Lock {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

pub struct LockClient {
    container: Arc<dyn Container>,
    ttl: Duration,
    poll_interval: Duration,
}

impl LockClient {
    pub fn new(container: Arc<dyn Container>, ttl: Duration) -> Self {
        Self {
            container,
            ttl: ttl.max(Duration::from_secs(1)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Acquires `name` if nobody holds it. `Ok(None)` means it is taken.
    pub fn try_acquire(&self, name: &str) -> RepoResult<Option<Lock>> {
        let name = name.to_lowercase();
        let owner = Uuid::new_v4().to_string();
        let data = self.lock_body(&name, &owner)?;

        match self.container.create_item(&PartitionKey::new(&name), &data) {
            Ok(etag) => {
                info!("event=lock_acquire module=repo status=ok name={name} owner={owner}");
                Ok(Some(Lock { name, owner, etag }))
            }
            Err(StoreError::Conflict) => {
                debug!("event=lock_acquire module=repo status=busy name={name}");
                Ok(None)
            }
            Err(err) => Err(RepoError::store(
                StoreAction::Create,
                DocumentKind::Lock,
                name,
                err,
            )),
        }
    }

    /// Polls `try_acquire` until it succeeds or `timeout` elapses.
    pub fn acquire(&self, name: &str, timeout: Duration) -> RepoResult<Option<Lock>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(lock) = self.try_acquire(name)? {
                return Ok(Some(lock));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    /// Extends the lease. `Ok(false)` means the lock was lost.
    pub fn renew(&self, lock: &mut Lock) -> RepoResult<bool> {
        let data = self.lock_body(&lock.name, &lock.owner)?;
        let pk = PartitionKey::new(&lock.name);

        match self
            .container
            .replace_item(&pk, &lock.name, &data, Some(&lock.etag))
        {
            Ok(etag) => {
                lock.etag = etag;
                Ok(true)
            }
            Err(StoreError::NotFound | StoreError::PreconditionFailed) => {
                warn!(
                    "event=lock_renew module=repo status=lost name={} owner={}",
                    lock.name, lock.owner
                );
                Ok(false)
            }
            Err(err) => Err(RepoError::store(
                StoreAction::Replace,
                DocumentKind::Lock,
                lock.name.clone(),
                err,
            )),
        }
    }

    /// Releases the lock. A lock that already expired or changed hands is
    /// left alone.
    pub fn release(&self, lock: Lock) -> RepoResult<()> {
        let pk = PartitionKey::new(&lock.name);
        match self
            .container
            .delete_item(&pk, &lock.name, Some(&lock.etag))
        {
            Ok(()) => {
                info!("event=lock_release module=repo status=ok name={}", lock.name);
                Ok(())
            }
            Err(StoreError::NotFound | StoreError::PreconditionFailed) => {
                warn!(
                    "event=lock_release module=repo status=lost name={} owner={}",
                    lock.name, lock.owner
                );
                Ok(())
            }
            Err(err) => Err(RepoError::store(
                StoreAction::Delete,
                DocumentKind::Lock,
                lock.name,
                err,
            )),
        }
    }

    fn lock_body(&self, name: &str, owner: &str) -> RepoResult<Vec<u8>> {
        let doc = LockDocument {
            id: name.to_string(),
            owner: owner.to_string(),
            ttl: i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX),
        };
        serde_json::to_vec(&doc).map_err(|source| RepoError::Marshal {
            kind: DocumentKind::Lock,
            key: name.to_string(),
            source,
        })
    }
}
