//! Error taxonomy surfaced by the document layer.

use crate::model::document::DocumentKind;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Store call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    Open,
    Read,
    Create,
    Upsert,
    Replace,
    Delete,
    Query,
}

impl StoreAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Read => "read",
            Self::Create => "create",
            Self::Upsert => "upsert",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Query => "query",
        }
    }
}

/// Document layer error.
///
/// `NotFound` is the only condition callers are expected to branch on;
/// everything else carries the container and key for diagnostics.
#[derive(Debug)]
pub enum RepoError {
    NotFound {
        kind: DocumentKind,
        key: String,
    },
    Marshal {
        kind: DocumentKind,
        key: String,
        source: serde_json::Error,
    },
    Unmarshal {
        kind: DocumentKind,
        key: String,
        source: serde_json::Error,
    },
    Store {
        action: StoreAction,
        kind: DocumentKind,
        key: String,
        source: StoreError,
    },
    /// Database unreachable; reported by the health check and bootstrap.
    Connectivity(StoreError),
}

impl RepoError {
    pub fn not_found(kind: DocumentKind, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn store(
        action: StoreAction,
        kind: DocumentKind,
        key: impl Into<String>,
        source: StoreError,
    ) -> Self {
        Self::Store {
            action,
            kind,
            key: key.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Underlying store error, when there is one.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store { source, .. } | Self::Connectivity(source) => Some(source),
            _ => None,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind, key } => {
                write!(f, "{kind} container item for '{key}' not found")
            }
            Self::Marshal { kind, key, source } => {
                write!(f, "failed to marshal {kind} container item for '{key}': {source}")
            }
            Self::Unmarshal { kind, key, source } => {
                write!(f, "failed to unmarshal {kind} container item for '{key}': {source}")
            }
            Self::Store {
                action,
                kind,
                key,
                source,
            } => write!(
                f,
                "failed to {} {kind} container item for '{key}': {source}",
                action.as_str()
            ),
            Self::Connectivity(source) => {
                write!(f, "failed to read database information during healthcheck: {source}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound { .. } => None,
            Self::Marshal { source, .. } | Self::Unmarshal { source, .. } => Some(source),
            Self::Store { source, .. } | Self::Connectivity(source) => Some(source),
        }
    }
}
