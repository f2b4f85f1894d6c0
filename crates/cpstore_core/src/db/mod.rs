//! SQLite connection layer under the document store.
//!
//! # Responsibility
//! - Open the one connection a `SqliteDatabase` serializes its calls on.
//! - Create the `containers`/`items` schema and seed the well-known
//!   containers with their TTL policy.
//! - Register the SQL functions the store's query filters rely on.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`; a database written
//!   by a newer binary is refused rather than migrated backwards.
//! - No container data is touched before migrations succeed.
//!
//! # See also
//! - `store::sqlite` for the container semantics layered on these tables.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod functions;
pub mod migrations;
mod open;

pub use functions::FOLD_CASE_FUNCTION;
pub use open::{open_db, open_db_in_memory, open_db_with_timeout, DEFAULT_BUSY_TIMEOUT};

pub type DbResult<T> = Result<T, DbError>;

/// Failure while opening or migrating the store database.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was migrated by a newer build.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "store schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
