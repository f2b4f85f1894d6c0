//! Store configuration.
//!
//! Values come from defaults, overridden by `CPSTORE_*` environment
//! variables. Unset variables keep the default; malformed ones are errors.

use crate::db::{open_db_in_memory, open_db_with_timeout, DbError, DEFAULT_BUSY_TIMEOUT};
use crate::repo::{DocumentDbClient, RepoError, RepoResult};
use crate::store::{SqliteDatabase, StoreError, DEFAULT_MAX_PAGE_SIZE};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "CPSTORE_DB_PATH";
pub const ENV_MAX_PAGE_SIZE: &str = "CPSTORE_MAX_PAGE_SIZE";
pub const ENV_LOCK_TTL_SECS: &str = "CPSTORE_LOCK_TTL_SECS";
pub const ENV_BUSY_TIMEOUT_MS: &str = "CPSTORE_BUSY_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "CPSTORE_LOG_LEVEL";

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// SQLite file; `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
    /// Upper bound on items returned by one query page.
    pub max_page_size: u32,
    pub lock_ttl: Duration,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
    pub log_level: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            lock_ttl: DEFAULT_LOCK_TTL,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            log_level: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        variable: &'static str,
        value: String,
        message: &'static str,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue {
                variable,
                value,
                message,
            } => write!(f, "invalid {variable}=`{value}`: {message}"),
        }
    }
}

impl Error for ConfigError {}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(path) = get(ENV_DB_PATH) {
            config.db_path = Some(PathBuf::from(path));
        }
        if let Some(value) = get(ENV_MAX_PAGE_SIZE) {
            config.max_page_size = parse_number(ENV_MAX_PAGE_SIZE, &value)?;
        }
        if let Some(value) = get(ENV_LOCK_TTL_SECS) {
            config.lock_ttl = Duration::from_secs(parse_number(ENV_LOCK_TTL_SECS, &value)?);
        }
        if let Some(value) = get(ENV_BUSY_TIMEOUT_MS) {
            config.busy_timeout =
                Duration::from_millis(parse_number(ENV_BUSY_TIMEOUT_MS, &value)?);
        }
        config.log_level = get(ENV_LOG_LEVEL);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                variable: ENV_MAX_PAGE_SIZE,
                value: self.max_page_size.to_string(),
                message: "must be at least 1",
            });
        }
        if self.lock_ttl.as_secs() == 0 {
            return Err(ConfigError::InvalidValue {
                variable: ENV_LOCK_TTL_SECS,
                value: self.lock_ttl.as_secs().to_string(),
                message: "must be at least 1 second",
            });
        }
        Ok(())
    }

    /// Opens the database, applies migrations and builds the document client.
    pub fn open_client(&self) -> RepoResult<DocumentDbClient> {
        let conn = match &self.db_path {
            Some(path) => open_db_with_timeout(path, self.busy_timeout),
            None => open_db_in_memory(),
        }
        .map_err(connectivity)?;

        info!(
            "event=store_open module=config status=ok storage={} max_page_size={}",
            if self.db_path.is_some() { "file" } else { "memory" },
            self.max_page_size
        );

        let database = SqliteDatabase::with_max_page_size(conn, self.max_page_size);
        DocumentDbClient::new(Arc::new(database), self.lock_ttl)
    }
}

fn connectivity(err: DbError) -> RepoError {
    RepoError::Connectivity(StoreError::Db(err))
}

fn parse_number<T: std::str::FromStr>(
    variable: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        variable,
        value: value.to_string(),
        message: "expected a non-negative integer",
    })
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StoreConfig, DEFAULT_LOCK_TTL};
    use crate::repo::DbClient;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn unset_variables_keep_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.lock_ttl, DEFAULT_LOCK_TTL);
    }

    #[test]
    fn variables_override_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("CPSTORE_DB_PATH", "/var/lib/cpstore/store.db"),
            ("CPSTORE_MAX_PAGE_SIZE", "25"),
            ("CPSTORE_LOCK_TTL_SECS", "90"),
            ("CPSTORE_BUSY_TIMEOUT_MS", "1500"),
            ("CPSTORE_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(
            config.db_path,
            Some(PathBuf::from("/var/lib/cpstore/store.db"))
        );
        assert_eq!(config.max_page_size, 25);
        assert_eq!(config.lock_ttl, Duration::from_secs(90));
        assert_eq!(config.busy_timeout, Duration::from_millis(1500));
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn malformed_and_zero_values_are_rejected() {
        let err = StoreConfig::from_lookup(lookup(&[("CPSTORE_MAX_PAGE_SIZE", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("CPSTORE_MAX_PAGE_SIZE"));

        let err =
            StoreConfig::from_lookup(lookup(&[("CPSTORE_MAX_PAGE_SIZE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn file_backed_client_passes_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            db_path: Some(dir.path().join("store.db")),
            ..StoreConfig::default()
        };
        let client = config.open_client().unwrap();
        client.db_connection_test().unwrap();
    }
}
