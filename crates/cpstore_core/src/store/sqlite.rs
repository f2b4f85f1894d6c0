//! SQLite-backed partitioned document store.
//!
//! # Responsibility
//! - Serve the `Database`/`Container` contracts from the `items` table.
//! - Enforce etag preconditions, id uniqueness per partition and TTL expiry.
//! - Page query results with opaque continuation tokens.
//!
//! # Invariants
//! - One connection per database handle, serialized behind a mutex that is
//!   released between calls.
//! - Items are returned in insertion order within a partition; replacing an
//!   item keeps its position.
//! - Continuation tokens only encode the last delivered position, so pages
//!   never repeat or skip items that existed for the whole scan.

use super::{
    Container, Database, DatabaseProperties, ETag, ItemQuery, ItemResponse, QueryOptions,
    QueryPage, StoreError, StoreResult, ETAG_PROPERTY, TIMESTAMP_PROPERTY,
};
use crate::partition_key::PartitionKey;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Server-side cap on items per page.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

const CONTINUATION_TOKEN_PREFIX: &str = "+S:";
const TTL_PROPERTY: &str = "ttl";

static FIELD_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid field name regex"));

/// Time-to-live policy of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerTtl {
    /// Items never expire; item-level `ttl` is ignored.
    Disabled,
    /// Only items carrying their own `ttl` expire.
    NoDefault,
    /// Items expire after this many seconds unless they override it.
    Seconds(i64),
}

impl ContainerTtl {
    fn from_column(value: Option<i64>) -> Self {
        match value {
            None => Self::Disabled,
            Some(seconds) if seconds > 0 => Self::Seconds(seconds),
            Some(_) => Self::NoDefault,
        }
    }

    fn to_column(self) -> Option<i64> {
        match self {
            Self::Disabled => None,
            Self::NoDefault => Some(-1),
            Self::Seconds(seconds) => Some(seconds),
        }
    }

    /// Absolute expiry in epoch milliseconds, `None` for never.
    fn expires_at(self, item_ttl: Option<i64>, now_ms: i64) -> Option<i64> {
        let seconds = match (self, item_ttl) {
            (Self::Disabled, _) => return None,
            (_, Some(ttl)) if ttl > 0 => ttl,
            // -1 on the item opts out of the container default.
            (_, Some(_)) => return None,
            (Self::Seconds(seconds), None) => seconds,
            (Self::NoDefault, None) => return None,
        };
        Some(now_ms.saturating_add(seconds.saturating_mul(1000)))
    }
}

struct Shared {
    conn: Mutex<Connection>,
    max_page_size: u32,
}

impl Shared {
    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection mutex poisoned".to_string()))
    }
}

/// Document database stored in one SQLite connection.
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct SqliteDatabase {
    shared: Arc<Shared>,
}

impl SqliteDatabase {
    /// Wraps a migrated connection (see `db::open_db`).
    pub fn new(conn: Connection) -> Self {
        Self::with_max_page_size(conn, DEFAULT_MAX_PAGE_SIZE)
    }

    pub fn with_max_page_size(conn: Connection, max_page_size: u32) -> Self {
        Self {
            shared: Arc::new(Shared {
                conn: Mutex::new(conn),
                max_page_size: max_page_size.max(1),
            }),
        }
    }

    pub fn max_page_size(&self) -> u32 {
        self.shared.max_page_size
    }

    pub fn container_ttl(&self, name: &str) -> StoreResult<ContainerTtl> {
        let conn = self.shared.lock()?;
        load_container_ttl(&conn, name)
    }

    pub fn set_container_ttl(&self, name: &str, ttl: ContainerTtl) -> StoreResult<()> {
        let conn = self.shared.lock()?;
        let changed = conn.execute(
            "UPDATE containers SET default_ttl_seconds = ?2 WHERE name = ?1;",
            params![name, ttl.to_column()],
        )?;
        if changed == 0 {
            return Err(StoreError::ContainerNotFound(name.to_string()));
        }
        info!("event=container_ttl module=store status=ok container={name} ttl={ttl:?}");
        Ok(())
    }

    /// Physically removes expired items. Returns how many were removed.
    ///
    /// Expired items are already invisible, so this only reclaims space.
    pub fn purge_expired(&self) -> StoreResult<usize> {
        let conn = self.shared.lock()?;
        let removed = conn.execute(
            "DELETE FROM items WHERE expires_at IS NOT NULL AND expires_at <= ?1;",
            [now_ms()],
        )?;
        info!("event=purge_expired module=store status=ok removed={removed}");
        Ok(removed)
    }
}

impl Database for SqliteDatabase {
    fn read(&self) -> StoreResult<DatabaseProperties> {
        let conn = self.shared.lock()?;
        conn.query_row(
            "SELECT name, created_at FROM database_info WHERE id = 1;",
            [],
            |row| {
                Ok(DatabaseProperties {
                    name: row.get(0)?,
                    created_at: row.get(1)?,
                })
            },
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    fn container(&self, name: &str) -> StoreResult<Arc<dyn Container>> {
        let conn = self.shared.lock()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM containers WHERE name = ?1);",
            [name],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(StoreError::ContainerNotFound(name.to_string()));
        }
        Ok(Arc::new(SqliteContainer {
            shared: Arc::clone(&self.shared),
            name: name.to_string(),
        }))
    }
}

struct SqliteContainer {
    shared: Arc<Shared>,
    name: String,
}

impl Container for SqliteContainer {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_item(&self, partition_key: &PartitionKey, id: &str) -> StoreResult<ItemResponse> {
        let conn = self.shared.lock()?;
        let row = conn
            .query_row(
                "SELECT etag, body, ts
                 FROM items
                 WHERE container = ?1
                   AND partition_key = ?2
                   AND id = ?3
                   AND (expires_at IS NULL OR expires_at > ?4);",
                params![self.name, partition_key.as_str(), id, now_ms()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        let (etag, body, ts) = row.ok_or(StoreError::NotFound)?;
        Ok(ItemResponse {
            body: render_item_body(&body, &etag, ts)?,
            etag,
        })
    }

    fn create_item(&self, partition_key: &PartitionKey, body: &[u8]) -> StoreResult<ETag> {
        let item = parse_item_body(body)?;
        let mut conn = self.shared.lock()?;
        let now = now_ms();
        let ttl = load_container_ttl(&conn, &self.name)?;

        let tx = conn.transaction()?;
        // An expired item no longer owns its id.
        tx.execute(
            "DELETE FROM items
             WHERE container = ?1
               AND partition_key = ?2
               AND id = ?3
               AND expires_at IS NOT NULL
               AND expires_at <= ?4;",
            params![self.name, partition_key.as_str(), item.id, now],
        )?;

        let etag = new_etag();
        let inserted = tx.execute(
            "INSERT INTO items (container, partition_key, id, etag, body, ts, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                self.name,
                partition_key.as_str(),
                item.id,
                etag,
                item.json,
                now,
                ttl.expires_at(item.ttl, now),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Err(StoreError::Conflict),
            Err(err) => return Err(err.into()),
        }
        tx.commit()?;

        debug!(
            "event=item_create module=store status=ok container={} partition_key={} id={}",
            self.name, partition_key, item.id
        );
        Ok(etag)
    }

    fn upsert_item(&self, partition_key: &PartitionKey, body: &[u8]) -> StoreResult<ETag> {
        let item = parse_item_body(body)?;
        let conn = self.shared.lock()?;
        let now = now_ms();
        let ttl = load_container_ttl(&conn, &self.name)?;

        let etag = new_etag();
        conn.execute(
            "INSERT INTO items (container, partition_key, id, etag, body, ts, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (container, partition_key, id) DO UPDATE SET
                etag = excluded.etag,
                body = excluded.body,
                ts = excluded.ts,
                expires_at = excluded.expires_at;",
            params![
                self.name,
                partition_key.as_str(),
                item.id,
                etag,
                item.json,
                now,
                ttl.expires_at(item.ttl, now),
            ],
        )?;
        Ok(etag)
    }

    fn replace_item(
        &self,
        partition_key: &PartitionKey,
        id: &str,
        body: &[u8],
        if_match: Option<&str>,
    ) -> StoreResult<ETag> {
        let item = parse_item_body(body)?;
        if item.id != id {
            return Err(StoreError::InvalidItem(format!(
                "body id `{}` does not match `{id}`",
                item.id
            )));
        }

        let conn = self.shared.lock()?;
        let now = now_ms();
        let ttl = load_container_ttl(&conn, &self.name)?;
        let seq = check_precondition(&conn, &self.name, partition_key, id, if_match, now)?;

        let etag = new_etag();
        conn.execute(
            "UPDATE items
             SET etag = ?2, body = ?3, ts = ?4, expires_at = ?5
             WHERE seq = ?1;",
            params![seq, etag, item.json, now, ttl.expires_at(item.ttl, now)],
        )?;
        Ok(etag)
    }

    fn delete_item(
        &self,
        partition_key: &PartitionKey,
        id: &str,
        if_match: Option<&str>,
    ) -> StoreResult<()> {
        let conn = self.shared.lock()?;
        let seq = check_precondition(&conn, &self.name, partition_key, id, if_match, now_ms())?;
        conn.execute("DELETE FROM items WHERE seq = ?1;", [seq])?;
        Ok(())
    }

    fn query_items(
        &self,
        partition_key: &PartitionKey,
        query: &ItemQuery,
        options: &QueryOptions,
    ) -> StoreResult<QueryPage> {
        let after_seq = match options.continuation_token.as_deref() {
            Some(token) => decode_continuation_token(token)?,
            None => 0,
        };
        let limit = page_limit(options.page_size_hint, self.shared.max_page_size);

        let mut sql = String::from(
            "SELECT seq, etag, body, ts
             FROM items
             WHERE container = ?
               AND partition_key = ?
               AND (expires_at IS NULL OR expires_at > ?)
               AND seq > ?",
        );
        let mut bind_values = vec![
            Value::Text(self.name.clone()),
            Value::Text(partition_key.as_str().to_string()),
            Value::Integer(now_ms()),
            Value::Integer(after_seq),
        ];
        push_filter(query, &mut sql, &mut bind_values)?;
        sql.push_str(" ORDER BY seq ASC LIMIT ?");
        // One extra row tells whether another page exists.
        bind_values.push(Value::Integer(i64::from(limit) + 1));

        let conn = self.shared.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;

        let mut items = Vec::new();
        let mut last_seq = after_seq;
        let mut has_more = false;
        while let Some(row) = rows.next()? {
            if items.len() == limit as usize {
                has_more = true;
                break;
            }
            let seq: i64 = row.get(0)?;
            let etag: String = row.get(1)?;
            let body: String = row.get(2)?;
            let ts: i64 = row.get(3)?;
            items.push(render_item_body(&body, &etag, ts)?);
            last_seq = seq;
        }

        debug!(
            "event=item_query module=store status=ok container={} partition_key={} items={} has_more={}",
            self.name,
            partition_key,
            items.len(),
            has_more
        );
        Ok(QueryPage {
            items,
            continuation_token: has_more.then(|| encode_continuation_token(last_seq)),
        })
    }
}

struct ItemBody {
    id: String,
    json: String,
    ttl: Option<i64>,
}

fn parse_item_body(body: &[u8]) -> StoreResult<ItemBody> {
    let value: JsonValue = serde_json::from_slice(body)
        .map_err(|err| StoreError::InvalidItem(format!("body is not valid JSON: {err}")))?;
    let JsonValue::Object(mut object) = value else {
        return Err(StoreError::InvalidItem(
            "body must be a JSON object".to_string(),
        ));
    };

    object.remove(ETAG_PROPERTY);
    object.remove(TIMESTAMP_PROPERTY);

    let id = match object.get("id") {
        Some(JsonValue::String(id)) if !id.is_empty() => id.clone(),
        _ => {
            return Err(StoreError::InvalidItem(
                "body must carry a non-empty string `id`".to_string(),
            ))
        }
    };
    let ttl = object.get(TTL_PROPERTY).and_then(JsonValue::as_i64);
    let json = JsonValue::Object(object).to_string();

    Ok(ItemBody { id, json, ttl })
}

fn render_item_body(json: &str, etag: &str, ts_ms: i64) -> StoreResult<Vec<u8>> {
    let mut value: JsonValue = serde_json::from_str(json)
        .map_err(|err| StoreError::InvalidItem(format!("stored body is corrupt: {err}")))?;
    if let JsonValue::Object(object) = &mut value {
        object.insert(ETAG_PROPERTY.to_string(), JsonValue::from(etag));
        object.insert(TIMESTAMP_PROPERTY.to_string(), JsonValue::from(ts_ms / 1000));
    }
    Ok(value.to_string().into_bytes())
}

fn push_filter(
    query: &ItemQuery,
    sql: &mut String,
    bind_values: &mut Vec<Value>,
) -> StoreResult<()> {
    match query {
        ItemQuery::All => {}
        ItemQuery::StringEquals {
            field,
            value,
            ignore_case,
        } => {
            bind_values.push(Value::Text(json_path(field)?));
            if *ignore_case {
                sql.push_str(" AND fold_case(json_extract(body, ?)) = ?");
                bind_values.push(Value::Text(value.to_lowercase()));
            } else {
                sql.push_str(" AND json_extract(body, ?) = ?");
                bind_values.push(Value::Text(value.clone()));
            }
        }
        ItemQuery::StartsWith {
            field,
            prefix,
            ignore_case,
        } => {
            bind_values.push(Value::Text(json_path(field)?));
            let prefix = if *ignore_case {
                sql.push_str(" AND substr(fold_case(json_extract(body, ?)), 1, length(?)) = ?");
                prefix.to_lowercase()
            } else {
                sql.push_str(" AND substr(json_extract(body, ?), 1, length(?)) = ?");
                prefix.clone()
            };
            bind_values.push(Value::Text(prefix.clone()));
            bind_values.push(Value::Text(prefix));
        }
    }
    Ok(())
}

fn json_path(field: &str) -> StoreResult<String> {
    if !FIELD_NAME_RE.is_match(field) {
        return Err(StoreError::InvalidQuery(format!(
            "unsupported field name `{field}`"
        )));
    }
    Ok(format!("$.{field}"))
}

fn check_precondition(
    conn: &Connection,
    container: &str,
    partition_key: &PartitionKey,
    id: &str,
    if_match: Option<&str>,
    now: i64,
) -> StoreResult<i64> {
    let current = conn
        .query_row(
            "SELECT seq, etag
             FROM items
             WHERE container = ?1
               AND partition_key = ?2
               AND id = ?3
               AND (expires_at IS NULL OR expires_at > ?4);",
            params![container, partition_key.as_str(), id, now],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    let (seq, etag) = current.ok_or(StoreError::NotFound)?;
    match if_match {
        Some(expected) if expected != etag => Err(StoreError::PreconditionFailed),
        _ => Ok(seq),
    }
}

fn load_container_ttl(conn: &Connection, name: &str) -> StoreResult<ContainerTtl> {
    let column = conn
        .query_row(
            "SELECT default_ttl_seconds FROM containers WHERE name = ?1;",
            [name],
            |row| row.get::<_, Option<i64>>(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::ContainerNotFound(name.to_string()))?;
    Ok(ContainerTtl::from_column(column))
}

fn page_limit(page_size_hint: i32, max_page_size: u32) -> u32 {
    match u32::try_from(page_size_hint) {
        Ok(hint) if hint > 0 => hint.min(max_page_size),
        _ => max_page_size,
    }
}

fn encode_continuation_token(seq: i64) -> String {
    format!("{CONTINUATION_TOKEN_PREFIX}{seq}")
}

fn decode_continuation_token(token: &str) -> StoreResult<i64> {
    token
        .strip_prefix(CONTINUATION_TOKEN_PREFIX)
        .and_then(|rest| rest.parse::<i64>().ok())
        .filter(|seq| *seq >= 0)
        .ok_or_else(|| StoreError::InvalidContinuationToken(token.to_string()))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn new_etag() -> ETag {
    format!("\"{}\"", Uuid::new_v4())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
