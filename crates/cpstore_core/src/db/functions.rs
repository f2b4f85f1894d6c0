//! Scalar SQL functions registered on every store connection.
//!
//! # Invariants
//! - `fold_case` lowercases text exactly like `str::to_lowercase`, so values
//!   folded in SQL compare equal to keys normalized in Rust.
//! - Non-text arguments pass through unchanged.

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Value, ValueRef};
use rusqlite::Connection;

/// Unicode-aware replacement for SQLite's ASCII-only `lower()`.
pub const FOLD_CASE_FUNCTION: &str = "fold_case";

pub(crate) fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD_CASE_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        fold_case,
    )
}

fn fold_case(ctx: &Context<'_>) -> rusqlite::Result<Value> {
    Ok(match ctx.get_raw(0) {
        ValueRef::Text(text) => Value::Text(String::from_utf8_lossy(text).to_lowercase()),
        other => other.into(),
    })
}
