//! Partition-scoped query model and page cursor.

use super::{Container, StoreResult};
use crate::partition_key::PartitionKey;
use std::sync::Arc;

/// Single-predicate filter over a top-level string field of the item body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemQuery {
    All,
    StringEquals {
        field: String,
        value: String,
        ignore_case: bool,
    },
    StartsWith {
        field: String,
        prefix: String,
        ignore_case: bool,
    },
}

impl ItemQuery {
    pub fn string_equals(
        field: impl Into<String>,
        value: impl Into<String>,
        ignore_case: bool,
    ) -> Self {
        Self::StringEquals {
            field: field.into(),
            value: value.into(),
            ignore_case,
        }
    }

    pub fn starts_with(
        field: impl Into<String>,
        prefix: impl Into<String>,
        ignore_case: bool,
    ) -> Self {
        Self::StartsWith {
            field: field.into(),
            prefix: prefix.into(),
            ignore_case,
        }
    }
}

/// Per-request query options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOptions {
    /// Maximum items per page. Non-positive lets the store pick.
    pub page_size_hint: i32,
    pub continuation_token: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            page_size_hint: -1,
            continuation_token: None,
        }
    }
}

/// One page of raw item bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPage {
    pub items: Vec<Vec<u8>>,
    /// Token for the next page; `None` when the query is exhausted.
    pub continuation_token: Option<String>,
}

/// Cursor that walks the pages of one query.
///
/// Each `next_page` call is an independent request; nothing is pinned
/// between pages.
pub struct QueryPager {
    container: Arc<dyn Container>,
    partition_key: PartitionKey,
    query: ItemQuery,
    page_size_hint: i32,
    continuation_token: Option<String>,
    started: bool,
}

impl QueryPager {
    pub fn new(
        container: Arc<dyn Container>,
        partition_key: PartitionKey,
        query: ItemQuery,
        options: QueryOptions,
    ) -> Self {
        Self {
            container,
            partition_key,
            query,
            page_size_hint: options.page_size_hint,
            continuation_token: options.continuation_token,
            started: false,
        }
    }

    /// Whether another page may be fetched.
    pub fn more(&self) -> bool {
        !self.started || self.continuation_token.is_some()
    }

    pub fn next_page(&mut self) -> StoreResult<QueryPage> {
        let options = QueryOptions {
            page_size_hint: self.page_size_hint,
            continuation_token: self.continuation_token.clone(),
        };
        let page = self
            .container
            .query_items(&self.partition_key, &self.query, &options)?;
        self.started = true;
        self.continuation_token = page.continuation_token.clone();
        Ok(page)
    }
}
