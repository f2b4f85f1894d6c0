//! Lazy typed iteration over paged queries.
//!
//! # Responsibility
//! - Hide continuation-token mechanics behind a plain `Iterator`.
//! - Keep the terminal error and resume token queryable after iteration.
//!
//! # Invariants
//! - Iterators are finite and cannot be restarted.
//! - The first fetch or decode failure ends the sequence and is retained.
//! - Full-drain iteration ends with no continuation token.

use super::error::{RepoError, RepoResult, StoreAction};
use crate::model::document::DocumentKind;
use crate::store::QueryPager;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Iterator over documents with paging metadata.
pub trait DbIterator<T>: Iterator<Item = T> {
    /// Token to resume the query later, if more items remain.
    fn continuation_token(&self) -> Option<&str>;

    /// Error that ended iteration early, if any.
    fn error(&self) -> Option<&RepoError>;

    fn take_error(&mut self) -> Option<RepoError>;

    /// Drains the remaining items, surfacing the terminal error if one occurs.
    fn collect_all(&mut self) -> RepoResult<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next() {
            items.push(item);
        }
        match self.take_error() {
            Some(err) => Err(err),
            None => Ok(items),
        }
    }
}

/// Boxed iterator returned by the document client.
pub type DocumentIter<T> = Box<dyn DbIterator<T> + Send>;

/// How many pages an iterator may fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingMode {
    /// One page, leaving the continuation token for the caller.
    SinglePage,
    /// Every page until the store reports no more.
    FullDrain,
}

impl PagingMode {
    /// Positive limits fetch one page, anything else drains the query.
    pub fn for_max_items(max_items: i32) -> Self {
        if max_items > 0 {
            Self::SinglePage
        } else {
            Self::FullDrain
        }
    }
}

pub struct QueryItemsIterator<T> {
    pager: QueryPager,
    mode: PagingMode,
    kind: DocumentKind,
    /// Identifies the query in error messages.
    context: String,
    buffer: std::vec::IntoIter<Vec<u8>>,
    pages_fetched: usize,
    continuation_token: Option<String>,
    error: Option<RepoError>,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> QueryItemsIterator<T> {
    pub fn new(
        pager: QueryPager,
        mode: PagingMode,
        kind: DocumentKind,
        context: impl Into<String>,
    ) -> Self {
        Self {
            pager,
            mode,
            kind,
            context: context.into(),
            buffer: Vec::new().into_iter(),
            pages_fetched: 0,
            continuation_token: None,
            error: None,
            done: false,
            _marker: PhantomData,
        }
    }

    fn fail(&mut self, err: RepoError) {
        self.error = Some(err);
        self.buffer = Vec::new().into_iter();
        self.done = true;
    }

    fn may_fetch(&self) -> bool {
        match self.mode {
            PagingMode::SinglePage => self.pages_fetched == 0,
            PagingMode::FullDrain => self.pager.more(),
        }
    }
}

impl<T: DeserializeOwned> Iterator for QueryItemsIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        loop {
            if self.done {
                return None;
            }

            if let Some(raw) = self.buffer.next() {
                match serde_json::from_slice::<T>(&raw) {
                    Ok(item) => return Some(item),
                    Err(source) => {
                        let err = RepoError::Unmarshal {
                            kind: self.kind,
                            key: self.context.clone(),
                            source,
                        };
                        self.fail(err);
                        return None;
                    }
                }
            }

            if !self.may_fetch() {
                self.done = true;
                return None;
            }

            match self.pager.next_page() {
                Ok(page) => {
                    self.pages_fetched += 1;
                    self.continuation_token = page.continuation_token;
                    self.buffer = page.items.into_iter();
                }
                Err(source) => {
                    let err =
                        RepoError::store(StoreAction::Query, self.kind, self.context.clone(), source);
                    self.fail(err);
                    return None;
                }
            }
        }
    }
}

impl<T: DeserializeOwned> DbIterator<T> for QueryItemsIterator<T> {
    fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    fn error(&self) -> Option<&RepoError> {
        self.error.as_ref()
    }

    fn take_error(&mut self) -> Option<RepoError> {
        self.error.take()
    }
}
