//! Storage abstraction for content records.
//!
//! The [`ContentStore`] trait is the seam between the ingestion pipeline /
//! query surface and the database. Title uniqueness is a property of the
//! store: [`insert_if_absent`](ContentStore::insert_if_absent) and
//! [`overwrite_by_title`](ContentStore::overwrite_by_title) are each a single
//! atomic operation, so two writers racing on one title can never produce
//! two records.
//!
//! | Implementation | Use |
//! |----------------|-----|
//! | [`sqlite::SqliteStore`] | CLI and HTTP server |
//! | [`memory::InMemoryStore`] | unit tests |

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{ContentRecord, NewContent};

/// Filters for listing records.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub module: Option<String>,
    pub subcategory: Option<String>,
    pub skip: i64,
    pub limit: i64,
}

/// A substring search over title, body and code.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    pub module: Option<String>,
    pub skip: i64,
    pub limit: i64,
}

/// One page of search results plus the total number of matches.
#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub results: Vec<ContentRecord>,
    pub total_count: i64,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert `new` unless a record with the same title exists.
    ///
    /// Returns the created record, or `None` when the title is taken.
    async fn insert_if_absent(&self, new: &NewContent) -> Result<Option<ContentRecord>>;

    /// Overwrite the mutable fields of the record titled `new.title`.
    ///
    /// Returns the updated record, or `None` when no such record exists.
    async fn overwrite_by_title(&self, new: &NewContent) -> Result<Option<ContentRecord>>;

    async fn find_by_title(&self, title: &str) -> Result<Option<ContentRecord>>;

    async fn get(&self, id: &str) -> Result<Option<ContentRecord>>;

    /// Records ordered by creation time, then title.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContentRecord>>;

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage>;
}

/// Escape `%`, `_` and `\` so a user query matches literally inside
/// `LIKE ... ESCAPE '\'`.
pub(crate) fn escape_like(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 2);
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Case-insensitive substring test matching SQLite's ASCII-only `LIKE`.
pub(crate) fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}
