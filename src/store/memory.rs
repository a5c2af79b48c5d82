//! In-memory [`ContentStore`] for tests.
//!
//! Records live in a `Vec` behind a `RwLock`; every operation takes the lock
//! once, so the title-uniqueness contract holds exactly as it does for the
//! SQLite store.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{now_utc, ContentRecord, NewContent};

use super::{contains_ignore_ascii_case, ContentStore, ListFilter, SearchPage, SearchQuery};

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<ContentRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

/// Sorted view matching the SQLite store's `ORDER BY created_at, title`.
fn ordered<'a>(records: impl Iterator<Item = &'a ContentRecord>) -> Vec<ContentRecord> {
    let mut out: Vec<ContentRecord> = records.cloned().collect();
    out.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.title.cmp(&b.title))
    });
    out
}

fn page(records: Vec<ContentRecord>, skip: i64, limit: i64) -> Vec<ContentRecord> {
    records
        .into_iter()
        .skip(skip.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn insert_if_absent(&self, new: &NewContent) -> Result<Option<ContentRecord>> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        if records.iter().any(|r| r.title == new.title) {
            return Ok(None);
        }
        let record = ContentRecord::create(new, now_utc());
        records.push(record.clone());
        Ok(Some(record))
    }

    async fn overwrite_by_title(&self, new: &NewContent) -> Result<Option<ContentRecord>> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        Ok(records
            .iter_mut()
            .find(|r| r.title == new.title)
            .map(|record| {
                record.overwrite_with(new, now_utc());
                record.clone()
            }))
    }

    async fn find_by_title(&self, title: &str) -> Result<Option<ContentRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.iter().find(|r| r.title == title).cloned())
    }

    async fn get(&self, id: &str) -> Result<Option<ContentRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContentRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let matching = ordered(records.iter().filter(|r| {
            filter.module.as_ref().map_or(true, |m| &r.module == m)
                && filter
                    .subcategory
                    .as_ref()
                    .map_or(true, |s| &r.subcategory == s)
        }));
        Ok(page(matching, filter.skip, filter.limit))
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        let records = self.records.read().map_err(|_| poisoned())?;
        let matching = ordered(records.iter().filter(|r| {
            query.module.as_ref().map_or(true, |m| &r.module == m)
                && (contains_ignore_ascii_case(&r.title, &query.query)
                    || contains_ignore_ascii_case(&r.body, &query.query)
                    || contains_ignore_ascii_case(&r.code, &query.query))
        }));
        let total_count = matching.len() as i64;
        Ok(SearchPage {
            results: page(matching, query.skip, query.limit),
            total_count,
        })
    }
}
