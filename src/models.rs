//! Core data models used throughout learnbase.
//!
//! [`NewContent`] is what the ingestion pipeline produces from a markdown
//! document; [`ContentRecord`] is what the store hands back once it has been
//! persisted.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Formula name → expression. Block formulas are plain strings; formulas
/// declared in frontmatter may be any YAML value converted to JSON.
pub type Formulas = IndexMap<String, serde_json::Value>;

/// Image display name → URL or `data:` URI.
pub type Images = IndexMap<String, String>;

/// A normalized record ready for storage, keyed by `title`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContent {
    pub module: String,
    pub subcategory: String,
    pub title: String,
    pub body: String,
    pub code: String,
    pub formulas: Formulas,
    pub images: Images,
    pub tags: Option<Vec<String>>,
}

/// A persisted content record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub module: String,
    pub subcategory: String,
    pub title: String,
    pub body: String,
    pub code: String,
    pub formulas: Formulas,
    pub images: Images,
    pub tags: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentRecord {
    /// Build a fresh record from `new` with a generated id and both
    /// timestamps set to `now`.
    pub fn create(new: &NewContent, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            module: new.module.clone(),
            subcategory: new.subcategory.clone(),
            title: new.title.clone(),
            body: new.body.clone(),
            code: new.code.clone(),
            formulas: new.formulas.clone(),
            images: new.images.clone(),
            tags: new.tags.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace every mutable field with the values from `new`.
    ///
    /// `id`, `title` and `created_at` are kept.
    pub fn overwrite_with(&mut self, new: &NewContent, now: DateTime<Utc>) {
        self.module = new.module.clone();
        self.subcategory = new.subcategory.clone();
        self.body = new.body.clone();
        self.code = new.code.clone();
        self.formulas = new.formulas.clone();
        self.images = new.images.clone();
        self.tags = new.tags.clone();
        self.updated_at = now;
    }
}

/// Current time truncated to whole seconds, the precision the store keeps.
pub fn now_utc() -> DateTime<Utc> {
    ts_to_datetime(Utc::now().timestamp())
}

/// Convert unix seconds to a UTC timestamp, falling back to the epoch.
pub fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

pub fn format_ts_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
