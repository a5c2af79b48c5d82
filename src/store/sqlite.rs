//! SQLite-backed [`ContentStore`].
//!
//! Each trait method is one SQL statement against the `content` table
//! created by [`crate::migrate`]. Uniqueness of `title` is enforced by the
//! table's UNIQUE constraint together with `ON CONFLICT DO NOTHING` and
//! `UPDATE ... RETURNING`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::migrate::apply_schema;
use crate::models::{now_utc, ts_to_datetime, ContentRecord, NewContent};

use super::{escape_like, ContentStore, ListFilter, SearchPage, SearchQuery};

const COLUMNS: &str = "id, module, subcategory, title, body, code, formulas_json, images_json, tags_json, created_at, updated_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// JSON-encoded columns for a [`NewContent`].
struct EncodedFields {
    formulas: String,
    images: String,
    tags: Option<String>,
}

fn encode(new: &NewContent) -> Result<EncodedFields> {
    Ok(EncodedFields {
        formulas: serde_json::to_string(&new.formulas)?,
        images: serde_json::to_string(&new.images)?,
        tags: new.tags.as_ref().map(serde_json::to_string).transpose()?,
    })
}

fn row_to_record(row: &SqliteRow) -> Result<ContentRecord> {
    let formulas_json: String = row.get("formulas_json");
    let images_json: String = row.get("images_json");
    let tags_json: Option<String> = row.get("tags_json");
    let id: String = row.get("id");

    Ok(ContentRecord {
        formulas: serde_json::from_str(&formulas_json)
            .with_context(|| format!("corrupt formulas for content {}", id))?,
        images: serde_json::from_str(&images_json)
            .with_context(|| format!("corrupt images for content {}", id))?,
        tags: tags_json
            .map(|t| serde_json::from_str(&t))
            .transpose()
            .with_context(|| format!("corrupt tags for content {}", id))?,
        id,
        module: row.get("module"),
        subcategory: row.get("subcategory"),
        title: row.get("title"),
        body: row.get("body"),
        code: row.get("code"),
        created_at: ts_to_datetime(row.get("created_at")),
        updated_at: ts_to_datetime(row.get("updated_at")),
    })
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn insert_if_absent(&self, new: &NewContent) -> Result<Option<ContentRecord>> {
        let fields = encode(new)?;
        let now = now_utc().timestamp();

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO content (id, module, subcategory, title, body, code,
                                 formulas_json, images_json, tags_json,
                                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(title) DO NOTHING
            RETURNING {COLUMNS}
            "#
        ))
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&new.module)
        .bind(&new.subcategory)
        .bind(&new.title)
        .bind(&new.body)
        .bind(&new.code)
        .bind(&fields.formulas)
        .bind(&fields.images)
        .bind(&fields.tags)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn overwrite_by_title(&self, new: &NewContent) -> Result<Option<ContentRecord>> {
        let fields = encode(new)?;
        let now = now_utc().timestamp();

        let row = sqlx::query(&format!(
            r#"
            UPDATE content SET
                module = ?,
                subcategory = ?,
                body = ?,
                code = ?,
                formulas_json = ?,
                images_json = ?,
                tags_json = ?,
                updated_at = ?
            WHERE title = ?
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&new.module)
        .bind(&new.subcategory)
        .bind(&new.body)
        .bind(&new.code)
        .bind(&fields.formulas)
        .bind(&fields.images)
        .bind(&fields.tags)
        .bind(now)
        .bind(&new.title)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn find_by_title(&self, title: &str) -> Result<Option<ContentRecord>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM content WHERE title = ?"))
            .bind(title)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn get(&self, id: &str) -> Result<Option<ContentRecord>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM content WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<ContentRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM content
            WHERE (?1 IS NULL OR module = ?1)
              AND (?2 IS NULL OR subcategory = ?2)
            ORDER BY created_at ASC, title ASC
            LIMIT ?3 OFFSET ?4
            "#
        ))
        .bind(&filter.module)
        .bind(&filter.subcategory)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        let pattern = format!("%{}%", escape_like(&query.query));
        let condition = r#"
            (?1 IS NULL OR module = ?1)
            AND (title LIKE ?2 ESCAPE '\'
                 OR body LIKE ?2 ESCAPE '\'
                 OR code LIKE ?2 ESCAPE '\')
        "#;

        let total_count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM content WHERE {condition}"))
                .bind(&query.module)
                .bind(&pattern)
                .fetch_one(&self.pool)
                .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS} FROM content
            WHERE {condition}
            ORDER BY created_at ASC, title ASC
            LIMIT ?3 OFFSET ?4
            "#
        ))
        .bind(&query.module)
        .bind(&pattern)
        .bind(query.limit)
        .bind(query.skip)
        .fetch_all(&self.pool)
        .await?;

        let results = rows.iter().map(row_to_record).collect::<Result<Vec<_>>>()?;
        Ok(SearchPage {
            results,
            total_count,
        })
    }
}
