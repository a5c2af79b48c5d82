//! Per-user bookmarks of content records.
//!
//! A favorite stores the content id only. Content can be re-imported or
//! removed independently, so [`favorites_with_content`] resolves each id
//! through the [`ContentStore`] and reports `content: null` for ids that no
//! longer resolve.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::models::{now_utc, ts_to_datetime, ContentRecord};
use crate::store::ContentStore;

use super::{AuthError, AuthService, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: i64,
    pub content_id: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewFavorite {
    pub content_id: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// The listing fields of a content record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentSummary {
    pub id: String,
    pub title: String,
    pub module: String,
    pub subcategory: String,
    pub tags: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
}

impl From<ContentRecord> for ContentSummary {
    fn from(record: ContentRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            module: record.module,
            subcategory: record.subcategory,
            tags: record.tags,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FavoriteWithContent {
    #[serde(flatten)]
    pub favorite: Favorite,
    pub content: Option<ContentSummary>,
}

fn row_to_favorite(row: &SqliteRow) -> Favorite {
    Favorite {
        id: row.get("id"),
        content_id: row.get("content_id"),
        note: row.get("note"),
        created_at: ts_to_datetime(row.get("created_at")),
    }
}

impl AuthService {
    /// Bookmark a content id. Existence of the content is not checked.
    pub async fn add_favorite(&self, user_id: i64, new: &NewFavorite) -> Result<Favorite> {
        let content_id = new.content_id.trim();
        if content_id.is_empty() {
            return Err(AuthError::Invalid("content_id must not be empty".into()));
        }

        let row = sqlx::query(
            "INSERT INTO favorites (user_id, content_id, note, created_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT(user_id, content_id) DO NOTHING \
             RETURNING id, content_id, note, created_at",
        )
        .bind(user_id)
        .bind(content_id)
        .bind(&new.note)
        .bind(now_utc().timestamp())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::FavoriteExists)?;

        let favorite = row_to_favorite(&row);
        tracing::debug!(user_id, content_id = %favorite.content_id, "favorite added");
        Ok(favorite)
    }

    /// Favorites in the order they were added.
    pub async fn list_favorites(&self, user_id: i64) -> Result<Vec<Favorite>> {
        let rows = sqlx::query(
            "SELECT id, content_id, note, created_at FROM favorites WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_favorite).collect())
    }

    /// Returns the number of rows removed, which is never zero.
    pub async fn remove_favorite(&self, user_id: i64, content_id: &str) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM favorites WHERE user_id = ? AND content_id = ?")
            .bind(user_id)
            .bind(content_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(AuthError::FavoriteNotFound);
        }
        Ok(deleted)
    }
}

pub async fn favorites_with_content(
    auth: &AuthService,
    store: &dyn ContentStore,
    user_id: i64,
) -> Result<Vec<FavoriteWithContent>> {
    let favorites = auth.list_favorites(user_id).await?;
    let mut out = Vec::with_capacity(favorites.len());
    for favorite in favorites {
        let content = store.get(&favorite.content_id).await?.map(ContentSummary::from);
        out.push(FavoriteWithContent { favorite, content });
    }
    Ok(out)
}
