use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the database file and schema. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an existing pool.
///
/// `content.title`, `users.username`, `users.email` and
/// `favorites(user_id, content_id)` carry UNIQUE constraints; writers rely on
/// them for conflict-aware inserts instead of a lookup before write.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content (
            id TEXT PRIMARY KEY,
            module TEXT NOT NULL,
            subcategory TEXT NOT NULL,
            title TEXT NOT NULL UNIQUE,
            body TEXT NOT NULL DEFAULT '',
            code TEXT NOT NULL DEFAULT '',
            formulas_json TEXT NOT NULL DEFAULT '{}',
            images_json TEXT NOT NULL DEFAULT '{}',
            tags_json TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_content_module ON content(module)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_content_subcategory ON content(subcategory)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_content_created_at ON content(created_at, title)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            nickname TEXT,
            avatar_url TEXT,
            bio TEXT,
            email_verified INTEGER NOT NULL DEFAULT 0,
            email_verify_token TEXT,
            email_verify_expire INTEGER,
            reset_token TEXT,
            reset_token_expire INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // content_id is not a foreign key: favorites survive content re-imports
    // and deletions, and dangling ones resolve to no content.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS favorites (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            content_id TEXT NOT NULL,
            note TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE (user_id, content_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_favorites_user ON favorites(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}
