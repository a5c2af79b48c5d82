//! Content listing and retrieval by ID.
//!
//! Used by the `lbase list` / `lbase get` CLI commands and the
//! `GET /api/v1/content` endpoints.

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::config::Config;
use crate::models::{format_ts_iso, ContentRecord};
use crate::store::sqlite::SqliteStore;
use crate::store::{ContentStore, ListFilter};

/// Query parameters for listing content.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub module: Option<String>,
    pub subcategory: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// List records, optionally filtered by module and subcategory.
///
/// `limit` defaults to `[content].default_limit` and is clamped to
/// `[1, search.max_limit]`.
pub async fn list_content(
    store: &dyn ContentStore,
    config: &Config,
    params: ListParams,
) -> Result<Vec<ContentRecord>> {
    let filter = ListFilter {
        module: params.module,
        subcategory: params.subcategory,
        skip: params.skip.unwrap_or(0).max(0),
        limit: config
            .search
            .clamp_limit(params.limit, config.content.default_limit),
    };
    store.list(&filter).await
}

pub async fn get_content(store: &dyn ContentStore, id: &str) -> Result<ContentRecord> {
    match store.get(id).await? {
        Some(record) => Ok(record),
        None => bail!("content not found: {}", id),
    }
}

/// CLI entry point for `lbase list`.
pub async fn run_list(config: &Config, params: ListParams) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let records = list_content(&store, config, params).await;
    store.pool().close().await;
    let records = records?;

    if records.is_empty() {
        println!("No content.");
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {} / {}  {}",
            record.id, record.module, record.subcategory, record.title
        );
    }
    println!();
    println!("{} record(s)", records.len());

    Ok(())
}

/// CLI entry point for `lbase get`.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let record = get_content(&store, id).await;
    store.pool().close().await;
    let record = record?;

    println!("--- Content ---");
    println!("id:          {}", record.id);
    println!("title:       {}", record.title);
    println!("module:      {}", record.module);
    println!("subcategory: {}", record.subcategory);
    if let Some(ref tags) = record.tags {
        println!("tags:        {}", tags.join(", "));
    }
    println!("created_at:  {}", format_ts_iso(record.created_at));
    println!("updated_at:  {}", format_ts_iso(record.updated_at));
    println!();

    println!("--- Body ---");
    println!("{}", record.body);
    println!();

    if !record.code.is_empty() {
        println!("--- Code ---");
        println!("{}", record.code);
        println!();
    }

    if !record.formulas.is_empty() {
        println!("--- Formulas ({}) ---", record.formulas.len());
        for (name, formula) in &record.formulas {
            match formula {
                serde_json::Value::String(s) => println!("{}: {}", name, s),
                other => println!("{}: {}", name, other),
            }
        }
        println!();
    }

    if !record.images.is_empty() {
        println!("--- Images ({}) ---", record.images.len());
        for (name, src) in &record.images {
            println!("{}: {}", name, abbreviate_data_uri(src));
        }
        println!();
    }

    Ok(())
}

/// Shorten `data:` URIs for terminal output; URLs are returned unchanged.
fn abbreviate_data_uri(src: &str) -> String {
    match src.split_once(";base64,") {
        Some((prefix, data)) if src.starts_with("data:") => {
            format!("{};base64,... ({} bytes encoded)", prefix, data.len())
        }
        _ => src.to_string(),
    }
}
