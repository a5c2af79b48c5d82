use anyhow::Result;
use serde::Deserialize;

use crate::config::Config;
use crate::store::sqlite::SqliteStore;
use crate::store::{ContentStore, SearchPage, SearchQuery};

/// Parameters for a substring search over title, body and code.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub module: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// Case-insensitive substring search. A blank query yields an empty page.
///
/// Surrounding whitespace is part of the pattern: `" gradient"` only matches
/// text with a space before the word.
pub async fn search_content(
    store: &dyn ContentStore,
    config: &Config,
    params: SearchParams,
) -> Result<SearchPage> {
    if params.query.trim().is_empty() {
        return Ok(SearchPage {
            results: Vec::new(),
            total_count: 0,
        });
    }

    let search = SearchQuery {
        query: params.query,
        module: params.module,
        skip: params.skip.unwrap_or(0).max(0),
        limit: config
            .search
            .clamp_limit(params.limit, config.search.default_limit),
    };
    store.search(&search).await
}

pub async fn run_search(config: &Config, params: SearchParams) -> Result<()> {
    if params.query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let skip = params.skip.unwrap_or(0).max(0);
    let store = SqliteStore::open(config).await?;
    let page = search_content(&store, config, params).await;
    store.pool().close().await;
    let page = page?;

    if page.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, record) in page.results.iter().enumerate() {
        println!(
            "{}. {} / {} / {}",
            skip + i as i64 + 1,
            record.module,
            record.subcategory,
            record.title
        );
        println!("    updated: {}", record.updated_at.format("%Y-%m-%d"));
        println!("    excerpt: \"{}\"", excerpt(&record.body, 160));
        println!("    id: {}", record.id);
        println!();
    }
    println!(
        "showing {} of {} match(es)",
        page.results.len(),
        page.total_count
    );

    Ok(())
}

/// First `max_chars` characters of `text` on a single line.
fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
