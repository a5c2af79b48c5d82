//! TOML configuration parsing and validation.
//!
//! The configuration is loaded once at process start and passed by reference
//! to every component that needs it. Only `[db]` and `[server]` are required;
//! `[import]`, `[content]`, `[search]` and `[auth]` fall back to defaults.
//!
//! ```toml
//! [db]
//! path = "./data/learnbase.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//!
//! [import]
//! include_globs = ["*.md"]
//! code_languages = ["python", "py"]
//! base_dir = "./content"
//!
//! [search]
//! default_limit = 10
//! max_limit = 100
//!
//! [auth]
//! jwt_secret = "change-me"
//! access_token_minutes = 60
//! refresh_token_days = 7
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

/// Settings for the markdown ingestion pipeline.
#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    /// File-name globs for directory imports, matched case-insensitively.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Fence info strings whose blocks are collected into `code`.
    #[serde(default = "default_code_languages")]
    pub code_languages: Vec<String>,
    /// Fallback directory for relative image paths in text imports.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            code_languages: default_code_languages(),
            base_dir: None,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["*.md".to_string()]
}

fn default_code_languages() -> Vec<String> {
    vec!["python".to_string(), "py".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    #[serde(default = "default_content_limit")]
    pub default_limit: i64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            default_limit: default_content_limit(),
        }
    }
}

fn default_content_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub default_limit: i64,
    #[serde(default = "default_max_limit")]
    pub max_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn default_search_limit() -> i64 {
    10
}
fn default_max_limit() -> i64 {
    100
}

/// Token settings for the user-accounts API.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret. Defaults to `$AUTH_JWT_SECRET`, else a
    /// development value that the server warns about.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_access_token_minutes")]
    pub access_token_minutes: i64,
    #[serde(default = "default_refresh_token_days")]
    pub refresh_token_days: i64,
}

pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            access_token_minutes: default_access_token_minutes(),
            refresh_token_days: default_refresh_token_days(),
        }
    }
}

fn default_jwt_secret() -> String {
    std::env::var("AUTH_JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.to_string())
}
fn default_access_token_minutes() -> i64 {
    60
}
fn default_refresh_token_days() -> i64 {
    7
}

impl SearchConfig {
    /// Clamp a caller-supplied page size into `[1, max_limit]`.
    pub fn clamp_limit(&self, requested: Option<i64>, default: i64) -> i64 {
        requested.unwrap_or(default).clamp(1, self.max_limit)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.import.include_globs.is_empty() {
        bail!("import.include_globs must not be empty");
    }
    if config
        .import
        .code_languages
        .iter()
        .any(|l| l.trim().is_empty())
        || config.import.code_languages.is_empty()
    {
        bail!("import.code_languages must list at least one non-empty language");
    }

    if config.content.default_limit < 1 {
        bail!("content.default_limit must be >= 1");
    }
    if config.search.max_limit < 1 {
        bail!("search.max_limit must be >= 1");
    }
    if config.auth.jwt_secret.is_empty() {
        bail!("auth.jwt_secret must not be empty");
    }
    if config.auth.access_token_minutes < 1 || config.auth.refresh_token_days < 1 {
        bail!("auth token lifetimes must be >= 1");
    }
    if config.search.default_limit < 1 || config.search.default_limit > config.search.max_limit {
        bail!(
            "search.default_limit must be in [1, {}]",
            config.search.max_limit
        );
    }

    Ok(())
}
