//! Markdown ingestion: parse → assemble → reconcile by title.
//!
//! | title exists | overwrite | outcome |
//! |--------------|-----------|---------|
//! | no  | either | `created` |
//! | yes | false  | `skipped` (existing record returned untouched) |
//! | yes | true   | `updated` (mutable fields replaced in place) |
//!
//! Every error for a single document (unreadable file, bad frontmatter,
//! missing fields, storage failure) is caught at the document boundary and
//! reported as `failed`; one bad document never aborts a batch. Documents in
//! a batch are processed strictly one after another.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::{Config, ImportConfig};
use crate::error::ImportError;
use crate::extract::LocalImages;
use crate::models::ContentRecord;
use crate::payload::{parse_document, ParseOptions};
use crate::store::sqlite::SqliteStore;
use crate::store::ContentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Created,
    Updated,
    Skipped,
    Failed,
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImportStatus::Created => "created",
            ImportStatus::Updated => "updated",
            ImportStatus::Skipped => "skipped",
            ImportStatus::Failed => "failed",
        };
        f.pad(s)
    }
}

/// Result of importing one document.
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub file_name: Option<String>,
    pub status: ImportStatus,
    pub id: Option<String>,
    pub title: Option<String>,
    pub error: Option<String>,
}

impl ImportOutcome {
    /// A failed outcome for a document that never reached the parser.
    pub fn failed(file_name: Option<String>, error: impl Into<String>) -> Self {
        let error = error.into();
        tracing::warn!(
            file = file_name.as_deref().unwrap_or("-"),
            error = %error,
            "document import failed"
        );
        Self {
            file_name,
            status: ImportStatus::Failed,
            id: None,
            title: None,
            error: Some(error),
        }
    }

    fn from_result(
        file_name: Option<String>,
        result: std::result::Result<(ImportStatus, ContentRecord), ImportError>,
    ) -> Self {
        match result {
            Ok((status, record)) => {
                tracing::info!(
                    file = file_name.as_deref().unwrap_or("-"),
                    title = %record.title,
                    id = %record.id,
                    %status,
                    "imported document"
                );
                Self {
                    file_name,
                    status,
                    id: Some(record.id),
                    title: Some(record.title),
                    error: None,
                }
            }
            Err(e) => Self::failed(file_name, e.to_string()),
        }
    }
}

/// Per-status counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ImportSummary {
    pub fn from_outcomes(outcomes: &[ImportOutcome]) -> Self {
        let mut summary = Self::default();
        for o in outcomes {
            match o.status {
                ImportStatus::Created => summary.created += 1,
                ImportStatus::Updated => summary.updated += 1,
                ImportStatus::Skipped => summary.skipped += 1,
                ImportStatus::Failed => summary.failed += 1,
            }
        }
        summary
    }
}

/// Options shared by every document of an import call.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub overwrite: bool,
    pub parse: ParseOptions,
    /// Explicit image base directory; takes precedence over the source
    /// file's directory and the configured default.
    pub base_dir_override: Option<PathBuf>,
    include: GlobSet,
}

impl ImportOptions {
    pub fn from_config(config: &ImportConfig, overwrite: bool) -> Result<Self> {
        Ok(Self {
            overwrite,
            parse: ParseOptions::from_config(config)?,
            base_dir_override: None,
            include: build_globset(&config.include_globs)?,
        })
    }

    pub fn with_base_dir(mut self, base_dir: Option<PathBuf>) -> Self {
        self.base_dir_override = base_dir;
        self
    }

    /// Restrict which local image files may be inlined.
    pub fn with_local_images(mut self, policy: LocalImages) -> Self {
        self.parse.local_images = policy;
        self
    }

    /// Parse options for a document, given the directory it was read from.
    fn parse_options_for(&self, source_dir: Option<&Path>) -> ParseOptions {
        let base_dir = self
            .base_dir_override
            .clone()
            .or_else(|| source_dir.map(Path::to_path_buf))
            .or_else(|| self.parse.base_dir.clone());
        self.parse.clone().with_base_dir(base_dir)
    }

    fn is_included(&self, file_name: &str) -> bool {
        self.include.is_match(file_name)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            GlobBuilder::new(pattern)
                .case_insensitive(true)
                .literal_separator(true)
                .build()?,
        );
    }
    Ok(builder.build()?)
}

/// Parse `text`, then create, skip or overwrite the record with its title.
async fn reconcile(
    store: &dyn ContentStore,
    text: &str,
    parse: &ParseOptions,
    overwrite: bool,
) -> std::result::Result<(ImportStatus, ContentRecord), ImportError> {
    let payload = parse_document(text, parse)?;

    if overwrite {
        if let Some(updated) = store.overwrite_by_title(&payload).await? {
            return Ok((ImportStatus::Updated, updated));
        }
    }

    if let Some(created) = store.insert_if_absent(&payload).await? {
        return Ok((ImportStatus::Created, created));
    }

    // The title exists. Without overwrite that is a skip; with overwrite it
    // means another writer created it after our update attempt.
    if overwrite {
        if let Some(updated) = store.overwrite_by_title(&payload).await? {
            return Ok((ImportStatus::Updated, updated));
        }
    } else if let Some(existing) = store.find_by_title(&payload.title).await? {
        return Ok((ImportStatus::Skipped, existing));
    }

    Err(ImportError::Storage(anyhow::anyhow!(
        "record for title '{}' vanished during import",
        payload.title
    )))
}

/// Import a markdown document held in memory.
///
/// Relative image paths resolve against the explicit override, else the
/// configured `import.base_dir`, else the working directory.
pub async fn import_text(
    store: &dyn ContentStore,
    text: &str,
    file_name: Option<String>,
    options: &ImportOptions,
) -> ImportOutcome {
    tracing::debug!(file = file_name.as_deref().unwrap_or("-"), "importing text");
    let parse = options.parse_options_for(None);
    let result = reconcile(store, text, &parse, options.overwrite).await;
    ImportOutcome::from_result(file_name, result)
}

/// Import one markdown file. Relative image paths resolve against the
/// file's own directory unless overridden.
pub async fn import_file(
    store: &dyn ContentStore,
    path: &Path,
    options: &ImportOptions,
) -> ImportOutcome {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    tracing::debug!(path = %path.display(), "importing file");

    let result = match std::fs::read_to_string(path) {
        Ok(text) => {
            let source_dir = std::path::absolute(path)
                .ok()
                .and_then(|p| p.parent().map(Path::to_path_buf));
            let parse = options.parse_options_for(source_dir.as_deref());
            reconcile(store, &text, &parse, options.overwrite).await
        }
        Err(e) => Err(ImportError::io(path, e)),
    };

    ImportOutcome::from_result(Some(file_name), result)
}

/// Import every matching file directly inside `dir` (non-recursive), in
/// file-name order. Only an unreadable directory is an error.
pub async fn import_directory(
    store: &dyn ContentStore,
    dir: &Path,
    options: &ImportOptions,
) -> Result<Vec<ImportOutcome>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry =
            entry.with_context(|| format!("Failed to read directory: {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if options.is_included(&name) {
            files.push((name, entry.into_path()));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut outcomes = Vec::with_capacity(files.len());
    for (_, path) in &files {
        outcomes.push(import_file(store, path, options).await);
    }
    Ok(outcomes)
}

/// Import a single file or a whole directory.
///
/// A path that does not exist is an error naming the path.
pub async fn import_path(
    store: &dyn ContentStore,
    path: &Path,
    options: &ImportOptions,
) -> Result<Vec<ImportOutcome>> {
    if path.is_dir() {
        import_directory(store, path, options).await
    } else if path.is_file() {
        Ok(vec![import_file(store, path, options).await])
    } else {
        bail!("Path not found: {}", path.display())
    }
}

/// What the CLI asked to import.
pub enum ImportSource {
    File(PathBuf),
    Dir(PathBuf),
}

/// CLI entry point for `lbase import`.
pub async fn run_import(
    config: &Config,
    source: ImportSource,
    overwrite: bool,
    base_dir: Option<PathBuf>,
) -> Result<()> {
    let options = ImportOptions::from_config(&config.import, overwrite)?.with_base_dir(base_dir);

    match &source {
        ImportSource::File(path) if !path.is_file() => {
            bail!("File not found: {}", path.display())
        }
        ImportSource::Dir(path) if !path.is_dir() => {
            bail!("Directory not found: {}", path.display())
        }
        _ => {}
    }

    let store = SqliteStore::open(config).await?;

    let result = match source {
        ImportSource::File(path) => {
            let outcome = import_file(&store, &path, &options).await;
            print_outcome(&outcome);
            match outcome.error {
                Some(reason) if outcome.status == ImportStatus::Failed => {
                    Err(anyhow::anyhow!("import failed: {}", reason))
                }
                _ => Ok(()),
            }
        }
        ImportSource::Dir(path) => {
            let outcomes = import_directory(&store, &path, &options).await;
            outcomes.map(|outcomes| {
                let summary = ImportSummary::from_outcomes(&outcomes);
                println!("import {} (overwrite: {})", path.display(), overwrite);
                println!("  created: {}", summary.created);
                println!("  updated: {}", summary.updated);
                println!("  skipped: {}", summary.skipped);
                println!("  failed: {}", summary.failed);
                for outcome in &outcomes {
                    print_outcome(outcome);
                }
                println!("ok");
            })
        }
    };

    store.pool().close().await;
    result
}

fn print_outcome(outcome: &ImportOutcome) {
    println!(
        "  {:<32} {:<8} {:<36} {}",
        outcome.file_name.as_deref().unwrap_or("-"),
        outcome.status,
        outcome.id.as_deref().unwrap_or("-"),
        outcome
            .title
            .as_deref()
            .or(outcome.error.as_deref())
            .unwrap_or("-")
    );
}
