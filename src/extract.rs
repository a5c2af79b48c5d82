//! Side-channel extraction from a markdown body.
//!
//! Three independent scans over the same text:
//!
//! | Scan | Output |
//! |------|--------|
//! | fenced code blocks tagged with a configured language | `code`, blocks joined by a blank line |
//! | `$$ … $$` blocks | `formula_1`, `formula_2`, … in order of appearance |
//! | `![alt](ref)` images | display name → URL or `data:` URI |
//!
//! Formula keys are positional: reordering the math blocks in the source
//! reorders the keys.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;

use crate::models::{Formulas, Images};

const MIME_FALLBACK: &str = "application/octet-stream";

/// Extension (lowercase, no dot) → MIME type for inlined images.
const IMAGE_MIME: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
];

fn formula_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\$\$(.*?)\$\$").expect("valid formula regex"))
}

fn image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[(.*?)\]\((.*?)\)").expect("valid image regex"))
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(https?:)?//").expect("valid url regex"))
}

/// Which local files an image reference may inline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LocalImages {
    /// Any readable path. Used for imports started from the CLI.
    #[default]
    Allow,
    /// Only files under this directory once `..` and symlinks are resolved.
    Confined(PathBuf),
    /// Local references are dropped; only URLs are kept.
    Deny,
}

impl LocalImages {
    fn permits(&self, path: &Path) -> std::io::Result<bool> {
        match self {
            LocalImages::Allow => Ok(true),
            LocalImages::Deny => Ok(false),
            LocalImages::Confined(root) => {
                let root = root.canonicalize()?;
                Ok(path.canonicalize()?.starts_with(root))
            }
        }
    }
}

/// Matches fenced code blocks whose info string is one of a fixed set of
/// languages, compared case-insensitively.
#[derive(Debug, Clone)]
pub struct CodeBlockMatcher {
    re: Regex,
}

impl CodeBlockMatcher {
    pub fn new(languages: &[String]) -> Result<Self, regex::Error> {
        let alternation = languages
            .iter()
            .map(|l| regex::escape(l.trim()))
            .collect::<Vec<_>>()
            .join("|");
        let re = Regex::new(&format!(r"(?is)```(?:{})\s*\n(.*?)```", alternation))?;
        Ok(Self { re })
    }

    /// Concatenate the trimmed, non-empty blocks in document order.
    pub fn extract(&self, body: &str) -> String {
        self.re
            .captures_iter(body)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim())
            .filter(|block| !block.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub fn extract_formulas(body: &str) -> Formulas {
    formula_re()
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .enumerate()
        .map(|(i, m)| {
            (
                format!("formula_{}", i + 1),
                serde_json::Value::String(m.as_str().trim().to_string()),
            )
        })
        .collect()
}

/// Collect images keyed by display name.
///
/// Remote references are kept verbatim. Local paths are resolved against
/// `base_dir` when relative and inlined as `data:` URIs; a path that cannot
/// be read, or that `local` does not permit, is dropped without failing the
/// document. A repeated display name keeps the last reference.
pub fn extract_images(body: &str, base_dir: Option<&Path>, local: &LocalImages) -> Images {
    let mut images = Images::new();

    for caps in image_re().captures_iter(body) {
        let alt = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let reference = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let name = display_name(alt, reference);

        if is_url(reference) {
            images.insert(name, reference.to_string());
            continue;
        }

        let path = resolve_path(reference, base_dir);
        match local.permits(&path) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    image = %name,
                    path = %path.display(),
                    "dropping image outside the allowed directory"
                );
                continue;
            }
            Err(e) => {
                tracing::warn!(
                    image = %name,
                    path = %path.display(),
                    error = %e,
                    "dropping unreadable image"
                );
                continue;
            }
        }
        match to_data_uri(&path) {
            Ok(uri) => {
                images.insert(name, uri);
            }
            Err(e) => {
                tracing::warn!(
                    image = %name,
                    path = %path.display(),
                    error = %e,
                    "dropping unreadable image"
                );
            }
        }
    }

    images
}

/// Alt text when present, else the reference's file name up to its first dot.
fn display_name(alt: &str, reference: &str) -> String {
    let alt = alt.trim();
    if !alt.is_empty() {
        return alt.to_string();
    }
    let file_name = reference.rsplit('/').next().unwrap_or(reference);
    file_name.split('.').next().unwrap_or_default().to_string()
}

pub fn is_url(reference: &str) -> bool {
    url_re().is_match(reference)
}

fn resolve_path(reference: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = Path::new(reference);
    match base_dir {
        Some(base) if !path.is_absolute() => base.join(path),
        _ => path.to_path_buf(),
    }
}

pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    IMAGE_MIME
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(MIME_FALLBACK)
}

fn to_data_uri(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(format!(
        "data:{};base64,{}",
        mime_for(path),
        STANDARD.encode(bytes)
    ))
}
