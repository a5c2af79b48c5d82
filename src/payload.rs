//! Payload assembly: frontmatter + extracted side-channels → [`NewContent`].

use std::path::PathBuf;

use serde_yaml::{Mapping, Value};

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::extract::{self, CodeBlockMatcher, LocalImages};
use crate::frontmatter::split_frontmatter;
use crate::models::{Formulas, NewContent};

/// Fields that must be non-empty after assembly, in reporting order.
pub const REQUIRED_FIELDS: [&str; 3] = ["module", "subcategory", "title"];

/// Per-document parsing options.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub code: CodeBlockMatcher,
    /// Directory that relative image paths are resolved against.
    pub base_dir: Option<PathBuf>,
    pub local_images: LocalImages,
}

impl ParseOptions {
    pub fn from_config(config: &ImportConfig) -> anyhow::Result<Self> {
        Ok(Self {
            code: CodeBlockMatcher::new(&config.code_languages)?,
            base_dir: config.base_dir.clone(),
            local_images: LocalImages::Allow,
        })
    }

    pub fn with_base_dir(mut self, base_dir: Option<PathBuf>) -> Self {
        self.base_dir = base_dir;
        self
    }
}

/// Parse a markdown document into a validated [`NewContent`].
///
/// Fails with [`ImportError::Parse`] for malformed frontmatter and
/// [`ImportError::Validation`] when module, subcategory or title is empty.
pub fn parse_document(text: &str, options: &ParseOptions) -> Result<NewContent> {
    let (meta, body) = split_frontmatter(text)?;
    assemble(&meta, body, options)
}

pub fn assemble(meta: &Mapping, body: &str, options: &ParseOptions) -> Result<NewContent> {
    let code = options.code.extract(body);
    let mut formulas = extract::extract_formulas(body);
    merge_declared_formulas(&mut formulas, meta.get("formulas"))?;
    let images = extract::extract_images(body, options.base_dir.as_deref(), &options.local_images);

    let payload = NewContent {
        module: string_field(meta, "module"),
        subcategory: string_field(meta, "subcategory"),
        title: string_field(meta, "title"),
        body: body.trim().to_string(),
        code,
        formulas,
        images,
        tags: tags_field(meta),
    };

    let missing: Vec<&'static str> = REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| match *field {
            "module" => payload.module.is_empty(),
            "subcategory" => payload.subcategory.is_empty(),
            _ => payload.title.is_empty(),
        })
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::Validation { missing });
    }

    Ok(payload)
}

/// Append frontmatter-declared formulas whose names are not already taken
/// by a positional block formula.
fn merge_declared_formulas(formulas: &mut Formulas, declared: Option<&Value>) -> Result<()> {
    let Some(Value::Mapping(declared)) = declared else {
        return Ok(());
    };
    for (key, value) in declared {
        let key = scalar_to_string(key);
        if formulas.contains_key(&key) {
            continue;
        }
        let value = serde_json::to_value(value)
            .map_err(|e| ImportError::parse(format!("formula '{}': {}", key, e)))?;
        formulas.insert(key, value);
    }
    Ok(())
}

fn string_field(meta: &Mapping, key: &str) -> String {
    meta.get(key)
        .map(scalar_to_string)
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn tags_field(meta: &Mapping) -> Option<Vec<String>> {
    match meta.get("tags") {
        Some(Value::Sequence(items)) => Some(items.iter().map(scalar_to_string).collect()),
        _ => None,
    }
}

/// Render a YAML value as a plain string. Null becomes empty.
fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => scalar_to_string(&tagged.value),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
