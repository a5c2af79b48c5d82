//! YAML frontmatter splitting.
//!
//! A frontmatter block is only recognised at the very start of the text:
//!
//! ```text
//! ---
//! module: math
//! title: Gradient Descent
//! ---
//! body...
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde_yaml::{Mapping, Value};

use crate::error::{ImportError, Result};

fn frontmatter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\A---[ \t\r\f\v]*\n(.*?)\n---\s*(?:\n|\z)")
            .expect("valid frontmatter regex")
    })
}

/// Split `text` into its metadata mapping and the remaining body.
///
/// Without a leading block the mapping is empty and the whole input is body.
/// A block that parses to something other than a mapping (including an
/// empty block) also yields an empty mapping.
pub fn split_frontmatter(text: &str) -> Result<(Mapping, &str)> {
    let Some(caps) = frontmatter_re().captures(text) else {
        return Ok((Mapping::new(), text));
    };

    let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
    let block = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let body = &text[whole..];

    let parsed: Value =
        serde_yaml::from_str(block).map_err(|e| ImportError::parse(e.to_string()))?;

    let meta = match parsed {
        Value::Mapping(map) => map,
        _ => Mapping::new(),
    };

    Ok((meta, body))
}
