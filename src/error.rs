//! Error types for the ingestion pipeline.
//!
//! Pipeline code returns [`ImportError`]; the reconciler turns every variant
//! into a `failed` outcome at the document boundary. Application code (CLI,
//! server, config) works with `anyhow`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// Frontmatter block present but not valid YAML.
    #[error("failed to parse frontmatter: {message}")]
    Parse { message: String },

    /// Required fields empty after assembly.
    #[error("missing required fields in frontmatter: {}", .missing.join(", "))]
    Validation { missing: Vec<&'static str> },

    /// Source document could not be read.
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ImportError>;

impl ImportError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<anyhow::Error> for ImportError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}
