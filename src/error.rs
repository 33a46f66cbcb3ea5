use std::path::PathBuf;

use thiserror::Error;

/// Everything the archiver can fail with.
///
/// Nothing here is retried. `Auth` aborts before enumeration starts, every other
/// variant aborts the run wherever it surfaces.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("GET {url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("{method} failed with API error {code}: {message}")]
    Api {
        method: String,
        code: i64,
        message: String,
    },

    #[error("malformed payload: {what}")]
    Malformed { what: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("prompt: {0}")]
    Prompt(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(what: impl Into<String>) -> Self {
        ArchiveError::Malformed { what: what.into() }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ArchiveError::Auth(_))
    }
}
