use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{0} is not a mapping of settings")]
    NotAMapping(PathBuf),

    #[error("no master `id` configured in {0}")]
    MissingId(PathBuf),

    #[error("invalid master id: {0:?}")]
    InvalidId(String),
}

/// Why a lookup could not produce an answer.
///
/// Every variant ends in a rejection; the distinction exists for logs and
/// callers, not for the emitted event.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("inventory query failed: {0}")]
    Query(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("malformed inventory response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid minion id: {0:?}")]
pub struct InvalidMinionId(pub String);

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event transport failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}
