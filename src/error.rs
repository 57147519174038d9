use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineError;

/// Result type for the crate's outer surface (file I/O, parsing, runs).
pub type LaeResult<T> = Result<T, LaeError>;

#[derive(Debug, Error)]
pub enum LaeError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}
