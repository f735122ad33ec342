//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadError { path: PathBuf, source: std::io::Error },

    #[error("failed to build configuration: {0}")]
    BuildError(String),

    #[error("failed to deserialize configuration: {0}")]
    DeserializeError(String),

    #[error("invalid configuration: {0}")]
    ValidationError(String),
}
