use thiserror::Error;

use crate::schema::SchemaError;

/// Top-level error type for the Ripple engine.
#[derive(Error, Debug)]
pub enum RippleError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for RippleError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
