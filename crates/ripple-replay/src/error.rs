//! Error types for the ripple-replay crate.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("IO error: {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error: {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Parse error: {path} line {line}: {source}")]
    TraceLine {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error("Schema error: {0}")]
    Schema(#[from] ripple_core::RippleError),

    #[error("Engine error: {0}")]
    Engine(#[from] ripple_engine::EngineError),

    #[error("No schema given: pass --schema or set engine.schema_path")]
    NoSchema,
}

pub type Result<T> = std::result::Result<T, ReplayError>;
