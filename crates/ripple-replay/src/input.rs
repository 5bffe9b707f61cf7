//! Loading replay inputs from disk.
//!
//! - schema: one JSON schema document
//! - subscriptions: a JSON array of subscribe requests, each optionally
//!   naming the connection it belongs to
//! - traces: a JSON array of mutation traces, or one trace per line

use std::path::Path;
use std::sync::Arc;

use ripple_core::{MutationTrace, TypeRegistry};
use ripple_engine::SubscribeRequest;
use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, Result};

/// One subscription to register before replaying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    /// Requests sharing a connection name share one connection.
    #[serde(default = "default_connection")]
    pub connection: String,
    #[serde(flatten)]
    pub request: SubscribeRequest,
}

fn default_connection() -> String {
    "default".to_string()
}

pub fn load_schema(path: &Path) -> Result<Arc<TypeRegistry>> {
    let types = TypeRegistry::load_json(path)?;
    tracing::info!(
        path = %path.display(),
        types = types.types().count(),
        relationships = types.relationship_kinds().count(),
        "Schema loaded"
    );
    Ok(Arc::new(types))
}

pub fn load_subscriptions(path: &Path) -> Result<Vec<SubscriptionSpec>> {
    let raw = read(path)?;
    serde_json::from_str(&raw).map_err(|source| ReplayError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_traces(path: &Path) -> Result<Vec<MutationTrace>> {
    let raw = read(path)?;
    parse_traces(path, &raw)
}

/// Parse either a JSON array of traces or JSON lines. Blank lines are skipped.
pub fn parse_traces(path: &Path, raw: &str) -> Result<Vec<MutationTrace>> {
    if raw.trim_start().starts_with('[') {
        return serde_json::from_str(raw).map_err(|source| ReplayError::Parse {
            path: path.to_path_buf(),
            source,
        });
    }

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| ReplayError::TraceLine {
                path: path.to_path_buf(),
                line: i + 1,
                source,
            })
        })
        .collect()
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
        path: path.to_path_buf(),
        source,
    })
}
