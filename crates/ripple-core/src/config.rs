//! Configuration for the subscription engine.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`RIPPLE_ENGINE__` prefix)
//! 2. Config file (`ripple.toml`, `[engine]` table)
//! 3. Defaults

use serde::Deserialize;

use crate::error::RippleError;

/// Engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Capacity of each connection's outbound delivery queue.
    #[serde(default = "default_connection_buffer")]
    pub connection_buffer: usize,

    /// What `subscribe` does with a filter that fails to compile.
    #[serde(default)]
    pub invalid_filter_policy: InvalidFilterPolicy,

    /// Where matching and fan-out run relative to the committing request.
    #[serde(default)]
    pub dispatch_mode: DispatchMode,

    /// Path to a JSON schema document, if the schema is loaded from disk.
    #[serde(default)]
    pub schema_path: Option<String>,
}

/// Handling of subscription filters that fail to compile.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvalidFilterPolicy {
    /// Register the subscription anyway; it never matches any event.
    #[default]
    NeverMatch,
    /// Refuse the subscription and return the compile error.
    Reject,
}

/// Hand-off between the committing request and the dispatcher.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Match and fan out on the committing caller's path.
    #[default]
    Inline,
    /// Publish into a queue drained by a spawned dispatch task.
    Background,
}

fn default_connection_buffer() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connection_buffer: default_connection_buffer(),
            invalid_filter_policy: InvalidFilterPolicy::default(),
            dispatch_mode: DispatchMode::default(),
            schema_path: None,
        }
    }
}

impl EngineConfig {
    /// Load from `<file_prefix>.toml` (optional) overlaid by `RIPPLE_ENGINE__*`.
    pub fn load(file_prefix: &str) -> Result<Self, RippleError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("RIPPLE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match cfg.get::<EngineConfig>("engine") {
            Ok(c) => Ok(c),
            Err(config::ConfigError::NotFound(_)) => Ok(EngineConfig::default()),
            Err(e) => Err(e.into()),
        }
    }
}
