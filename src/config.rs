//! Configuration for the runner
//!
//! Runner-wide defaults, loadable from code, the environment or a TOML file.
//! Per-run overrides live in [`RunOptions`](crate::runner::RunOptions).

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Default step budget for a run.
pub const DEFAULT_MAX_TOTAL_TURNS: usize = 20;

/// Runner-wide configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum number of steps (summed over every `generate` call) a run may
    /// consume before it fails with a turn-limit error.
    pub max_total_turns: usize,

    /// Validate the handoff graph after registration, before the first turn.
    pub validate_handoffs: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_total_turns: DEFAULT_MAX_TOTAL_TURNS,
            validate_handoffs: true,
        }
    }
}

/// Configuration builder
pub struct ConfigBuilder {
    config: RunnerConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RunnerConfig::default(),
        }
    }

    pub fn max_total_turns(mut self, turns: usize) -> Self {
        self.config.max_total_turns = turns;
        self
    }

    pub fn validate_handoffs(mut self, enabled: bool) -> Self {
        self.config.validate_handoffs = enabled;
        self
    }

    pub fn build(self) -> RunnerConfig {
        self.config
    }
}

/// Load configuration from environment variables
///
/// - `RELAY_MAX_TOTAL_TURNS`: positive integer
/// - `RELAY_VALIDATE_HANDOFFS`: `true`/`1` or `false`/`0`
///
/// Unparseable values are ignored and the default is kept.
pub fn from_env() -> RunnerConfig {
    let mut config = RunnerConfig::default();

    if let Ok(turns) = std::env::var("RELAY_MAX_TOTAL_TURNS") {
        match turns.trim().parse::<usize>() {
            Ok(turns) => config.max_total_turns = turns,
            Err(err) => tracing::warn!(value = %turns, error = %err, "ignoring RELAY_MAX_TOTAL_TURNS"),
        }
    }

    if let Ok(validate) = std::env::var("RELAY_VALIDATE_HANDOFFS") {
        match validate.trim().to_lowercase().as_str() {
            "true" | "1" => config.validate_handoffs = true,
            "false" | "0" => config.validate_handoffs = false,
            other => tracing::warn!(value = %other, "ignoring RELAY_VALIDATE_HANDOFFS"),
        }
    }

    config
}

/// Load configuration from a TOML file
pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<RunnerConfig> {
    let contents = std::fs::read_to_string(path)?;
    from_toml_str(&contents)
}

/// Parse configuration from TOML text; missing keys take their defaults.
pub fn from_toml_str(contents: &str) -> Result<RunnerConfig> {
    toml::from_str(contents).map_err(|e| OrchestratorError::Config(e.to_string()))
}
