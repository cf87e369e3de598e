//! Configuration file structures for wasm-boot.
//!
//! [`BootConfig`] is the top-level structure of a TOML configuration file.
//! Every section and field has a default, so an empty file is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{DiagnosticsConfig, EngineConfig, ModuleConfig, PayloadConfig, WorkerConfig};

/// Top-level configuration.
///
/// # Example
///
/// ```toml
/// [engine]
/// optimize = true
///
/// [module]
/// path = "./pkg/app.wasm"
///
/// [payload]
/// resource = "terms"
///
/// [payload.source]
/// kind = "http"
/// base_url = "http://127.0.0.1:8080"
///
/// [worker]
/// enabled = true
/// spawn_order = "after_fetch"
///
/// [diagnostics]
/// stack_trace_limit = 50
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BootConfig {
    /// Wasmtime engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Application module location.
    #[serde(default)]
    pub module: ModuleConfig,

    /// Startup payload.
    #[serde(default)]
    pub payload: PayloadConfig,

    /// Background worker.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Failure report verbosity.
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

impl BootConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), "Configuration file loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}
