//! Error types for wasm-boot.
//!
//! [`BootError`] covers every way a bootstrap attempt or a worker dispatch
//! can fail. The four core kinds are:
//! - [`BootError::Fetch`]: the payload resource could not be retrieved
//! - [`BootError::ModuleLoad`]: the application module failed to resolve
//! - [`BootError::Entry`]: the module's entry point failed
//! - [`BootError::WorkerDispatch`]: the module's worker handler failed

use thiserror::Error;

/// Bootstrap and worker errors.
///
/// None of these are retried. Fetch, module load and entry failures abort
/// the bootstrap; worker dispatch failures are reported per message.
#[derive(Error, Debug)]
pub enum BootError {
    /// The payload resource was unreachable or answered with a non-success status.
    #[error("Failed to fetch '{resource}': {reason}")]
    Fetch {
        /// The resource path that was requested.
        resource: String,
        /// HTTP status code, if a response was received.
        status: Option<u16>,
        /// Description of the failure.
        reason: String,
    },

    /// The application module could not be resolved.
    #[error("Module load failed: {reason}")]
    ModuleLoad {
        /// Description of the load failure.
        reason: String,
    },

    /// The module's entry operation failed.
    #[error("Entry failed: {reason}")]
    Entry {
        /// Description of the failure, including any guest backtrace.
        reason: String,
    },

    /// The module's worker-side handler failed while processing a message.
    #[error("Worker dispatch failed: {reason}")]
    WorkerDispatch {
        /// Description of the failure, including any guest backtrace.
        reason: String,
    },

    /// The worker thread could not be started.
    #[error("Worker spawn failed: {reason}")]
    WorkerSpawn {
        /// Description of the failure.
        reason: String,
    },

    /// A message could not be delivered because the other side is gone.
    #[error("Channel closed: {peer}")]
    ChannelClosed {
        /// Which side of the channel was unreachable.
        peer: &'static str,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },
}

impl BootError {
    /// Create a new `Fetch` error without a response status.
    pub fn fetch_failed(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            resource: resource.into(),
            status: None,
            reason: reason.into(),
        }
    }

    /// Create a new `Fetch` error for a non-success HTTP status.
    pub fn fetch_status(resource: impl Into<String>, status: u16) -> Self {
        Self::Fetch {
            resource: resource.into(),
            status: Some(status),
            reason: format!("HTTP status {status}"),
        }
    }

    /// Create a new `ModuleLoad` error.
    pub fn module_load_failed(reason: impl Into<String>) -> Self {
        Self::ModuleLoad {
            reason: reason.into(),
        }
    }

    /// Create a new `Entry` error.
    pub fn entry_failed(reason: impl Into<String>) -> Self {
        Self::Entry {
            reason: reason.into(),
        }
    }

    /// Create a new `WorkerDispatch` error.
    pub fn worker_dispatch_failed(reason: impl Into<String>) -> Self {
        Self::WorkerDispatch {
            reason: reason.into(),
        }
    }

    /// Create a new `WorkerSpawn` error.
    pub fn worker_spawn_failed(reason: impl Into<String>) -> Self {
        Self::WorkerSpawn {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Reclassify this error as a module load failure.
    ///
    /// `ModuleLoad` errors pass through unchanged; anything else keeps its
    /// message as the load failure reason.
    #[must_use]
    pub fn into_module_load(self) -> Self {
        match self {
            err @ Self::ModuleLoad { .. } => err,
            other => Self::module_load_failed(other.to_string()),
        }
    }

    /// Reclassify this error as an entry failure.
    #[must_use]
    pub fn into_entry(self) -> Self {
        match self {
            err @ Self::Entry { .. } => err,
            other => Self::entry_failed(other.to_string()),
        }
    }

    /// Reclassify this error as a worker dispatch failure.
    #[must_use]
    pub fn into_worker_dispatch(self) -> Self {
        match self {
            err @ Self::WorkerDispatch { .. } => err,
            other => Self::worker_dispatch_failed(other.to_string()),
        }
    }

    /// Short, stable name of the error kind for structured reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::ModuleLoad { .. } => "module_load",
            Self::Entry { .. } => "entry",
            Self::WorkerDispatch { .. } => "worker_dispatch",
            Self::WorkerSpawn { .. } => "worker_spawn",
            Self::ChannelClosed { .. } => "channel_closed",
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }

    /// Returns `true` if this error aborts a bootstrap attempt.
    ///
    /// Worker dispatch failures only affect the message being processed.
    pub fn is_fatal_to_boot(&self) -> bool {
        !matches!(self, Self::WorkerDispatch { .. })
    }
}
