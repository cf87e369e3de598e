//! Configuration sections for wasm-boot.
//!
//! This module defines configuration options for the bootstrap components:
//! - [`EngineConfig`]: Wasmtime engine settings
//! - [`ModuleConfig`]: where the application module is loaded from
//! - [`PayloadConfig`]: which binary payload is fetched, and from where
//! - [`WorkerConfig`]: whether a background worker is started
//! - [`DiagnosticsConfig`]: failure report verbosity

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Wasmtime engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Compile guests with Cranelift speed optimizations.
    #[serde(default = "defaults::optimize")]
    pub optimize: bool,

    /// Resolve guest backtrace frames to source locations.
    ///
    /// Requires DWARF debug info in the guest module; otherwise frames are
    /// reported by function name and index only.
    #[serde(default)]
    pub backtrace_details: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            optimize: defaults::optimize(),
            backtrace_details: false,
        }
    }
}

/// Location of the application module.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleConfig {
    /// Path to the WebAssembly module file.
    ///
    /// Both the main context and the worker load their own instance from here.
    #[serde(default = "defaults::module_path")]
    pub path: String,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            path: defaults::module_path(),
        }
    }
}

/// Binary payload fetched at startup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PayloadConfig {
    /// The named resource to fetch.
    #[serde(default)]
    pub resource: PayloadResource,

    /// Where resources are served from.
    #[serde(default)]
    pub source: PayloadSource,
}

/// The resource names a deployment may fetch.
///
/// Exactly one is active per deployment. Both carry the same opaque format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadResource {
    /// `/term`
    Term,
    /// `/terms`
    #[default]
    Terms,
}

impl PayloadResource {
    /// The resource path requested from the payload source.
    pub const fn path(self) -> &'static str {
        match self {
            PayloadResource::Term => "/term",
            PayloadResource::Terms => "/terms",
        }
    }
}

impl std::fmt::Display for PayloadResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Where payload resources are served from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayloadSource {
    /// Fetch over HTTP, resolving the resource path against `base_url`.
    Http {
        /// Base URL, e.g. `http://127.0.0.1:8080`.
        base_url: String,

        /// Whole-request timeout in seconds. Unset means the fetch waits
        /// for as long as the server takes.
        #[serde(default)]
        timeout_secs: Option<u64>,
    },

    /// Read from a local asset directory, resolving the resource path under `root`.
    Directory {
        /// Asset directory.
        root: String,
    },
}

impl Default for PayloadSource {
    fn default() -> Self {
        PayloadSource::Http {
            base_url: defaults::base_url(),
            timeout_secs: None,
        }
    }
}

impl PayloadSource {
    /// The HTTP timeout as a `Duration`, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            PayloadSource::Http { timeout_secs, .. } => timeout_secs.map(Duration::from_secs),
            PayloadSource::Directory { .. } => None,
        }
    }
}

/// Background worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Start a worker and hand its handle to the module's entry point.
    #[serde(default)]
    pub enabled: bool,

    /// When the worker is constructed relative to the payload fetch.
    #[serde(default)]
    pub spawn_order: SpawnOrder,

    /// OS thread name of the worker.
    #[serde(default = "defaults::thread_name")]
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            spawn_order: SpawnOrder::default(),
            thread_name: defaults::thread_name(),
        }
    }
}

/// Worker construction point during bootstrap.
///
/// Both orders behave the same: the worker loads nothing until its first message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnOrder {
    /// Construct the worker right after the module is loaded.
    #[default]
    BeforeFetch,
    /// Construct the worker once the payload has arrived.
    AfterFetch,
}

/// Failure report verbosity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiagnosticsConfig {
    /// Number of guest backtrace frames rendered in failure reports.
    ///
    /// Bootstrap raises the process-wide limit to this bound; `0` leaves it
    /// at its default.
    #[serde(default = "defaults::stack_trace_limit")]
    pub stack_trace_limit: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            stack_trace_limit: defaults::stack_trace_limit(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn optimize() -> bool {
        true
    }

    pub fn module_path() -> String {
        "./pkg/app.wasm".to_string()
    }

    pub fn base_url() -> String {
        "http://127.0.0.1:8080".to_string()
    }

    pub fn thread_name() -> String {
        "wasm-boot-worker".to_string()
    }

    pub const fn stack_trace_limit() -> usize {
        50
    }
}
