//! Wasmtime engine configuration and creation.
//!
//! One [`WasmEngine`] is shared by the main and worker contexts. It holds
//! compilation settings only; guest state lives in per-context stores.

use std::sync::Arc;

use tracing::info;
use wasmtime::{Config, Engine, OptLevel, WasmBacktraceDetails};

use wasm_boot_common::{BootError, EngineConfig};

/// Thread-safe WebAssembly engine wrapper.
///
/// The engine is configured with:
/// - **Async Support**: guest calls are awaited so the calling context's
///   runtime is never blocked at a suspension point
/// - **Wasm Backtraces**: traps carry a guest backtrace for failure reports
///
/// # Example
///
/// ```ignore
/// use wasm_boot_common::EngineConfig;
/// use wasm_boot_core::WasmEngine;
///
/// let engine = WasmEngine::new(&EngineConfig::default())?;
/// ```
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is rejected.
    pub fn new(config: &EngineConfig) -> Result<Self, BootError> {
        let mut wasmtime_config = Config::new();

        wasmtime_config.async_support(true);
        wasmtime_config.wasm_backtrace(true);

        let details = if config.backtrace_details {
            WasmBacktraceDetails::Enable
        } else {
            WasmBacktraceDetails::Disable
        };
        wasmtime_config.wasm_backtrace_details(details);

        let opt_level = if config.optimize {
            OptLevel::Speed
        } else {
            OptLevel::None
        };
        wasmtime_config.cranelift_opt_level(opt_level);

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            BootError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        info!(
            optimize = config.optimize,
            backtrace_details = config.backtrace_details,
            "Wasmtime engine initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("optimize", &self.config.optimize)
            .field("backtrace_details", &self.config.backtrace_details)
            .finish_non_exhaustive()
    }
}
