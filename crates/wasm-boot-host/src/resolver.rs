//! Module resolution for Wasm guests.
//!
//! [`WasmModuleResolver`] is the [`ModuleResolver`] used in production: each
//! call reads the module source, compiles it and instantiates a fresh
//! [`GuestModule`] with the host functions from [`crate::linker`]. The main
//! context and the worker each call it once, through their own loader.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};
use wasmtime::Linker;

use wasm_boot_common::BootError;
use wasm_boot_core::{
    CompiledModule, ExecutionContext, GuestContext, GuestModule, ModuleHandle, ModuleResolver,
    WasmEngine,
};

use crate::linker::create_linker;

/// Where guest module code comes from.
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// A module file on disk. Files ending in `.wat` are read as text.
    File(PathBuf),
    /// WebAssembly text, compiled in memory.
    Wat(String),
}

/// Resolves guest modules for any execution context.
#[derive(Clone)]
pub struct WasmModuleResolver {
    engine: WasmEngine,
    linker: Arc<Linker<GuestContext>>,
    source: ModuleSource,
}

impl WasmModuleResolver {
    /// Create a resolver with the standard host functions linked in.
    pub fn new(engine: WasmEngine, source: ModuleSource) -> Result<Self, BootError> {
        let linker = create_linker(&engine)?;
        Ok(Self {
            engine,
            linker: Arc::new(linker),
            source,
        })
    }

    async fn compile(&self) -> Result<CompiledModule, BootError> {
        match &self.source {
            ModuleSource::File(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| {
                    BootError::module_load_failed(format!("{}: {e}", path.display()))
                })?;
                debug!(path = %path.display(), bytes_len = bytes.len(), "Module file read");

                if path.extension().is_some_and(|ext| ext == "wat") {
                    let wat = String::from_utf8(bytes).map_err(|e| {
                        BootError::module_load_failed(format!("{}: {e}", path.display()))
                    })?;
                    return CompiledModule::from_wat(self.engine.inner(), &wat);
                }

                CompiledModule::from_bytes(self.engine.inner(), &bytes)
            }
            ModuleSource::Wat(wat) => CompiledModule::from_wat(self.engine.inner(), wat),
        }
    }
}

#[async_trait]
impl ModuleResolver for WasmModuleResolver {
    #[instrument(skip(self))]
    async fn resolve(&self, context: ExecutionContext) -> Result<ModuleHandle, BootError> {
        let module = self.compile().await?;
        let guest = GuestModule::instantiate(&self.engine, &self.linker, &module, context).await?;
        Ok(Arc::new(guest))
    }
}

impl std::fmt::Debug for WasmModuleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmModuleResolver")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
