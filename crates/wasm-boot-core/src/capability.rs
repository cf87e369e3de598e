//! The application module as seen by the bootstrap layer.
//!
//! wasm-boot never looks inside the module. It only needs something that
//! can be resolved asynchronously ([`ModuleResolver`]) and then offers an
//! entry point and a worker handler ([`AppModule`]).

use std::sync::Arc;

use async_trait::async_trait;

use wasm_boot_common::BootError;

use crate::channel::{WorkerHandle, WorkerMessage};

/// A resolved module, shared by every caller within one execution context.
pub type ModuleHandle = Arc<dyn AppModule>;

/// The execution context a module handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionContext {
    /// The bootstrap context.
    Main,
    /// The background worker thread.
    Worker,
}

impl ExecutionContext {
    /// Name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            ExecutionContext::Main => "main",
            ExecutionContext::Worker => "worker",
        }
    }
}

impl std::fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw bytes fetched from a named resource.
///
/// The content is never decoded or validated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryPayload {
    resource: String,
    bytes: Vec<u8>,
}

impl BinaryPayload {
    /// Create a payload for the given resource.
    pub fn new(resource: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            resource: resource.into(),
            bytes: bytes.into(),
        }
    }

    /// The resource this payload was fetched from.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The payload content.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes in the payload.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consume the payload, returning its content.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// A resolved application module.
#[async_trait]
pub trait AppModule: Send + Sync {
    /// Start the application with its payload.
    ///
    /// `worker` is `Some` in deployments that run a background worker; the
    /// module talks to it directly from then on.
    async fn entry(
        &self,
        payload: BinaryPayload,
        worker: Option<WorkerHandle>,
    ) -> Result<(), BootError>;

    /// Handle one message on the worker context.
    async fn worker(&self, message: WorkerMessage) -> Result<(), BootError>;

    /// Receive a reply the worker sent back to the main context.
    ///
    /// Called after `entry` has returned, once per reply, in arrival order.
    /// The default discards the reply.
    async fn on_reply(&self, _data: Vec<u8>) -> Result<(), BootError> {
        Ok(())
    }
}

/// Produces a fresh module instance for an execution context.
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    /// Resolve a new module handle for `context`.
    ///
    /// Every call yields an independent instance; memoization is the
    /// caller's job (see [`ModuleLoader`](crate::ModuleLoader)).
    async fn resolve(&self, context: ExecutionContext) -> Result<ModuleHandle, BootError>;
}
