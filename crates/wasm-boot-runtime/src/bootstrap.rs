//! Startup orchestration on the main context.
//!
//! [`Bootstrapper::run`] performs the whole sequence once:
//!
//! 1. raise the diagnostic stack-trace limit
//! 2. load the main context's module (memoized)
//! 3. spawn the worker, if enabled (before or after the fetch)
//! 4. fetch the payload
//! 5. call the module's `entry` with the payload and the worker handle
//!
//! Any failure ends the attempt. Nothing is retried. Once `entry` has
//! returned, the session forwards every worker reply to the main module's
//! `on_reply`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, error, info, info_span, instrument};
use uuid::Uuid;

use wasm_boot_common::{BootConfig, BootError, PayloadResource, SpawnOrder};
use wasm_boot_core::diagnostics::{DEFAULT_STACK_TRACE_LIMIT, raise_stack_trace_limit};
use wasm_boot_core::{
    AppModule, BinaryPayload, ExecutionContext, ModuleHandle, ModuleLoader, ModuleResolver,
    ModuleState, WasmEngine, WorkerHandle,
};
use wasm_boot_host::{ModuleSource, PayloadFetcher, WasmModuleResolver, fetcher_from_config};

use crate::worker::WorkerThread;

/// Default OS thread name for the worker.
const DEFAULT_THREAD_NAME: &str = "wasm-boot-worker";

/// Runs the bootstrap sequence for one session.
pub struct Bootstrapper {
    loader: ModuleLoader,
    fetcher: Arc<dyn PayloadFetcher>,
    worker_resolver: Option<Arc<dyn ModuleResolver>>,
    resource: PayloadResource,
    spawn_order: SpawnOrder,
    thread_name: String,
    stack_trace_limit: usize,
}

impl Bootstrapper {
    /// Create a bootstrapper without a worker, fetching `/terms`.
    pub fn new(resolver: Arc<dyn ModuleResolver>, fetcher: Arc<dyn PayloadFetcher>) -> Self {
        Self {
            loader: ModuleLoader::new(ExecutionContext::Main, resolver),
            fetcher,
            worker_resolver: None,
            resource: PayloadResource::default(),
            spawn_order: SpawnOrder::default(),
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            stack_trace_limit: DEFAULT_STACK_TRACE_LIMIT,
        }
    }

    /// Build a bootstrapper from configuration.
    ///
    /// The main context and the worker share one resolver, which gives each
    /// of them its own instance of the module file.
    pub fn from_config(config: &BootConfig) -> Result<Self, BootError> {
        let engine = WasmEngine::new(&config.engine)?;
        let source = ModuleSource::File(PathBuf::from(&config.module.path));
        let resolver: Arc<dyn ModuleResolver> = Arc::new(WasmModuleResolver::new(engine, source)?);
        let fetcher = fetcher_from_config(&config.payload.source)?;

        let mut bootstrapper = Self::new(Arc::clone(&resolver), fetcher)
            .with_resource(config.payload.resource)
            .with_spawn_order(config.worker.spawn_order)
            .with_thread_name(&config.worker.thread_name)
            .with_stack_trace_limit(config.diagnostics.stack_trace_limit);

        if config.worker.enabled {
            bootstrapper = bootstrapper.with_worker(resolver);
        }

        debug!(
            module = %config.module.path,
            resource = %config.payload.resource,
            worker = config.worker.enabled,
            "Bootstrapper configured"
        );

        Ok(bootstrapper)
    }

    /// Enable the worker; it resolves its module through `resolver`.
    #[must_use]
    pub fn with_worker(mut self, resolver: Arc<dyn ModuleResolver>) -> Self {
        self.worker_resolver = Some(resolver);
        self
    }

    /// Set the payload resource.
    #[must_use]
    pub fn with_resource(mut self, resource: PayloadResource) -> Self {
        self.resource = resource;
        self
    }

    /// Set when the worker is spawned relative to the fetch.
    #[must_use]
    pub fn with_spawn_order(mut self, order: SpawnOrder) -> Self {
        self.spawn_order = order;
        self
    }

    /// Set the worker's OS thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the stack-trace limit raised at the start of [`run`](Self::run).
    #[must_use]
    pub fn with_stack_trace_limit(mut self, limit: usize) -> Self {
        self.stack_trace_limit = limit;
        self
    }

    /// Resolve the main context's module, or return the memoized handle.
    pub async fn load_module(&self) -> Result<ModuleHandle, BootError> {
        self.loader.load_module().await
    }

    /// Readiness of the main context's module.
    pub fn module_state(&self) -> ModuleState {
        self.loader.state()
    }

    /// Fetch a named payload. The bytes are not transformed.
    pub async fn fetch_payload(&self, resource: &str) -> Result<BinaryPayload, BootError> {
        self.fetcher.fetch(resource).await
    }

    /// Run the bootstrap sequence.
    ///
    /// Consumes the bootstrapper, so `entry` runs at most once.
    ///
    /// # Errors
    ///
    /// Returns the first `ModuleLoad`, `WorkerSpawn`, `Fetch` or `Entry`
    /// failure. `entry` is never called if the fetch failed.
    pub async fn run(self) -> Result<Session, BootError> {
        let session_id = Uuid::new_v4();
        let span = info_span!("boot", %session_id);
        self.run_sequence().instrument(span).await
    }

    async fn run_sequence(self) -> Result<Session, BootError> {
        let start = Instant::now();
        raise_stack_trace_limit(self.stack_trace_limit);

        let module = self.load_module().await?;

        let mut worker = None;
        if self.spawn_order == SpawnOrder::BeforeFetch {
            worker = self.spawn_worker()?;
        }

        let payload = self.fetch_payload(self.resource.path()).await?;

        if self.spawn_order == SpawnOrder::AfterFetch {
            worker = self.spawn_worker()?;
        }

        call_entry(&module, payload, worker.as_ref().map(WorkerThread::handle)).await?;

        let replies = worker
            .as_ref()
            .map(|worker| spawn_reply_pump(Arc::clone(&module), worker.handle().clone()));

        info!(
            worker = worker.is_some(),
            duration_ms = start.elapsed().as_millis(),
            "Bootstrap complete"
        );

        Ok(Session {
            module,
            worker,
            replies,
        })
    }

    fn spawn_worker(&self) -> Result<Option<WorkerThread>, BootError> {
        self.worker_resolver
            .as_ref()
            .map(|resolver| {
                WorkerThread::spawn(
                    Arc::clone(resolver),
                    &self.thread_name,
                    self.stack_trace_limit,
                )
            })
            .transpose()
    }
}

#[instrument(skip_all, fields(resource = %payload.resource(), bytes_len = payload.len()))]
async fn call_entry(
    module: &ModuleHandle,
    payload: BinaryPayload,
    worker: Option<&WorkerHandle>,
) -> Result<(), BootError> {
    debug!(with_worker = worker.is_some(), "Invoking module entry");
    module
        .entry(payload, worker.cloned())
        .await
        .map_err(BootError::into_entry)
}

/// Deliver worker replies to the main module, in arrival order, until the
/// reply channel closes or the task is aborted.
fn spawn_reply_pump(module: ModuleHandle, worker: WorkerHandle) -> JoinHandle<()> {
    let task = async move {
        let mut delivered: u64 = 0;
        while let Some(data) = worker.recv().await {
            let bytes_len = data.len();
            match module.on_reply(data).await {
                Ok(()) => delivered += 1,
                Err(e) => error!(kind = e.kind(), bytes_len, error = %e, "Reply handler failed"),
            }
        }
        debug!(delivered, "Reply channel closed");
    };
    tokio::spawn(task.instrument(Span::current()))
}

impl std::fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("loader", &self.loader)
            .field("resource", &self.resource)
            .field("worker", &self.worker_resolver.is_some())
            .field("spawn_order", &self.spawn_order)
            .finish_non_exhaustive()
    }
}

/// A successfully started session.
///
/// Holds the main context's module, the worker and the task that feeds
/// worker replies to the module, for as long as the session lives.
pub struct Session {
    module: ModuleHandle,
    worker: Option<WorkerThread>,
    replies: Option<JoinHandle<()>>,
}

impl Session {
    /// The main context's module.
    pub fn module(&self) -> &ModuleHandle {
        &self.module
    }

    /// Handle to the worker, if one was started.
    pub fn worker(&self) -> Option<&WorkerHandle> {
        self.worker.as_ref().map(WorkerThread::handle)
    }

    /// Stop the worker after its queued messages and wait for it, then stop
    /// reply delivery. Replies not yet delivered at that point are dropped.
    pub async fn shutdown(mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown().await;
        }
        if let Some(replies) = self.replies.take() {
            replies.abort();
            // Cancelled is the expected outcome.
            let _ = replies.await;
        }
        info!("Session ended");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(replies) = self.replies.take() {
            replies.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("worker", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}
