//! Background worker.
//!
//! [`WorkerProxy`] bridges inbound messages to the module's worker entry
//! point. It resolves its own module instance on the first message and
//! reuses it for every later one.
//!
//! [`WorkerThread`] runs a proxy on a dedicated OS thread with its own
//! single-threaded Tokio runtime, so the worker's guest never shares an
//! executor (or a module handle) with the main context.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{Instrument, debug, error, info, info_span, warn};

use wasm_boot_common::BootError;
use wasm_boot_core::diagnostics::raise_stack_trace_limit;
use wasm_boot_core::{
    AppModule, Envelope, ExecutionContext, ModuleLoader, ModuleResolver, ModuleState,
    WorkerHandle, WorkerMessage,
};

/// Forwards worker messages to a lazily resolved module.
#[derive(Debug)]
pub struct WorkerProxy {
    loader: ModuleLoader,
    dispatched: AtomicU64,
}

impl WorkerProxy {
    /// Create a proxy. Nothing is resolved until the first message.
    pub fn new(resolver: Arc<dyn ModuleResolver>) -> Self {
        Self {
            loader: ModuleLoader::new(ExecutionContext::Worker, resolver),
            dispatched: AtomicU64::new(0),
        }
    }

    /// Handle one inbound message.
    ///
    /// The first call resolves the module; concurrent callers wait on that
    /// same resolution. The message is then forwarded unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ModuleLoad` if the module could not be resolved (now or on
    /// an earlier message), or `WorkerDispatch` if the module's handler
    /// failed.
    pub async fn on_message(&self, message: WorkerMessage) -> Result<(), BootError> {
        let module = self.loader.load_module().await?;

        let sequence = self.dispatched.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(sequence, bytes_len = message.data().len(), "Dispatching worker message");

        module
            .worker(message)
            .await
            .map_err(BootError::into_worker_dispatch)
    }

    /// Drain `inbox` in arrival order until terminated or disconnected.
    ///
    /// A failed message is reported and the loop moves on to the next one.
    pub async fn run(self, mut inbox: UnboundedReceiver<Envelope>) {
        info!("Worker loop started");

        while let Some(envelope) = inbox.recv().await {
            match envelope {
                Envelope::Message(message) => {
                    if let Err(e) = self.on_message(message).await {
                        error!(kind = e.kind(), error = %e, "Worker message failed");
                    }
                }
                Envelope::Terminate => {
                    debug!("Worker terminate requested");
                    break;
                }
            }
        }

        info!(dispatched = self.dispatched(), "Worker loop stopped");
    }

    /// Readiness of the worker's module.
    pub fn state(&self) -> ModuleState {
        self.loader.state()
    }

    /// How many times the worker's module has been resolved (0 or 1).
    pub fn resolutions(&self) -> usize {
        self.loader.resolutions()
    }

    /// Messages forwarded to the module so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::SeqCst)
    }
}

/// A [`WorkerProxy`] running on its own thread.
///
/// Dropping it asks the loop to stop but does not wait; use
/// [`WorkerThread::shutdown`] to wait for the thread.
#[derive(Debug)]
pub struct WorkerThread {
    handle: WorkerHandle,
    join: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Start a worker thread.
    ///
    /// Returns as soon as the thread is running. The worker's module is not
    /// resolved until the first message arrives.
    ///
    /// # Errors
    ///
    /// Returns `WorkerSpawn` if the runtime or the thread cannot be created.
    pub fn spawn(
        resolver: Arc<dyn ModuleResolver>,
        thread_name: &str,
        stack_trace_limit: usize,
    ) -> Result<Self, BootError> {
        let (handle, inbox) = WorkerHandle::channel();
        let proxy = WorkerProxy::new(resolver);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BootError::worker_spawn_failed(format!("worker runtime: {e}")))?;

        let join = std::thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                raise_stack_trace_limit(stack_trace_limit);
                let span = info_span!("worker", context = %ExecutionContext::Worker);
                runtime.block_on(proxy.run(inbox).instrument(span));
            })
            .map_err(|e| BootError::worker_spawn_failed(format!("thread '{thread_name}': {e}")))?;

        info!(thread_name, "Worker thread spawned");

        Ok(Self {
            handle,
            join: Some(join),
        })
    }

    /// Handle for posting messages to this worker.
    pub fn handle(&self) -> &WorkerHandle {
        &self.handle
    }

    /// Stop the loop after the queued messages and wait for the thread.
    pub async fn shutdown(mut self) {
        self.handle.terminate();

        let Some(join) = self.join.take() else {
            return;
        };

        match tokio::task::spawn_blocking(move || join.join()).await {
            Ok(Ok(())) => debug!("Worker thread joined"),
            Ok(Err(_)) => error!("Worker thread panicked"),
            Err(e) => warn!(error = %e, "Failed to join worker thread"),
        }
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.handle.terminate();
        }
    }
}
