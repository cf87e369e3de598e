//! Guest instances exposed as application modules.
//!
//! [`GuestModule`] instantiates a [`CompiledModule`] in its own store and
//! drives it through a small ABI:
//!
//! | export | signature | role |
//! |--------|-----------|------|
//! | `memory` | memory | guest linear memory |
//! | `alloc` | `(len: i32) -> i32` | reserve `len` bytes, return the offset |
//! | `entry` | `(ptr: i32, len: i32)` | start the app with the payload |
//! | `worker` | `(ptr: i32, len: i32)` | handle one worker message (optional) |
//! | `on_reply` | `(ptr: i32, len: i32)` | receive one worker reply on main (optional) |
//!
//! Input bytes are copied into guest memory at the offset returned by
//! `alloc` before `entry`, `worker` or `on_reply` runs.

use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};
use wasmtime::{Instance, Linker, Memory, Store, TypedFunc};

use wasm_boot_common::BootError;

use crate::capability::{AppModule, BinaryPayload, ExecutionContext};
use crate::channel::{WorkerHandle, WorkerMessage};
use crate::diagnostics::render_guest_error;
use crate::store::{GuestContext, LogEntry, Peer, create_store};
use crate::{CompiledModule, WasmEngine};

/// A live guest instance bound to one execution context.
///
/// Calls are serialized: the store is behind an async mutex, so concurrent
/// callers queue instead of re-entering the guest.
pub struct GuestModule {
    context: ExecutionContext,
    state: Mutex<GuestState>,
}

struct GuestState {
    store: Store<GuestContext>,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    entry: Option<TypedFunc<(i32, i32), ()>>,
    worker: Option<TypedFunc<(i32, i32), ()>>,
    on_reply: Option<TypedFunc<(i32, i32), ()>>,
}

impl GuestModule {
    /// Instantiate `module` for `context` using host functions from `linker`.
    ///
    /// # Errors
    ///
    /// Returns a `ModuleLoad` error if instantiation fails or a required
    /// export (`memory`, `alloc`) is missing or mistyped.
    #[instrument(skip_all, fields(context = %context))]
    pub async fn instantiate(
        engine: &WasmEngine,
        linker: &Linker<GuestContext>,
        module: &CompiledModule,
        context: ExecutionContext,
    ) -> Result<Self, BootError> {
        let start = Instant::now();
        let mut store = create_store(engine, context);

        debug!("Instantiating guest module");

        let instance = linker
            .instantiate_async(&mut store, module.inner())
            .await
            .map_err(|e| {
                BootError::module_load_failed(format!(
                    "Instantiation failed: {}",
                    render_guest_error(&e)
                ))
            })?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| BootError::module_load_failed("Export 'memory' not found"))?;

        let alloc = instance
            .get_typed_func::<i32, i32>(&mut store, "alloc")
            .map_err(|e| BootError::module_load_failed(format!("Export 'alloc': {e}")))?;

        let entry = optional_export(&instance, &mut store, "entry")?;
        let worker = optional_export(&instance, &mut store, "worker")?;
        let on_reply = optional_export(&instance, &mut store, "on_reply")?;

        info!(
            content_hash = %module.content_hash(),
            has_entry = entry.is_some(),
            has_worker = worker.is_some(),
            has_on_reply = on_reply.is_some(),
            duration_ms = start.elapsed().as_millis(),
            "Guest module instantiated"
        );

        Ok(Self {
            context,
            state: Mutex::new(GuestState {
                store,
                memory,
                alloc,
                entry,
                worker,
                on_reply,
            }),
        })
    }

    /// The context this instance belongs to.
    pub fn context(&self) -> ExecutionContext {
        self.context
    }

    /// Snapshot of the most recent logs the guest has emitted.
    pub async fn logs(&self) -> Vec<LogEntry> {
        self.state.lock().await.store.data().logs.iter().cloned().collect()
    }
}

impl GuestState {
    /// Copy `bytes` into guest memory and call `func(ptr, len)`.
    async fn call_with_bytes(
        &mut self,
        func: TypedFunc<(i32, i32), ()>,
        bytes: &[u8],
    ) -> Result<(), wasmtime::Error> {
        let len = i32::try_from(bytes.len())
            .map_err(|_| wasmtime::Error::msg(format!("input of {} bytes is too large", bytes.len())))?;

        let ptr = self.alloc.call_async(&mut self.store, len).await?;
        let offset = usize::try_from(ptr)
            .map_err(|_| wasmtime::Error::msg(format!("alloc returned negative offset {ptr}")))?;

        self.memory.write(&mut self.store, offset, bytes)?;

        func.call_async(&mut self.store, (ptr, len)).await
    }
}

#[async_trait]
impl AppModule for GuestModule {
    async fn entry(
        &self,
        payload: BinaryPayload,
        worker: Option<WorkerHandle>,
    ) -> Result<(), BootError> {
        let mut state = self.state.lock().await;
        let func = state
            .entry
            .clone()
            .ok_or_else(|| BootError::entry_failed("Export 'entry' not found"))?;

        // The worker handle stays attached for the instance's lifetime.
        state.store.data_mut().peer = worker.map(Peer::Worker);

        debug!(
            context = %self.context,
            resource = %payload.resource(),
            bytes_len = payload.len(),
            "Calling guest entry"
        );

        state
            .call_with_bytes(func, payload.bytes())
            .await
            .map_err(|e| {
                let reason = render_guest_error(&e);
                error!(context = %self.context, reason = %reason, "Guest entry failed");
                BootError::entry_failed(reason)
            })
    }

    async fn worker(&self, message: WorkerMessage) -> Result<(), BootError> {
        let mut state = self.state.lock().await;
        let func = state
            .worker
            .clone()
            .ok_or_else(|| BootError::worker_dispatch_failed("Export 'worker' not found"))?;

        state.store.data_mut().peer = Some(Peer::Reply(message.reply_port().clone()));

        let result = state.call_with_bytes(func, message.data()).await;
        state.store.data_mut().peer = None;

        result.map_err(|e| BootError::worker_dispatch_failed(render_guest_error(&e)))
    }

    async fn on_reply(&self, data: Vec<u8>) -> Result<(), BootError> {
        let mut state = self.state.lock().await;
        let Some(func) = state.on_reply.clone() else {
            debug!(
                context = %self.context,
                bytes_len = data.len(),
                "Reply dropped: no 'on_reply' export"
            );
            return Ok(());
        };

        state.call_with_bytes(func, &data).await.map_err(|e| {
            BootError::entry_failed(format!("on_reply: {}", render_guest_error(&e)))
        })
    }
}

impl std::fmt::Debug for GuestModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestModule")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Look up an optional `(i32, i32) -> ()` export.
///
/// Absent is fine; present with the wrong signature is a load failure.
fn optional_export(
    instance: &Instance,
    store: &mut Store<GuestContext>,
    name: &str,
) -> Result<Option<TypedFunc<(i32, i32), ()>>, BootError> {
    let Some(func) = instance.get_func(&mut *store, name) else {
        return Ok(None);
    };

    func.typed::<(i32, i32), ()>(&*store)
        .map(Some)
        .map_err(|e| BootError::module_load_failed(format!("Export '{name}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_boot_common::EngineConfig;

    const RECORDER_WAT: &str = r#"
        (module
            (memory (export "memory") 1)
            (global $next (mut i32) (i32.const 1024))
            (global $seen (export "seen") (mut i32) (i32.const -1))
            (func (export "alloc") (param $len i32) (result i32)
                (local $ptr i32)
                (local.set $ptr (global.get $next))
                (global.set $next (i32.add (global.get $next) (local.get $len)))
                (local.get $ptr))
            (func (export "entry") (param $ptr i32) (param $len i32)
                (global.set $seen (local.get $len))))
    "#;

    fn setup(wat: &str) -> (WasmEngine, Linker<GuestContext>, CompiledModule) {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let linker = Linker::new(engine.inner());
        let module = CompiledModule::from_wat(engine.inner(), wat).unwrap();
        (engine, linker, module)
    }

    #[tokio::test]
    async fn test_instantiate_reports_exports() {
        let (engine, linker, module) = setup(RECORDER_WAT);
        let guest = GuestModule::instantiate(&engine, &linker, &module, ExecutionContext::Main)
            .await
            .unwrap();

        assert_eq!(guest.context(), ExecutionContext::Main);
        assert!(guest.logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_entry_runs() {
        let (engine, linker, module) = setup(RECORDER_WAT);
        let guest = GuestModule::instantiate(&engine, &linker, &module, ExecutionContext::Main)
            .await
            .unwrap();

        let result = guest
            .entry(BinaryPayload::new("/terms", vec![1, 2, 3]), None)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_worker_export() {
        let (engine, linker, module) = setup(RECORDER_WAT);
        let guest = GuestModule::instantiate(&engine, &linker, &module, ExecutionContext::Worker)
            .await
            .unwrap();

        let (handle, mut inbox) = WorkerHandle::channel();
        handle.post_message(vec![7]).unwrap();
        let Some(crate::Envelope::Message(message)) = inbox.recv().await else {
            panic!("expected a message");
        };

        let result = guest.worker(message).await;
        assert!(matches!(result, Err(BootError::WorkerDispatch { .. })));
    }

    #[tokio::test]
    async fn test_reply_without_export_is_dropped() {
        let (engine, linker, module) = setup(RECORDER_WAT);
        let guest = GuestModule::instantiate(&engine, &linker, &module, ExecutionContext::Main)
            .await
            .unwrap();

        assert!(guest.on_reply(vec![1, 2]).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_alloc_is_load_failure() {
        let (engine, linker, module) = setup(r#"(module (memory (export "memory") 1))"#);
        let result =
            GuestModule::instantiate(&engine, &linker, &module, ExecutionContext::Main).await;
        assert!(matches!(result, Err(BootError::ModuleLoad { .. })));
    }

    #[tokio::test]
    async fn test_mistyped_entry_is_load_failure() {
        let wat = r#"
            (module
                (memory (export "memory") 1)
                (func (export "alloc") (param i32) (result i32) (i32.const 0))
                (func (export "entry")))
        "#;
        let (engine, linker, module) = setup(wat);
        let result =
            GuestModule::instantiate(&engine, &linker, &module, ExecutionContext::Main).await;
        assert!(matches!(result, Err(BootError::ModuleLoad { .. })));
    }

    #[tokio::test]
    async fn test_trapping_entry_is_entry_failure() {
        let wat = r#"
            (module
                (memory (export "memory") 1)
                (func (export "alloc") (param i32) (result i32) (i32.const 0))
                (func (export "entry") (param i32 i32) unreachable))
        "#;
        let (engine, linker, module) = setup(wat);
        let guest = GuestModule::instantiate(&engine, &linker, &module, ExecutionContext::Main)
            .await
            .unwrap();

        let result = guest.entry(BinaryPayload::new("/terms", vec![0xAA]), None).await;
        match result {
            Err(BootError::Entry { reason }) => assert!(reason.contains("wasm trap")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
