//! End-to-end tests with a real Wasm guest.
//!
//! The guest's `entry` forwards the payload to its worker; the worker-side
//! instance echoes every message back, and the main instance logs each
//! reply it receives. Main and worker each run their own instance of the
//! same module.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;

use wasm_boot_common::{BootConfig, BootError, EngineConfig, PayloadSource};
use wasm_boot_core::{
    CompiledModule, ExecutionContext, GuestContext, GuestModule, LogEntry, ModuleHandle,
    ModuleResolver, WasmEngine,
};
use wasm_boot_host::{DirectoryFetcher, ModuleSource, WasmModuleResolver, create_linker};
use wasm_boot_runtime::Bootstrapper;

const FORWARD_WAT: &str = r#"
    (module
        (import "env" "log" (func $log (param i32 i32 i32)))
        (import "env" "post_message" (func $post (param i32 i32) (result i32)))
        (memory (export "memory") 1)
        (global $next (mut i32) (i32.const 1024))
        (func (export "alloc") (param $len i32) (result i32)
            (local $ptr i32)
            (local.set $ptr (global.get $next))
            (global.set $next (i32.add (global.get $next) (local.get $len)))
            (local.get $ptr))
        (func (export "entry") (param $ptr i32) (param $len i32)
            (if (i32.ne (call $post (local.get $ptr) (local.get $len)) (i32.const 0))
                (then unreachable)))
        (func (export "worker") (param $ptr i32) (param $len i32)
            (drop (call $post (local.get $ptr) (local.get $len))))
        (func (export "on_reply") (param $ptr i32) (param $len i32)
            (call $log (i32.const 1) (local.get $ptr) (local.get $len))))
"#;

/// Instantiates the guest per context and keeps the main instance so its
/// logs can be read back.
struct KeepMain {
    engine: WasmEngine,
    linker: wasmtime::Linker<GuestContext>,
    module: CompiledModule,
    main: Mutex<Option<Arc<GuestModule>>>,
}

impl KeepMain {
    fn new() -> Arc<Self> {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let linker = create_linker(&engine).unwrap();
        let module = CompiledModule::from_wat(engine.inner(), FORWARD_WAT).unwrap();
        Arc::new(Self {
            engine,
            linker,
            module,
            main: Mutex::new(None),
        })
    }

    async fn main_logs(&self) -> Vec<LogEntry> {
        let main = self.main.lock().unwrap().clone();
        match main {
            Some(guest) => guest.logs().await,
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl ModuleResolver for KeepMain {
    async fn resolve(&self, context: ExecutionContext) -> Result<ModuleHandle, BootError> {
        let guest = Arc::new(
            GuestModule::instantiate(&self.engine, &self.linker, &self.module, context).await?,
        );
        if context == ExecutionContext::Main {
            *self.main.lock().unwrap() = Some(Arc::clone(&guest));
        }
        let handle: ModuleHandle = guest;
        Ok(handle)
    }
}

fn resolver() -> Arc<WasmModuleResolver> {
    let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
    Arc::new(WasmModuleResolver::new(engine, ModuleSource::Wat(FORWARD_WAT.into())).unwrap())
}

fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("wasm-boot-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[tokio::test]
async fn test_payload_round_trips_through_worker() {
    let assets = scratch_dir("assets");
    fs::write(assets.join("terms"), b"hello from the main context")
        .await
        .unwrap();

    let resolver = KeepMain::new();
    let session = Bootstrapper::new(resolver.clone(), Arc::new(DirectoryFetcher::new(&assets)))
        .with_worker(resolver.clone())
        .run()
        .await
        .unwrap();

    // main entry -> worker echo -> main on_reply, which logs the bytes.
    let logs = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let logs = resolver.main_logs().await;
            if !logs.is_empty() {
                return logs;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reply never reached the main module");

    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].message, "hello from the main context");

    // Each further message comes back exactly once.
    let handle = session.worker().unwrap().clone();
    handle.post_message(b"again".to_vec()).unwrap();
    let logs = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let logs = resolver.main_logs().await;
            if logs.len() >= 2 {
                return logs;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("second reply never reached the main module");
    assert_eq!(logs[1].message, "again");

    session.shutdown().await;
}

#[tokio::test]
async fn test_guest_without_worker_fails_entry() {
    let assets = scratch_dir("no-worker");
    fs::write(assets.join("terms"), [1u8, 2, 3]).await.unwrap();

    let result = Bootstrapper::new(resolver(), Arc::new(DirectoryFetcher::new(&assets)))
        .run()
        .await;

    match result {
        Err(BootError::Entry { reason }) => assert!(reason.contains("wasm trap")),
        other => panic!("expected an entry failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_from_config_runs_module_file() {
    let dir = scratch_dir("config");
    let wasm = wat_to_file(&dir);
    fs::write(dir.join("term"), b"payload").await.unwrap();

    let config = BootConfig::from_toml(&format!(
        r#"
        [module]
        path = "{}"

        [payload]
        resource = "term"
        [payload.source]
        kind = "directory"
        root = "{}"

        [worker]
        enabled = true
        spawn_order = "after_fetch"
        "#,
        wasm.display(),
        dir.display()
    ))
    .unwrap();
    assert_eq!(
        config.payload.source,
        PayloadSource::Directory {
            root: dir.display().to_string()
        }
    );

    // `entry` traps unless the payload was posted to a live worker.
    let session = Bootstrapper::from_config(&config)
        .unwrap()
        .run()
        .await
        .unwrap();

    let handle = session.worker().unwrap().clone();
    tokio::time::timeout(Duration::from_secs(5), session.shutdown())
        .await
        .expect("worker did not stop");
    assert!(handle.is_closed());
}

fn wat_to_file(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("app.wat");
    std::fs::write(&path, FORWARD_WAT).unwrap();
    path
}
