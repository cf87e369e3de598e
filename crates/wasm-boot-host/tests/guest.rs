//! Integration tests for guest modules running with the host functions.
//!
//! These tests verify the guest ABI end to end:
//! - Payload bytes reach the guest unmodified
//! - `env::log` lines are captured per instance
//! - `env::post_message` reaches the worker from main, and the sender from the worker

use std::sync::Arc;
use std::time::Duration;

use wasm_boot_common::{BootError, EngineConfig};
use wasm_boot_core::{
    AppModule, BinaryPayload, CompiledModule, Envelope, ExecutionContext, GuestModule, LogLevel,
    ModuleResolver, WasmEngine, WorkerHandle,
};
use wasm_boot_host::{ModuleSource, WasmModuleResolver, create_linker};

/// Logs every input it receives and echoes it to its peer.
///
/// `entry` traps if the echo could not be delivered, so a missing worker
/// shows up as an entry failure.
const ECHO_WAT: &str = r#"
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
            (call $log (i32.const 1) (local.get $ptr) (local.get $len))
            (if (i32.ne (call $post (local.get $ptr) (local.get $len)) (i32.const 0))
                (then unreachable)))
        (func (export "worker") (param $ptr i32) (param $len i32)
            (call $log (i32.const 0) (local.get $ptr) (local.get $len))
            (drop (call $post (local.get $ptr) (local.get $len)))))
"#;

fn engine() -> WasmEngine {
    WasmEngine::new(&EngineConfig::default()).unwrap()
}

async fn instantiate(context: ExecutionContext) -> GuestModule {
    let engine = engine();
    let linker = create_linker(&engine).unwrap();
    let module = CompiledModule::from_wat(engine.inner(), ECHO_WAT).unwrap();
    GuestModule::instantiate(&engine, &linker, &module, context)
        .await
        .unwrap()
}

// ============================================================================
// Test: Entry with a worker
// ============================================================================

#[tokio::test]
async fn test_entry_posts_payload_to_worker() {
    let guest = instantiate(ExecutionContext::Main).await;
    let (handle, mut inbox) = WorkerHandle::channel();

    let payload: Vec<u8> = b"terms:\x00\x01\x02\xff".to_vec();
    guest
        .entry(BinaryPayload::new("/terms", payload.clone()), Some(handle))
        .await
        .unwrap();

    let Some(Envelope::Message(message)) = inbox.recv().await else {
        panic!("expected the payload to be posted to the worker");
    };
    assert_eq!(message.data(), payload.as_slice());
}

#[tokio::test]
async fn test_entry_logs_are_captured() {
    let guest = instantiate(ExecutionContext::Main).await;
    let (handle, _inbox) = WorkerHandle::channel();

    guest
        .entry(BinaryPayload::new("/terms", b"hello".to_vec()), Some(handle))
        .await
        .unwrap();

    let logs = guest.logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].level, LogLevel::Info);
    assert_eq!(logs[0].message, "hello");
}

// ============================================================================
// Test: Entry without a worker
// ============================================================================

#[tokio::test]
async fn test_post_without_worker_fails_entry() {
    let guest = instantiate(ExecutionContext::Main).await;

    let result = guest
        .entry(BinaryPayload::new("/terms", vec![1, 2, 3]), None)
        .await;

    assert!(matches!(result, Err(BootError::Entry { .. })));
}

// ============================================================================
// Test: Worker dispatch
// ============================================================================

#[tokio::test]
async fn test_worker_replies_to_sender() {
    let guest = instantiate(ExecutionContext::Worker).await;
    let (handle, mut inbox) = WorkerHandle::channel();

    handle.post_message(br#"{"data":7}"#.to_vec()).unwrap();
    let Some(Envelope::Message(message)) = inbox.recv().await else {
        panic!("expected a message");
    };

    guest.worker(message).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(1), handle.recv())
        .await
        .unwrap();
    assert_eq!(reply, Some(br#"{"data":7}"#.to_vec()));

    let logs = guest.logs().await;
    assert_eq!(logs[0].level, LogLevel::Debug);
    assert_eq!(logs[0].message, r#"{"data":7}"#);
}

// ============================================================================
// Test: Resolver
// ============================================================================

#[tokio::test]
async fn test_resolver_builds_working_guest() {
    let resolver =
        Arc::new(WasmModuleResolver::new(engine(), ModuleSource::Wat(ECHO_WAT.into())).unwrap());
    let module = resolver.resolve(ExecutionContext::Main).await.unwrap();

    let (handle, mut inbox) = WorkerHandle::channel();
    module
        .entry(BinaryPayload::new("/term", vec![0xAA]), Some(handle))
        .await
        .unwrap();

    assert!(matches!(inbox.recv().await, Some(Envelope::Message(_))));
}
