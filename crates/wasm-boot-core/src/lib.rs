//! Core module loading for wasm-boot.
//!
//! This crate provides the pieces every execution context needs:
//! - [`WasmEngine`]: Configured Wasmtime engine
//! - [`CompiledModule`]: Compiled WebAssembly module wrapper
//! - [`GuestModule`]: A live guest instance exposed as an [`AppModule`]
//! - [`ModuleLoader`]: Lazy, exactly-once module resolution per context
//! - [`WorkerHandle`] and [`WorkerMessage`]: The main/worker message channel
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐      ┌──────────────────────────────┐
//! │        main context          │      │       worker context         │
//! │  ModuleLoader ─► GuestModule │      │  ModuleLoader ─► GuestModule │
//! │        (own instance)        │      │        (own instance)        │
//! └──────────────┬───────────────┘      └───────────────▲──────────────┘
//!                │ WorkerHandle::post_message            │
//!                └──────────── Envelope ────────────────►┘
//!                ◄──────────── ReplyPort ────────────────
//! ```
//!
//! The two contexts never share a module handle; each resolves its own.

pub mod capability;
pub mod channel;
pub mod diagnostics;
pub mod engine;
pub mod instance;
pub mod loader;
pub mod module;
pub mod store;

pub use capability::{AppModule, BinaryPayload, ExecutionContext, ModuleHandle, ModuleResolver};
pub use channel::{Envelope, ReplyPort, WorkerHandle, WorkerMessage};
pub use engine::WasmEngine;
pub use instance::GuestModule;
pub use loader::{ModuleLoader, ModuleState};
pub use module::CompiledModule;
pub use store::{GuestContext, LogEntry, LogLevel, MAX_RETAINED_LOGS, Peer};
