//! Per-instance guest state and store creation.
//!
//! This module provides:
//! - [`GuestContext`]: State reachable from host functions through [`wasmtime::Caller`]
//! - [`Peer`]: Where the guest's `post_message` calls are delivered
//! - [`LogEntry`] and [`LogLevel`]: Structured logging from guest code

use std::collections::VecDeque;
use std::time::Instant;

use wasmtime::Store;

use wasm_boot_common::BootError;

use crate::WasmEngine;
use crate::capability::ExecutionContext;
use crate::channel::{ReplyPort, WorkerHandle};

/// Guest log lines kept per instance; older lines are dropped first.
pub const MAX_RETAINED_LOGS: usize = 256;

/// Host-side state of one guest instance.
///
/// Lives as long as the instance, which lives as long as its execution context.
pub struct GuestContext {
    /// The context this instance belongs to.
    pub context: ExecutionContext,

    /// Most recent logs from guest code, at most [`MAX_RETAINED_LOGS`].
    pub logs: VecDeque<LogEntry>,

    /// Current target of the guest's outbound messages.
    pub peer: Option<Peer>,
}

/// Target of a guest's `post_message`.
///
/// On the main context this is the worker; on the worker it is the sender
/// of the message being handled.
#[derive(Debug, Clone)]
pub enum Peer {
    /// Post to the background worker.
    Worker(WorkerHandle),
    /// Reply to the main context.
    Reply(ReplyPort),
}

impl Peer {
    /// Deliver data to the peer.
    pub fn post(&self, data: Vec<u8>) -> Result<(), BootError> {
        match self {
            Peer::Worker(handle) => handle.post_message(data),
            Peer::Reply(port) => port.send(data),
        }
    }
}

/// A single log entry from guest code.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level (debug, info, warn, error).
    pub level: LogLevel,

    /// Log message content.
    pub message: String,

    /// Timestamp when the log was recorded.
    pub timestamp: Instant,
}

/// Log level for guest logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug-level messages.
    Debug,
    /// Informational messages.
    Info,
    /// Warning messages.
    Warn,
    /// Error messages.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl GuestContext {
    /// Create an empty context with no peer attached.
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            context,
            logs: VecDeque::new(),
            peer: None,
        }
    }

    /// Add a log entry, evicting the oldest one when full.
    pub fn log(&mut self, level: LogLevel, message: String) {
        if self.logs.len() == MAX_RETAINED_LOGS {
            self.logs.pop_front();
        }
        self.logs.push_back(LogEntry {
            level,
            message,
            timestamp: Instant::now(),
        });
    }
}

/// Create a new Wasmtime store for a guest running in `context`.
pub fn create_store(engine: &WasmEngine, context: ExecutionContext) -> Store<GuestContext> {
    Store::new(engine.inner(), GuestContext::new(context))
}
