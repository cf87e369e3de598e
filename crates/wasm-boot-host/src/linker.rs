//! Host function registration for guest linkers.
//!
//! Guests import two functions from the `env` module:
//! - `env::log(level: i32, ptr: i32, len: i32)`
//! - `env::post_message(ptr: i32, len: i32) -> i32`
//!
//! Both read a byte range out of the guest's exported `memory`.

use tracing::{debug, warn};
use wasmtime::{Caller, Linker};

use wasm_boot_common::BootError;
use wasm_boot_core::WasmEngine;
use wasm_boot_core::store::GuestContext;

use crate::logging::{LoggingHost, level_from_i32};

/// `post_message` status: delivered.
pub const POST_OK: i32 = 0;

/// `post_message` status: no peer attached, peer gone, or bad memory range.
pub const POST_FAILED: i32 = -1;

/// Create a linker with every host function registered.
pub fn create_linker(engine: &WasmEngine) -> Result<Linker<GuestContext>, BootError> {
    let mut linker = Linker::new(engine.inner());
    register_all(&mut linker)?;
    Ok(linker)
}

/// Register all host functions on a linker.
pub fn register_all(linker: &mut Linker<GuestContext>) -> Result<(), BootError> {
    register_logging(linker)?;
    register_messaging(linker)?;
    Ok(())
}

/// Register `env::log(level: i32, ptr: i32, len: i32)`.
///
/// `level` is 0=debug, 1=info, 2=warn, 3=error. The message is UTF-8.
pub fn register_logging(linker: &mut Linker<GuestContext>) -> Result<(), BootError> {
    linker
        .func_wrap(
            "env",
            "log",
            |mut caller: Caller<'_, GuestContext>, level: i32, ptr: i32, len: i32| {
                let Some(bytes) = read_guest_bytes(&mut caller, ptr, len) else {
                    return;
                };

                let message = String::from_utf8_lossy(&bytes);
                LoggingHost::log(caller.data_mut(), level_from_i32(level), &message);
            },
        )
        .map_err(|e| BootError::invalid_config(format!("Failed to register log function: {e}")))?;

    Ok(())
}

/// Register `env::post_message(ptr: i32, len: i32) -> i32`.
///
/// Delivers the bytes to the instance's current [`Peer`](wasm_boot_core::Peer):
/// the worker on the main context, the sender on the worker context.
/// Returns [`POST_OK`] or [`POST_FAILED`].
pub fn register_messaging(linker: &mut Linker<GuestContext>) -> Result<(), BootError> {
    linker
        .func_wrap(
            "env",
            "post_message",
            |mut caller: Caller<'_, GuestContext>, ptr: i32, len: i32| -> i32 {
                let Some(bytes) = read_guest_bytes(&mut caller, ptr, len) else {
                    return POST_FAILED;
                };

                let ctx = caller.data();
                let Some(peer) = ctx.peer.as_ref() else {
                    debug!(context = %ctx.context, "post_message with no peer attached");
                    return POST_FAILED;
                };

                match peer.post(bytes) {
                    Ok(()) => POST_OK,
                    Err(e) => {
                        warn!(context = %ctx.context, error = %e, "post_message failed");
                        POST_FAILED
                    }
                }
            },
        )
        .map_err(|e| {
            BootError::invalid_config(format!("Failed to register post_message function: {e}"))
        })?;

    Ok(())
}

/// Copy `len` bytes at `ptr` out of the guest's exported memory.
///
/// Returns `None` (after logging why) for negative or out-of-bounds ranges
/// and for guests without a `memory` export.
fn read_guest_bytes(caller: &mut Caller<'_, GuestContext>, ptr: i32, len: i32) -> Option<Vec<u8>> {
    let (Ok(start), Ok(len)) = (usize::try_from(ptr), usize::try_from(len)) else {
        warn!(ptr, len, "Invalid pointer or length (negative value)");
        return None;
    };

    let Some(memory) = caller
        .get_export("memory")
        .and_then(wasmtime::Extern::into_memory)
    else {
        warn!("Memory export not found in guest module");
        return None;
    };

    let data = memory.data(&*caller);
    let Some(end) = start.checked_add(len) else {
        warn!(start, len, "Pointer + length overflow");
        return None;
    };

    if end > data.len() {
        warn!(
            start,
            end,
            memory_size = data.len(),
            "Memory access out of bounds"
        );
        return None;
    }

    Some(data[start..end].to_vec())
}
