//! Failure report rendering for guest errors.
//!
//! Guest traps carry a Wasm backtrace. How many of its frames end up in a
//! report is bounded by a process-wide stack-trace limit, which bootstrap
//! and the worker raise once at startup.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};

use wasmtime::{Trap, WasmBacktrace};

/// Frames rendered before anything raises the limit.
pub const DEFAULT_STACK_TRACE_LIMIT: usize = 10;

static STACK_TRACE_LIMIT: AtomicUsize = AtomicUsize::new(DEFAULT_STACK_TRACE_LIMIT);

/// Raise the stack-trace limit to at least `limit`.
///
/// The limit never goes down; `0` is a no-op.
pub fn raise_stack_trace_limit(limit: usize) {
    STACK_TRACE_LIMIT.fetch_max(limit, Ordering::Relaxed);
}

/// Current stack-trace limit.
pub fn stack_trace_limit() -> usize {
    STACK_TRACE_LIMIT.load(Ordering::Relaxed)
}

/// Render a guest call failure: the trap (or root cause) followed by up to
/// [`stack_trace_limit`] backtrace frames.
pub fn render_guest_error(error: &wasmtime::Error) -> String {
    let mut rendered = match error.downcast_ref::<Trap>() {
        Some(trap) => {
            let message = trap.to_string();
            if message.starts_with("wasm trap") {
                message
            } else {
                format!("wasm trap: {message}")
            }
        }
        None => error.root_cause().to_string(),
    };

    if let Some(backtrace) = error.downcast_ref::<WasmBacktrace>() {
        let limit = stack_trace_limit();
        let frames = backtrace.frames();

        for (index, frame) in frames.iter().take(limit).enumerate() {
            let name = frame.func_name().unwrap_or("<unnamed>");
            let _ = write!(rendered, "\n  {index}: {name} (func #{})", frame.func_index());
        }

        if frames.len() > limit {
            let _ = write!(rendered, "\n  ... {} more frames", frames.len() - limit);
        }
    }

    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_only_rises() {
        raise_stack_trace_limit(DEFAULT_STACK_TRACE_LIMIT + 5);
        let raised = stack_trace_limit();
        assert!(raised >= DEFAULT_STACK_TRACE_LIMIT + 5);

        raise_stack_trace_limit(1);
        assert!(stack_trace_limit() >= raised);

        raise_stack_trace_limit(0);
        assert!(stack_trace_limit() >= raised);
    }

    #[test]
    fn test_render_plain_error() {
        let error = wasmtime::Error::msg("missing export `alloc`");
        assert_eq!(render_guest_error(&error), "missing export `alloc`");
    }

    #[test]
    fn test_render_trap() {
        let error = wasmtime::Error::new(Trap::UnreachableCodeReached);
        let rendered = render_guest_error(&error);
        assert!(rendered.starts_with("wasm trap: "));
        assert!(rendered.contains("unreachable"));
    }
}
