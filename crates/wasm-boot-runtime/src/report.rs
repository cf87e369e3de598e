//! Top-level failure reporting.
//!
//! Failures that end a bootstrap attempt are surfaced here instead of being
//! dropped. The report goes through `tracing`, so it lands wherever the
//! subscriber sends it.

use tracing::error;

use wasm_boot_common::BootError;

/// Report a failed bootstrap attempt.
///
/// Guest traps carry their rendered backtrace in the message.
pub fn report_failure(err: &BootError) {
    error!(
        kind = err.kind(),
        fatal = err.is_fatal_to_boot(),
        "Bootstrap failed: {err}"
    );
}
