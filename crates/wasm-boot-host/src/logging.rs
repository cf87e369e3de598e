//! Guest logging.
//!
//! Guest log lines are both stored in the instance's [`GuestContext`] and
//! re-emitted through `tracing`, tagged with the execution context they
//! came from.

use tracing::{debug, error, info, warn};
use wasm_boot_core::store::{GuestContext, LogLevel};

/// Host implementation of `env::log`.
pub struct LoggingHost;

impl LoggingHost {
    /// Record a guest log line at the specified level.
    pub fn log(ctx: &mut GuestContext, level: LogLevel, message: &str) {
        ctx.log(level, message.to_string());

        let context = ctx.context.as_str();
        match level {
            LogLevel::Debug => debug!(context, guest_log = true, "{}", message),
            LogLevel::Info => info!(context, guest_log = true, "{}", message),
            LogLevel::Warn => warn!(context, guest_log = true, "{}", message),
            LogLevel::Error => error!(context, guest_log = true, "{}", message),
        }
    }
}

/// Convert a numeric log level to [`LogLevel`].
///
/// 0=debug, 1=info, 2=warn, 3=error; anything else is treated as info.
pub fn level_from_i32(level: i32) -> LogLevel {
    match level {
        0 => LogLevel::Debug,
        2 => LogLevel::Warn,
        3 => LogLevel::Error,
        _ => LogLevel::Info,
    }
}
