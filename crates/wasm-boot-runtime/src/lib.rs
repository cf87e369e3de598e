//! Bootstrap sequence and background worker for wasm-boot.
//!
//! # Example
//!
//! ```ignore
//! use wasm_boot_common::BootConfig;
//! use wasm_boot_runtime::Bootstrapper;
//!
//! let config = BootConfig::from_file("wasm-boot.toml")?;
//! let session = Bootstrapper::from_config(&config)?.run().await?;
//!
//! // ... until shutdown
//! session.shutdown().await;
//! ```

pub mod bootstrap;
pub mod report;
pub mod worker;

pub use bootstrap::{Bootstrapper, Session};
pub use report::report_failure;
pub use worker::{WorkerProxy, WorkerThread};
