//! Host side of wasm-boot.
//!
//! This crate provides everything a guest module needs from its host:
//!
//! - [`linker`]: Host functions imported by guests (`env::log`, `env::post_message`)
//! - [`logging`]: Guest log capture and re-emission through `tracing`
//! - [`fetch`]: Payload fetchers (HTTP and local directory)
//! - [`resolver`]: Module resolution that compiles and instantiates a guest per context

pub mod fetch;
pub mod linker;
pub mod logging;
pub mod resolver;

pub use fetch::{DirectoryFetcher, HttpFetcher, PayloadFetcher, fetcher_from_config};
pub use linker::create_linker;
pub use logging::LoggingHost;
pub use resolver::{ModuleSource, WasmModuleResolver};
