//! Common types, errors, and configuration for wasm-boot.
//!
//! This crate provides shared functionality used across the wasm-boot workspace:
//! - [`BootError`]: the failure taxonomy of a bootstrap attempt
//! - [`BootConfig`]: the full configuration, loadable from TOML
//! - Section structs for the engine, module, payload, worker and diagnostics

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{
    DiagnosticsConfig, EngineConfig, ModuleConfig, PayloadConfig, PayloadResource, PayloadSource,
    SpawnOrder, WorkerConfig,
};
pub use config_file::{BootConfig, ConfigFileError};
pub use error::BootError;
