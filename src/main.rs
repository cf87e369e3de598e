//! wasm-boot CLI entry point.
//!
//! Loads the application module, fetches its startup payload, runs the
//! module's entry point and keeps the session (and its worker) alive until
//! Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use wasm_boot_common::BootConfig;
use wasm_boot_runtime::{Bootstrapper, report_failure};

/// Bootstrap a WebAssembly application with an optional background worker.
#[derive(Debug, Parser)]
#[command(name = "wasm-boot", version, about)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "WASM_BOOT_CONFIG")]
    config: Option<PathBuf>,

    /// Application module (overrides `module.path`).
    #[arg(short, long)]
    module: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        module = %config.module.path,
        resource = %config.payload.resource,
        worker = config.worker.enabled,
        "Starting wasm-boot"
    );

    let session = match Bootstrapper::from_config(&config) {
        Ok(bootstrapper) => bootstrapper.run().await,
        Err(e) => Err(e),
    };

    match session {
        Ok(session) => {
            info!("Application running; press Ctrl+C to stop");
            shutdown_signal().await;
            session.shutdown().await;
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,wasm_boot=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn load_config(args: &Args) -> anyhow::Result<BootConfig> {
    let mut config = match &args.config {
        Some(path) => BootConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => BootConfig::default(),
    };

    if let Some(module) = &args.module {
        config.module.path = module.display().to_string();
    }

    Ok(config)
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
