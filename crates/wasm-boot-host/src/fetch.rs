//! Payload fetching.
//!
//! A [`PayloadFetcher`] turns a resource path such as `/terms` into raw
//! bytes. Any network error or non-success status is a `Fetch` failure;
//! nothing is retried and the body is passed through untouched.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use wasm_boot_common::{BootError, PayloadSource};
use wasm_boot_core::BinaryPayload;

/// Fetches a named binary resource.
#[async_trait]
pub trait PayloadFetcher: Send + Sync {
    /// Fetch `resource` (e.g. `/terms`).
    async fn fetch(&self, resource: &str) -> Result<BinaryPayload, BootError>;
}

/// Build the fetcher described by a payload source.
pub fn fetcher_from_config(source: &PayloadSource) -> Result<Arc<dyn PayloadFetcher>, BootError> {
    match source {
        PayloadSource::Http { base_url, .. } => {
            let fetcher = HttpFetcher::new(base_url, source.timeout())?;
            Ok(Arc::new(fetcher))
        }
        PayloadSource::Directory { root } => Ok(Arc::new(DirectoryFetcher::new(root))),
    }
}

/// Fetches resources over HTTP relative to a base URL.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    /// HTTP client (shared, connection pooled).
    client: Client,
    base_url: Url,
}

impl HttpFetcher {
    /// Create a fetcher for `base_url`.
    ///
    /// Without a `timeout` the request waits for as long as the server takes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the URL does not parse or the client
    /// cannot be built.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, BootError> {
        let mut builder =
            Client::builder().user_agent(concat!("wasm-boot/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| BootError::invalid_config(format!("Failed to create HTTP client: {e}")))?;

        Self::with_client(client, base_url)
    }

    /// Create with a custom HTTP client.
    pub fn with_client(client: Client, base_url: &str) -> Result<Self, BootError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BootError::invalid_config(format!("Invalid base URL '{base_url}': {e}")))?;

        if base_url.cannot_be_a_base() {
            return Err(BootError::invalid_config(format!(
                "Base URL '{base_url}' cannot have paths joined to it"
            )));
        }

        Ok(Self { client, base_url })
    }

    /// The URL `resource` resolves to.
    pub fn resolve(&self, resource: &str) -> Result<Url, BootError> {
        self.base_url
            .join(resource)
            .map_err(|e| BootError::fetch_failed(resource, format!("Invalid resource path: {e}")))
    }
}

#[async_trait]
impl PayloadFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, resource: &str) -> Result<BinaryPayload, BootError> {
        let url = self.resolve(resource)?;
        let start = Instant::now();

        debug!(url = %url, "Fetching payload");

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!("request timed out: {e}")
            } else if e.is_connect() {
                format!("connection failed: {e}")
            } else {
                e.to_string()
            };
            warn!(url = %url, reason = %reason, "Payload request failed");
            BootError::fetch_failed(resource, reason)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Payload request rejected");
            return Err(BootError::fetch_status(resource, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| BootError::fetch_failed(resource, format!("reading body: {e}")))?;

        info!(
            url = %url,
            status = status.as_u16(),
            body_size = body.len(),
            duration_ms = start.elapsed().as_millis(),
            "Payload fetched"
        );

        Ok(BinaryPayload::new(resource, body.to_vec()))
    }
}

/// Serves resources from a local asset directory.
#[derive(Debug, Clone)]
pub struct DirectoryFetcher {
    root: PathBuf,
}

impl DirectoryFetcher {
    /// Create a fetcher rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The file `resource` maps to.
    ///
    /// Only plain path segments are accepted, so a resource can never
    /// escape the root.
    pub fn resolve(&self, resource: &str) -> Result<PathBuf, BootError> {
        let relative = Path::new(resource.trim_start_matches('/'));

        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(BootError::fetch_failed(
                resource,
                "resource path must stay inside the asset directory",
            ));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl PayloadFetcher for DirectoryFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, resource: &str) -> Result<BinaryPayload, BootError> {
        let path = self.resolve(resource)?;

        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            warn!(path = %path.display(), error = %e, "Payload read failed");
            BootError::fetch_failed(resource, format!("{}: {e}", path.display()))
        })?;

        info!(path = %path.display(), body_size = bytes.len(), "Payload read");

        Ok(BinaryPayload::new(resource, bytes))
    }
}
