//! Lazy, exactly-once module resolution.
//!
//! Each execution context owns one [`ModuleLoader`]. The first call to
//! [`ModuleLoader::load_module`] runs the resolver; callers arriving while
//! that resolution is in flight wait on it, and every later caller gets the
//! same handle back. A failed resolution is latched: it is reported again to
//! later callers and never retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use wasm_boot_common::BootError;

use crate::capability::{ExecutionContext, ModuleHandle, ModuleResolver};

/// Readiness of a context's module handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// No load has been attempted.
    NotLoaded,
    /// A load is in flight.
    Loading,
    /// The handle is resolved.
    Ready,
    /// The single load attempt failed.
    Failed,
}

/// Memoizing module loader for one execution context.
pub struct ModuleLoader {
    context: ExecutionContext,
    resolver: Arc<dyn ModuleResolver>,
    cell: OnceCell<Result<ModuleHandle, String>>,
    loading: AtomicBool,
    resolutions: AtomicUsize,
}

impl ModuleLoader {
    /// Create a loader that resolves through `resolver` on first use.
    pub fn new(context: ExecutionContext, resolver: Arc<dyn ModuleResolver>) -> Self {
        Self {
            context,
            resolver,
            cell: OnceCell::new(),
            loading: AtomicBool::new(false),
            resolutions: AtomicUsize::new(0),
        }
    }

    /// Resolve the module, or return the already resolved handle.
    ///
    /// # Errors
    ///
    /// Returns a `ModuleLoad` error if resolution failed, now or earlier.
    pub async fn load_module(&self) -> Result<ModuleHandle, BootError> {
        let mut fresh_error = None;
        let fresh = &mut fresh_error;

        let resolved = self
            .cell
            .get_or_init(|| async move {
                let loading = LoadingFlag::raise(&self.loading);
                self.resolutions.fetch_add(1, Ordering::SeqCst);
                let start = Instant::now();

                debug!(context = %self.context, "Resolving module");
                let result = self.resolver.resolve(self.context).await;
                drop(loading);

                match result {
                    Ok(handle) => {
                        info!(
                            context = %self.context,
                            duration_ms = start.elapsed().as_millis(),
                            "Module ready"
                        );
                        Ok(handle)
                    }
                    Err(e) => {
                        let e = e.into_module_load();
                        warn!(context = %self.context, error = %e, "Module resolution failed");
                        let reason = match &e {
                            BootError::ModuleLoad { reason } => reason.clone(),
                            other => other.to_string(),
                        };
                        *fresh = Some(e);
                        Err(reason)
                    }
                }
            })
            .await;

        match resolved {
            Ok(handle) => Ok(Arc::clone(handle)),
            Err(reason) => {
                Err(fresh_error.unwrap_or_else(|| BootError::module_load_failed(reason.clone())))
            }
        }
    }

    /// The handle, if resolution has already completed successfully.
    pub fn get(&self) -> Option<ModuleHandle> {
        match self.cell.get() {
            Some(Ok(handle)) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    /// Current readiness.
    pub fn state(&self) -> ModuleState {
        match self.cell.get() {
            Some(Ok(_)) => ModuleState::Ready,
            Some(Err(_)) => ModuleState::Failed,
            None if self.loading.load(Ordering::SeqCst) => ModuleState::Loading,
            None => ModuleState::NotLoaded,
        }
    }

    /// How many times the underlying resolver has run.
    ///
    /// One once loaded. A resolution abandoned midway (its caller was
    /// cancelled) is counted too, and the next caller starts a new one.
    pub fn resolutions(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }

    /// The context this loader belongs to.
    pub fn context(&self) -> ExecutionContext {
        self.context
    }
}

/// Holds the loading flag up while a resolution is in flight, including
/// one whose future is dropped before it completes.
struct LoadingFlag<'a>(&'a AtomicBool);

impl<'a> LoadingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("context", &self.context)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
