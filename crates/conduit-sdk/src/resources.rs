//! Scoped ownership of everything a run acquires
//!
//! Resources are released in reverse acquisition order, through `close` on
//! the normal path and through `Drop` when the owning future is cancelled.

use async_trait::async_trait;
use conduit_runtime::services::{Service, ServerHandle};
use conduit_runtime::{DataExecutor, DirectJobBundleFactory, Result as RuntimeResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Something a run must release before it returns
#[async_trait]
pub trait Closeable: Send + Sync {
    async fn close(&self) -> RuntimeResult<()>;

    /// Release without awaiting; used when the scope is dropped unclosed
    fn release_now(&self) {}
}

#[async_trait]
impl<S: Service> Closeable for ServerHandle<S> {
    async fn close(&self) -> RuntimeResult<()> {
        ServerHandle::close(self).await
    }

    fn release_now(&self) {
        ServerHandle::release_now(self);
    }
}

#[async_trait]
impl Closeable for DirectJobBundleFactory {
    async fn close(&self) -> RuntimeResult<()> {
        DirectJobBundleFactory::close(self).await
    }
}

#[async_trait]
impl Closeable for DataExecutor {
    async fn close(&self) -> RuntimeResult<()> {
        self.shutdown();
        Ok(())
    }

    fn release_now(&self) {
        self.shutdown();
    }
}

/// A resource that failed to close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFailure {
    pub resource: String,
    pub message: String,
}

#[derive(Default)]
pub struct ResourceScope {
    resources: Vec<(String, Arc<dyn Closeable>)>,
    closed: bool,
}

impl ResourceScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, resource: Arc<dyn Closeable>) {
        self.resources.push((name.into(), resource));
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Close everything, last acquired first. Every resource is attempted;
    /// failures are logged and returned.
    pub async fn close(&mut self) -> Vec<CloseFailure> {
        self.closed = true;
        let mut failures = Vec::new();
        while let Some((name, resource)) = self.resources.pop() {
            match resource.close().await {
                Ok(()) => debug!(resource = %name, "Released"),
                Err(e) => {
                    warn!(resource = %name, error = %e, "Failed to release resource");
                    failures.push(CloseFailure {
                        resource: name,
                        message: e.to_string(),
                    });
                }
            }
        }
        failures
    }
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        while let Some((name, resource)) = self.resources.pop() {
            warn!(resource = %name, "Releasing resource of an abandoned run");
            resource.release_now();
        }
    }
}
