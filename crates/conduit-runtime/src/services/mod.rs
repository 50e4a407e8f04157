//! Runtime services
//!
//! Logging, control, data and state services each listen on an ephemeral
//! loopback port behind a [`ServerHandle`] that owns the accept loop.

pub mod control;
pub mod data;
pub mod framing;
pub mod logging;
pub mod state;

use crate::error::Result;
use crate::protocol::ApiServiceDescriptor;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

pub use control::{ClientSink, ClientSource, ControlClientPool, ControlService, InstructionClient};
pub use data::{DataExecutor, DataService};
pub use logging::{LogWriter, LoggingService, TracingLogWriter};
pub use state::StateService;

/// A connection-oriented service
#[async_trait]
pub trait Service: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Serve one accepted connection until the peer hangs up
    async fn serve_connection(self: Arc<Self>, stream: TcpStream) -> Result<()>;

    /// Release service-held resources once the accept loop stopped
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Counts how often a server was released
#[derive(Debug, Clone, Default)]
pub struct ReleaseProbe {
    count: Arc<AtomicUsize>,
}

impl ReleaseProbe {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A running service bound to a local port
pub struct ServerHandle<S: Service> {
    service: Arc<S>,
    endpoint: ApiServiceDescriptor,
    shutdown: watch::Sender<bool>,
    accept_loop: Mutex<Option<JoinHandle<()>>>,
    released: AtomicBool,
    probe: ReleaseProbe,
}

impl<S: Service> ServerHandle<S> {
    /// Bind `127.0.0.1:0` and start accepting on `runtime`
    pub fn allocate_port_and_create_for(service: S, runtime: &Handle) -> Result<Self> {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
        listener.set_nonblocking(true)?;
        let address = listener.local_addr()?;

        let service = Arc::new(service);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept_loop = runtime.spawn(accept_loop(service.clone(), listener, shutdown_rx));

        info!(service = service.name(), %address, "Service listening");

        Ok(Self {
            service,
            endpoint: ApiServiceDescriptor {
                url: address.to_string(),
            },
            shutdown,
            accept_loop: Mutex::new(Some(accept_loop)),
            released: AtomicBool::new(false),
            probe: ReleaseProbe::default(),
        })
    }

    pub fn endpoint(&self) -> &ApiServiceDescriptor {
        &self.endpoint
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    pub fn release_probe(&self) -> ReleaseProbe {
        self.probe.clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Stop accepting, drop open connections and release the port.
    /// Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _ = self.shutdown.send(true);
        let accept_loop = self
            .accept_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = accept_loop {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(service = self.service.name(), error = %e, "Accept loop ended abnormally");
                }
            }
        }
        self.probe.record();
        debug!(service = self.service.name(), "Service closed");
        self.service.close().await
    }

    /// Synchronous release for paths that cannot await: stops the accept
    /// loop without waiting for it. No-op once released.
    pub fn release_now(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        if let Some(handle) = self
            .accept_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        self.probe.record();
    }
}

impl<S: Service> Drop for ServerHandle<S> {
    fn drop(&mut self) {
        if !self.is_released() {
            warn!(service = self.service.name(), "Service dropped without close");
            self.release_now();
        }
    }
}

async fn accept_loop<S: Service>(
    service: Arc<S>,
    listener: std::net::TcpListener,
    mut shutdown: watch::Receiver<bool>,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            warn!(service = service.name(), error = %e, "Failed to register listener");
            return;
        }
    };

    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(service = service.name(), %peer, "Connection accepted");
                    let service = service.clone();
                    connections.spawn(async move {
                        let name = service.name();
                        if let Err(e) = service.serve_connection(stream).await {
                            warn!(service = name, error = %e, "Connection failed");
                        }
                    });
                }
                Err(e) => warn!(service = service.name(), error = %e, "Accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    connections.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{LogEntry, Severity};
    use std::sync::Mutex as StdMutex;
    use tokio::io::AsyncWriteExt;

    #[derive(Default)]
    struct CapturingWriter {
        entries: StdMutex<Vec<LogEntry>>,
    }

    impl LogWriter for CapturingWriter {
        fn write(&self, entry: &LogEntry) {
            self.entries.lock().unwrap().push(entry.clone());
        }
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_released_once() {
        let server = ServerHandle::allocate_port_and_create_for(
            LoggingService::new(Arc::new(TracingLogWriter)),
            &Handle::current(),
        )
        .unwrap();
        let probe = server.release_probe();
        assert!(server.endpoint().url.starts_with("127.0.0.1:"));

        server.close().await.unwrap();
        server.close().await.unwrap();
        drop(server);
        assert_eq!(probe.count(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_an_unclosed_server() {
        let server = ServerHandle::allocate_port_and_create_for(
            LoggingService::new(Arc::new(TracingLogWriter)),
            &Handle::current(),
        )
        .unwrap();
        let probe = server.release_probe();
        drop(server);
        assert_eq!(probe.count(), 1);
    }

    #[tokio::test]
    async fn test_logging_service_forwards_entries() {
        let writer = Arc::new(CapturingWriter::default());
        let server = ServerHandle::allocate_port_and_create_for(
            LoggingService::new(writer.clone()),
            &Handle::current(),
        )
        .unwrap();

        let mut stream = TcpStream::connect(&server.endpoint().url).await.unwrap();
        framing::write_frame(&mut stream, &LogEntry::new(Severity::Info, "hello"))
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        for _ in 0..100 {
            if !writer.entries.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(writer.entries.lock().unwrap()[0].message, "hello");
        server.close().await.unwrap();
    }
}
