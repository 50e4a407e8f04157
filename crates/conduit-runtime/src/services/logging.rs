//! Logging service: worker log records re-emitted on the runner side

use super::framing::read_frame;
use super::Service;
use crate::error::Result;
use crate::protocol::{LogEntry, Severity};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

/// Destination for worker log records
pub trait LogWriter: Send + Sync {
    fn write(&self, entry: &LogEntry);
}

/// Re-emits worker records through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogWriter;

impl LogWriter for TracingLogWriter {
    fn write(&self, entry: &LogEntry) {
        let instruction = entry.instruction_id.as_deref().unwrap_or("-");
        let transform = entry.transform_id.as_deref().unwrap_or("-");
        match entry.severity {
            Severity::Trace => {
                tracing::trace!(target: "conduit_runtime::worker", instruction, transform, "{}", entry.message)
            }
            Severity::Debug => {
                tracing::debug!(target: "conduit_runtime::worker", instruction, transform, "{}", entry.message)
            }
            Severity::Info => {
                tracing::info!(target: "conduit_runtime::worker", instruction, transform, "{}", entry.message)
            }
            Severity::Warn => {
                tracing::warn!(target: "conduit_runtime::worker", instruction, transform, "{}", entry.message)
            }
            Severity::Error => {
                tracing::error!(target: "conduit_runtime::worker", instruction, transform, "{}", entry.message)
            }
        }
    }
}

pub struct LoggingService {
    writer: Arc<dyn LogWriter>,
}

impl LoggingService {
    pub fn new(writer: Arc<dyn LogWriter>) -> Self {
        Self { writer }
    }
}

#[async_trait]
impl Service for LoggingService {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn serve_connection(self: Arc<Self>, stream: TcpStream) -> Result<()> {
        let mut lines = BufReader::new(stream).lines();
        while let Some(entry) = read_frame::<LogEntry, _>(&mut lines).await? {
            self.writer.write(&entry);
        }
        Ok(())
    }
}
