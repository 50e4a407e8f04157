//! Control service
//!
//! Each worker opens one control connection and registers under its worker
//! id. The connection is then published as an [`InstructionClient`] that the
//! runner uses to send instructions and await their responses.

use super::framing::{read_frame, write_frame};
use super::Service;
use crate::error::{Result, RuntimeError};
use crate::protocol::{Instruction, InstructionRequest, InstructionResponse, Register};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, info, warn};

type PendingResponses = Arc<Mutex<HashMap<String, oneshot::Sender<InstructionResponse>>>>;

/// Runner-side handle on a registered worker's control connection
#[derive(Debug, Clone)]
pub struct InstructionClient {
    worker_id: String,
    outbound: mpsc::UnboundedSender<InstructionRequest>,
    pending: PendingResponses,
}

impl InstructionClient {
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Send an instruction and wait for the worker's response to it
    pub async fn execute(
        &self,
        instruction_id: &str,
        instruction: Instruction,
    ) -> Result<InstructionResponse> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(instruction_id.to_string(), tx);

        let request = InstructionRequest {
            instruction_id: instruction_id.to_string(),
            instruction,
        };
        if self.outbound.send(request).is_err() {
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(instruction_id);
            return Err(self.disconnected());
        }
        rx.await.map_err(|_| self.disconnected())
    }

    fn disconnected(&self) -> RuntimeError {
        RuntimeError::Channel(format!(
            "control connection to worker '{}' closed",
            self.worker_id
        ))
    }
}

/// Registered clients waiting to be claimed by the environment that spawned
/// their worker
#[derive(Debug, Default)]
pub struct ControlClientPool {
    clients: Mutex<HashMap<String, InstructionClient>>,
    available: Notify,
}

impl ControlClientPool {
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sink(self: &Arc<Self>) -> ClientSink {
        ClientSink { pool: self.clone() }
    }

    pub fn source(self: &Arc<Self>) -> ClientSource {
        ClientSource { pool: self.clone() }
    }

    fn remove(&self, worker_id: &str) -> Option<InstructionClient> {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(worker_id)
    }
}

/// Publishing side of a [`ControlClientPool`]
#[derive(Debug, Clone)]
pub struct ClientSink {
    pool: Arc<ControlClientPool>,
}

impl ClientSink {
    pub fn put(&self, client: InstructionClient) {
        self.pool
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client.worker_id.clone(), client);
        self.pool.available.notify_waiters();
    }
}

/// Claiming side of a [`ControlClientPool`]
#[derive(Debug, Clone)]
pub struct ClientSource {
    pool: Arc<ControlClientPool>,
}

impl ClientSource {
    /// Wait until `worker_id` registered, then take its client
    pub async fn take(&self, worker_id: &str, timeout: Duration) -> Result<InstructionClient> {
        let wait = async {
            loop {
                let notified = self.pool.available.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if let Some(client) = self.pool.remove(worker_id) {
                    return client;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            RuntimeError::Environment(format!(
                "worker '{}' did not register within {:?}",
                worker_id, timeout
            ))
        })
    }
}

pub struct ControlService {
    sink: ClientSink,
}

impl ControlService {
    pub fn new(sink: ClientSink) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Service for ControlService {
    fn name(&self) -> &'static str {
        "control"
    }

    async fn serve_connection(self: Arc<Self>, stream: TcpStream) -> Result<()> {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        let register: Register = read_frame(&mut lines).await?.ok_or_else(|| {
            RuntimeError::Protocol("control connection closed before registration".to_string())
        })?;
        info!(worker = %register.worker_id, "Worker registered");

        let (outbound, mut requests) = mpsc::unbounded_channel();
        let pending: PendingResponses = Arc::default();
        self.sink.put(InstructionClient {
            worker_id: register.worker_id.clone(),
            outbound,
            pending: pending.clone(),
        });

        let outcome = loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => {
                        if let Err(e) = write_frame(&mut write, &request).await {
                            break Err(e);
                        }
                    }
                    None => break Ok(()),
                },
                response = read_frame::<InstructionResponse, _>(&mut lines) => match response {
                    Ok(Some(response)) => {
                        let waiter = pending
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&response.instruction_id);
                        match waiter {
                            Some(waiter) => {
                                let _ = waiter.send(response);
                            }
                            None => warn!(
                                worker = %register.worker_id,
                                instruction = %response.instruction_id,
                                "Response for unknown instruction"
                            ),
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                },
            }
        };

        // Dropping the waiters fails every outstanding `execute`
        pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!(worker = %register.worker_id, "Control connection closed");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServerHandle;
    use tokio::runtime::Handle;

    #[tokio::test]
    async fn test_register_and_round_trip() {
        let pool = ControlClientPool::create();
        let server = ServerHandle::allocate_port_and_create_for(
            ControlService::new(pool.sink()),
            &Handle::current(),
        )
        .unwrap();

        let stream = TcpStream::connect(&server.endpoint().url).await.unwrap();
        let worker = tokio::spawn(async move {
            let (read, mut write) = stream.into_split();
            let mut lines = BufReader::new(read).lines();
            write_frame(&mut write, &Register { worker_id: "w1".to_string() })
                .await
                .unwrap();
            let request: InstructionRequest = read_frame(&mut lines).await.unwrap().unwrap();
            write_frame(&mut write, &InstructionResponse::ok(request.instruction_id))
                .await
                .unwrap();
        });

        let client = pool
            .source()
            .take("w1", Duration::from_secs(5))
            .await
            .unwrap();
        let response = client.execute("i-1", Instruction::Shutdown).await.unwrap();
        assert_eq!(response.instruction_id, "i-1");
        assert!(response.error.is_none());

        worker.await.unwrap();
        server.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_take_times_out_for_unknown_worker() {
        let pool = ControlClientPool::create();
        let err = pool
            .source()
            .take("nobody", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Environment(_)));
    }
}
