//! In-process worker
//!
//! Speaks the same wire protocol as an out-of-process worker would: it
//! registers over control, streams elements over data, keeps state through
//! the state service and reports through logging.

use super::functions::{function_name, FunctionRegistry, UserFunction};
use crate::error::{Result, RuntimeError};
use crate::protocol::{
    ApiServiceDescriptor, DataHello, Elements, Instruction, InstructionRequest,
    InstructionResponse, LogEntry, ProcessBundleDescriptor, Register, Severity, StateOp,
    StateRequest, StateResponse,
};
use crate::services::data::DataInbox;
use crate::services::framing::{read_frame, write_frame};
use conduit_core::{urns, StructuralKey, Value, WindowedValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::debug;

/// Elements per data frame
const MAX_ELEMENTS_PER_FRAME: usize = 1024;

pub(crate) struct WorkerEndpoints {
    pub control: ApiServiceDescriptor,
    pub logging: ApiServiceDescriptor,
}

/// Run a worker until it is told to shut down or its control connection drops
pub(crate) async fn run_worker(
    worker_id: String,
    endpoints: WorkerEndpoints,
    functions: Arc<FunctionRegistry>,
) -> Result<()> {
    let log = LogClient::connect(&endpoints.logging).await?;

    let stream = TcpStream::connect(&endpoints.control.url).await?;
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    write_frame(&mut write, &Register { worker_id: worker_id.clone() }).await?;

    let (responses, mut outgoing) = mpsc::unbounded_channel::<InstructionResponse>();
    let writer = tokio::spawn(async move {
        while let Some(response) = outgoing.recv().await {
            write_frame(&mut write, &response).await?;
        }
        Ok::<_, RuntimeError>(())
    });

    let worker = Arc::new(Worker {
        id: worker_id,
        functions,
        log,
        data: Mutex::new(None),
        state: Mutex::new(None),
    });
    worker
        .log
        .log(LogEntry::new(Severity::Info, format!("Worker {} started", worker.id)))
        .await;

    let mut bundles = JoinSet::new();
    while let Some(request) = read_frame::<InstructionRequest, _>(&mut lines).await? {
        let InstructionRequest {
            instruction_id,
            instruction,
        } = request;
        match instruction {
            Instruction::ProcessBundle(descriptor) => {
                let worker = worker.clone();
                let responses = responses.clone();
                bundles.spawn(async move {
                    let response = match worker.process_bundle(&instruction_id, descriptor).await {
                        Ok(()) => InstructionResponse::ok(&instruction_id),
                        Err(e) => {
                            worker
                                .log
                                .log(
                                    LogEntry::new(Severity::Error, e.to_string())
                                        .for_instruction(&instruction_id),
                                )
                                .await;
                            InstructionResponse::failed(&instruction_id, e)
                        }
                    };
                    let _ = responses.send(response);
                });
            }
            Instruction::Shutdown => {
                while bundles.join_next().await.is_some() {}
                let _ = responses.send(InstructionResponse::ok(instruction_id));
                break;
            }
        }
    }

    bundles.shutdown().await;
    drop(responses);
    match writer.await {
        Ok(result) => result?,
        Err(e) => return Err(RuntimeError::Environment(format!("response writer failed: {}", e))),
    }
    debug!(worker = %worker.id, "Worker stopped");
    Ok(())
}

struct Worker {
    id: String,
    functions: Arc<FunctionRegistry>,
    log: LogClient,
    data: Mutex<Option<Arc<DataClient>>>,
    state: Mutex<Option<Arc<StateClient>>>,
}

impl Worker {
    async fn data_client(&self, endpoint: &ApiServiceDescriptor) -> Result<Arc<DataClient>> {
        let mut data = self.data.lock().await;
        if let Some(client) = data.as_ref() {
            return Ok(client.clone());
        }
        let client = Arc::new(DataClient::connect(endpoint, &self.id).await?);
        *data = Some(client.clone());
        Ok(client)
    }

    async fn state_client(&self, endpoint: &ApiServiceDescriptor) -> Result<Arc<StateClient>> {
        let mut state = self.state.lock().await;
        if let Some(client) = state.as_ref() {
            return Ok(client.clone());
        }
        let client = Arc::new(StateClient::connect(endpoint).await?);
        *state = Some(client.clone());
        Ok(client)
    }

    async fn process_bundle(
        &self,
        instruction_id: &str,
        descriptor: ProcessBundleDescriptor,
    ) -> Result<()> {
        let data = self.data_client(&descriptor.data_endpoint).await?;
        let mut input = data.receive(instruction_id)?;

        let outcome = self.run_stage(instruction_id, &descriptor, &mut input).await;
        let sent = match outcome {
            Ok(outputs) => {
                let mut sent = Ok(());
                for (pcollection, elements) in outputs {
                    sent = data.send_all(instruction_id, &pcollection, elements).await;
                    if sent.is_err() {
                        break;
                    }
                }
                sent
            }
            Err(e) => Err(e),
        };
        // The runner waits for this frame whatever happened above
        data.send(&Elements::last(instruction_id)).await?;
        sent
    }

    async fn run_stage(
        &self,
        instruction_id: &str,
        descriptor: &ProcessBundleDescriptor,
        input: &mut mpsc::UnboundedReceiver<Elements>,
    ) -> Result<Vec<(String, Vec<WindowedValue>)>> {
        let mut elements = Vec::new();
        while let Some(frame) = input.recv().await {
            elements.extend(frame.data);
            if frame.is_last {
                break;
            }
        }

        let mut last_outputs = Vec::new();
        for stage_transform in &descriptor.stage.transforms {
            let transform = &stage_transform.transform;
            if transform.urn() != urns::PAR_DO {
                return Err(RuntimeError::Environment(format!(
                    "worker cannot run transform '{}' with urn '{}'",
                    stage_transform.id,
                    transform.urn()
                )));
            }
            let name = function_name(transform).ok_or_else(|| {
                RuntimeError::Environment(format!(
                    "transform '{}' does not name a function",
                    stage_transform.id
                ))
            })?;
            let function = self.functions.get(name).ok_or_else(|| {
                RuntimeError::Environment(format!("function '{}' is not registered", name))
            })?;

            let mut outputs = Vec::with_capacity(elements.len());
            for element in &elements {
                let values = match function {
                    UserFunction::Map(f) => f(&element.value)
                        .map_err(|e| RuntimeError::evaluation(&stage_transform.id, e))?,
                    UserFunction::Stateful(f) => {
                        self.apply_stateful(
                            f.as_ref(),
                            instruction_id,
                            &stage_transform.id,
                            &descriptor.state_endpoint,
                            &element.value,
                        )
                        .await?
                    }
                };
                outputs.extend(values.into_iter().map(|v| element.with_value(v)));
            }
            elements = outputs;
            last_outputs = transform.outputs.values().cloned().collect();
        }

        Ok(last_outputs
            .into_iter()
            .map(|pcollection| (pcollection, elements.clone()))
            .collect())
    }

    async fn apply_stateful(
        &self,
        f: &(dyn Fn(&Value, &[Value]) -> anyhow::Result<(Vec<Value>, Vec<Value>)> + Send + Sync),
        instruction_id: &str,
        transform_id: &str,
        endpoint: &ApiServiceDescriptor,
        value: &Value,
    ) -> Result<Vec<Value>> {
        let state = self.state_client(endpoint).await?;
        let key = match value.as_kv() {
            Some((key, _)) => StructuralKey::of(key)?,
            None => StructuralKey::of(value)?,
        };
        let current = state
            .request(instruction_id, transform_id, key.encoded(), StateOp::Get)
            .await?;
        let (outputs, append) =
            f(value, &current).map_err(|e| RuntimeError::evaluation(transform_id, e))?;
        if !append.is_empty() {
            state
                .request(
                    instruction_id,
                    transform_id,
                    key.encoded(),
                    StateOp::Append { values: append },
                )
                .await?;
        }
        Ok(outputs)
    }
}

struct LogClient {
    write: Mutex<OwnedWriteHalf>,
}

impl LogClient {
    async fn connect(endpoint: &ApiServiceDescriptor) -> Result<Self> {
        let (_, write) = TcpStream::connect(&endpoint.url).await?.into_split();
        Ok(Self {
            write: Mutex::new(write),
        })
    }

    /// Best effort; a lost log record never fails a bundle
    async fn log(&self, entry: LogEntry) {
        let mut write = self.write.lock().await;
        if let Err(e) = write_frame(&mut *write, &entry).await {
            debug!(error = %e, "Dropped worker log record");
        }
    }
}

struct DataClient {
    write: Mutex<OwnedWriteHalf>,
    inbox: Arc<DataInbox>,
    reader: JoinHandle<()>,
}

impl DataClient {
    async fn connect(endpoint: &ApiServiceDescriptor, worker_id: &str) -> Result<Self> {
        let (read, mut write) = TcpStream::connect(&endpoint.url).await?.into_split();
        write_frame(
            &mut write,
            &DataHello {
                worker_id: worker_id.to_string(),
            },
        )
        .await?;

        let inbox = Arc::new(DataInbox::default());
        let routed = inbox.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(frame)) = read_frame::<Elements, _>(&mut lines).await {
                routed.dispatch(frame);
            }
        });

        Ok(Self {
            write: Mutex::new(write),
            inbox,
            reader,
        })
    }

    fn receive(&self, instruction_id: &str) -> Result<mpsc::UnboundedReceiver<Elements>> {
        self.inbox.receiver(instruction_id)
    }

    async fn send(&self, frame: &Elements) -> Result<()> {
        let mut write = self.write.lock().await;
        write_frame(&mut *write, frame).await
    }

    async fn send_all(
        &self,
        instruction_id: &str,
        pcollection: &str,
        elements: Vec<WindowedValue>,
    ) -> Result<()> {
        for chunk in elements.chunks(MAX_ELEMENTS_PER_FRAME) {
            self.send(&Elements {
                instruction_id: instruction_id.to_string(),
                transform_id: pcollection.to_string(),
                data: chunk.to_vec(),
                is_last: false,
            })
            .await?;
        }
        Ok(())
    }
}

impl Drop for DataClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

type PendingState = Arc<StdMutex<HashMap<u64, oneshot::Sender<StateResponse>>>>;

struct StateClient {
    write: Mutex<OwnedWriteHalf>,
    pending: PendingState,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl StateClient {
    async fn connect(endpoint: &ApiServiceDescriptor) -> Result<Self> {
        let (read, write) = TcpStream::connect(&endpoint.url).await?.into_split();
        let pending: PendingState = Arc::default();
        let waiting = pending.clone();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(response)) = read_frame::<StateResponse, _>(&mut lines).await {
                let waiter = waiting
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&response.id);
                if let Some(waiter) = waiter {
                    let _ = waiter.send(response);
                }
            }
            waiting
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        });
        Ok(Self {
            write: Mutex::new(write),
            pending,
            next_id: AtomicU64::new(1),
            reader,
        })
    }

    async fn request(
        &self,
        instruction_id: &str,
        transform_id: &str,
        state_key: &str,
        op: StateOp,
    ) -> Result<Vec<Value>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);

        {
            let mut write = self.write.lock().await;
            write_frame(
                &mut *write,
                &StateRequest {
                    id,
                    instruction_id: instruction_id.to_string(),
                    transform_id: transform_id.to_string(),
                    state_key: state_key.to_string(),
                    op,
                },
            )
            .await?;
        }

        let response = rx
            .await
            .map_err(|_| RuntimeError::Channel("state connection closed".to_string()))?;
        match response.error {
            Some(error) => Err(RuntimeError::Environment(format!("state request failed: {}", error))),
            None => Ok(response.values),
        }
    }
}

impl Drop for StateClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
