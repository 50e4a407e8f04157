//! Data service
//!
//! Multiplexes element frames between the runner and connected workers. The
//! service runs on its own [`DataExecutor`] so that element traffic never
//! competes with the scheduler for threads.

use super::framing::{read_frame, write_frame};
use super::Service;
use crate::error::{Result, RuntimeError};
use crate::protocol::{DataHello, Elements};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// Dedicated multi-thread runtime for the data plane
pub struct DataExecutor {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
}

impl DataExecutor {
    pub fn create(threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("conduit-data")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn is_shut_down(&self) -> bool {
        self.runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Stop the runtime without blocking; returns false if already stopped
    pub fn shutdown(&self) -> bool {
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match runtime {
            Some(runtime) => {
                runtime.shutdown_background();
                info!("Data executor shut down");
                true
            }
            None => false,
        }
    }
}

impl Drop for DataExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Mailbox<T> {
    tx: UnboundedSender<T>,
    rx: Option<UnboundedReceiver<T>>,
    finished: bool,
}

impl<T> Mailbox<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Some(rx),
            finished: false,
        }
    }
}

/// Incoming frames routed by instruction id.
///
/// Either side may arrive first: frames for an instruction nobody listens to
/// yet are buffered until its receiver is taken.
#[derive(Default)]
pub struct DataInbox {
    channels: Mutex<HashMap<String, Mailbox<Elements>>>,
}

impl DataInbox {
    /// Take the receiver for `instruction_id`; it ends after the `is_last` frame
    pub fn receiver(&self, instruction_id: &str) -> Result<UnboundedReceiver<Elements>> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let mailbox = channels
            .entry(instruction_id.to_string())
            .or_insert_with(Mailbox::new);
        let rx = mailbox.rx.take().ok_or_else(|| {
            RuntimeError::Channel(format!(
                "data receiver for instruction '{}' already taken",
                instruction_id
            ))
        })?;
        // The stream already ended; dropping the sender lets `rx` drain and close.
        if mailbox.finished {
            channels.remove(instruction_id);
        }
        Ok(rx)
    }

    pub fn dispatch(&self, frame: Elements) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let instruction_id = frame.instruction_id.clone();
        let is_last = frame.is_last;
        let mailbox = channels
            .entry(instruction_id.clone())
            .or_insert_with(Mailbox::new);
        let _ = mailbox.tx.send(frame);
        if is_last {
            mailbox.finished = true;
            if mailbox.rx.is_none() {
                channels.remove(&instruction_id);
            }
        }
    }
}

#[derive(Default)]
pub struct DataService {
    outbound: Mutex<HashMap<String, Mailbox<Elements>>>,
    inbox: DataInbox,
}

impl DataService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame for `worker_id`, delivered once the worker connects
    pub fn send(&self, worker_id: &str, frame: Elements) -> Result<()> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(worker_id.to_string())
            .or_insert_with(Mailbox::new)
            .tx
            .send(frame)
            .map_err(|_| {
                RuntimeError::Channel(format!("data connection to worker '{}' closed", worker_id))
            })
    }

    /// Frames the workers send back for `instruction_id`
    pub fn receive(&self, instruction_id: &str) -> Result<UnboundedReceiver<Elements>> {
        self.inbox.receiver(instruction_id)
    }

    fn take_outbound(&self, worker_id: &str) -> Result<UnboundedReceiver<Elements>> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(worker_id.to_string())
            .or_insert_with(Mailbox::new)
            .rx
            .take()
            .ok_or_else(|| {
                RuntimeError::Protocol(format!("worker '{}' already has a data connection", worker_id))
            })
    }
}

#[async_trait]
impl Service for DataService {
    fn name(&self) -> &'static str {
        "data"
    }

    async fn serve_connection(self: Arc<Self>, stream: TcpStream) -> Result<()> {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        let hello: DataHello = read_frame(&mut lines).await?.ok_or_else(|| {
            RuntimeError::Protocol("data connection closed before hello".to_string())
        })?;
        let mut outbound = self.take_outbound(&hello.worker_id)?;
        debug!(worker = %hello.worker_id, "Data connection established");

        loop {
            tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(frame) => write_frame(&mut write, &frame).await?,
                    None => return Ok(()),
                },
                frame = read_frame::<Elements, _>(&mut lines) => match frame? {
                    Some(frame) => self.inbox.dispatch(frame),
                    None => return Ok(()),
                },
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}
