//! Worker environments
//!
//! An environment factory turns an [`Environment`] description into a running
//! worker that has registered with the control service.

pub mod functions;
pub mod in_process;
mod worker;

use crate::error::{Result, RuntimeError};
use crate::protocol::Instruction;
use crate::services::InstructionClient;
use async_trait::async_trait;
use conduit_core::Environment;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use functions::{function_name, FunctionRegistry, MapFn, StatefulFn, UserFunction};
pub use in_process::InProcessEnvironmentFactory;

/// How long a closing environment waits for its worker to stop
const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait EnvironmentFactory: Send + Sync {
    async fn create_environment(
        &self,
        environment_id: &str,
        environment: &Environment,
    ) -> Result<RemoteEnvironment>;
}

/// A worker connected to the runner
pub struct RemoteEnvironment {
    environment_id: String,
    environment: Environment,
    client: InstructionClient,
    worker: Mutex<Option<JoinHandle<Result<()>>>>,
    closed: AtomicBool,
}

impl RemoteEnvironment {
    pub fn new(
        environment_id: impl Into<String>,
        environment: Environment,
        client: InstructionClient,
        worker: JoinHandle<Result<()>>,
    ) -> Self {
        Self {
            environment_id: environment_id.into(),
            environment,
            client,
            worker: Mutex::new(Some(worker)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn environment_id(&self) -> &str {
        &self.environment_id
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn instruction_client(&self) -> &InstructionClient {
        &self.client
    }

    /// Ask the worker to stop and wait for it; idempotent
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let shutdown_id = format!("shutdown-{}", uuid::Uuid::new_v4());
        if let Err(e) = self.client.execute(&shutdown_id, Instruction::Shutdown).await {
            debug!(environment = %self.environment_id, error = %e, "Worker gone before shutdown");
        }

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut worker) = worker else {
            return Ok(());
        };
        match tokio::time::timeout(WORKER_STOP_TIMEOUT, &mut worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(RuntimeError::Environment(format!(
                "worker of '{}' panicked: {}",
                self.environment_id, e
            ))),
            Err(_) => {
                warn!(environment = %self.environment_id, "Worker did not stop, aborting");
                worker.abort();
                Ok(())
            }
        }
    }
}

impl Drop for RemoteEnvironment {
    fn drop(&mut self) {
        if let Some(worker) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            worker.abort();
        }
    }
}
