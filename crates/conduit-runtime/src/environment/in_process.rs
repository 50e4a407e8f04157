//! Environment factory running workers as tasks of the runner process

use super::worker::{run_worker, WorkerEndpoints};
use super::{EnvironmentFactory, FunctionRegistry, RemoteEnvironment};
use crate::error::{Result, RuntimeError};
use crate::protocol::ApiServiceDescriptor;
use crate::services::{ClientSource, ControlService, LoggingService, ServerHandle};
use async_trait::async_trait;
use conduit_core::{urns, Environment};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(30);

pub struct InProcessEnvironmentFactory {
    options: serde_json::Map<String, serde_json::Value>,
    logging: ApiServiceDescriptor,
    control: ApiServiceDescriptor,
    clients: ClientSource,
    functions: Arc<FunctionRegistry>,
}

impl InProcessEnvironmentFactory {
    pub fn create(
        options: serde_json::Map<String, serde_json::Value>,
        logging: &ServerHandle<LoggingService>,
        control: &ServerHandle<ControlService>,
        clients: ClientSource,
        functions: Arc<FunctionRegistry>,
    ) -> Self {
        Self {
            options,
            logging: logging.endpoint().clone(),
            control: control.endpoint().clone(),
            clients,
            functions,
        }
    }

    /// `registration_timeout_millis` pipeline option, if set
    fn registration_timeout(&self) -> Duration {
        self.options
            .get("registration_timeout_millis")
            .and_then(serde_json::Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REGISTRATION_TIMEOUT)
    }
}

#[async_trait]
impl EnvironmentFactory for InProcessEnvironmentFactory {
    async fn create_environment(
        &self,
        environment_id: &str,
        environment: &Environment,
    ) -> Result<RemoteEnvironment> {
        if environment.urn != urns::IN_PROCESS_ENVIRONMENT {
            return Err(RuntimeError::Environment(format!(
                "environment '{}' has urn '{}', only '{}' is supported",
                environment_id,
                environment.urn,
                urns::IN_PROCESS_ENVIRONMENT
            )));
        }

        let worker_id = format!("{}-{}", environment_id, uuid::Uuid::new_v4().simple());
        let worker = tokio::spawn(run_worker(
            worker_id.clone(),
            WorkerEndpoints {
                control: self.control.clone(),
                logging: self.logging.clone(),
            },
            self.functions.clone(),
        ));

        let client = match self.clients.take(&worker_id, self.registration_timeout()).await {
            Ok(client) => client,
            Err(e) => {
                worker.abort();
                return Err(e);
            }
        };
        info!(environment = %environment_id, worker = %worker_id, "Environment started");

        Ok(RemoteEnvironment::new(
            environment_id,
            environment.clone(),
            client,
            worker,
        ))
    }
}
