//! Job-bundle factory
//!
//! Owns the worker environments of one run and hands out per-stage factories
//! that push bundles through them.

use crate::environment::{EnvironmentFactory, RemoteEnvironment};
use crate::error::{Result, RuntimeError};
use crate::protocol::{Elements, Instruction, ProcessBundleDescriptor};
use crate::services::{DataService, ServerHandle, StateService};
use conduit_compiler::ExecutableStagePayload;
use conduit_core::{Components, WindowedValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Elements per data frame sent to a worker
const MAX_ELEMENTS_PER_FRAME: usize = 1024;

pub struct DirectJobBundleFactory {
    environment_factory: Arc<dyn EnvironmentFactory>,
    data: Arc<ServerHandle<DataService>>,
    state: Arc<ServerHandle<StateService>>,
    environments: Mutex<HashMap<String, Arc<RemoteEnvironment>>>,
}

impl DirectJobBundleFactory {
    pub fn create(
        environment_factory: Arc<dyn EnvironmentFactory>,
        data: Arc<ServerHandle<DataService>>,
        state: Arc<ServerHandle<StateService>>,
    ) -> Self {
        Self {
            environment_factory,
            data,
            state,
            environments: Mutex::new(HashMap::new()),
        }
    }

    /// Factory for bundles of one stage, starting its environment on first use
    pub async fn for_stage(
        &self,
        stage_id: &str,
        stage: &ExecutableStagePayload,
        components: &Components,
    ) -> Result<StageBundleFactory> {
        let environment = self.environment(&stage.environment_id, components).await?;
        Ok(StageBundleFactory {
            stage_id: stage_id.to_string(),
            stage: stage.clone(),
            environment,
            data: self.data.clone(),
            state: self.state.clone(),
        })
    }

    async fn environment(
        &self,
        environment_id: &str,
        components: &Components,
    ) -> Result<Arc<RemoteEnvironment>> {
        // Held across creation so that concurrent stages share one worker
        let mut environments = self.environments.lock().await;
        if let Some(environment) = environments.get(environment_id) {
            return Ok(environment.clone());
        }
        let description = components.environment(environment_id)?;
        let environment = Arc::new(
            self.environment_factory
                .create_environment(environment_id, description)
                .await?,
        );
        environments.insert(environment_id.to_string(), environment.clone());
        Ok(environment)
    }

    pub async fn environment_count(&self) -> usize {
        self.environments.lock().await.len()
    }

    /// Close every environment; returns the first failure after trying all
    pub async fn close(&self) -> Result<()> {
        let environments: Vec<_> = self.environments.lock().await.drain().collect();
        let mut first_error = None;
        for (id, environment) in environments {
            if let Err(e) = environment.close().await {
                warn!(environment = %id, error = %e, "Failed to close environment");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Runs bundles of one stage on its environment
pub struct StageBundleFactory {
    stage_id: String,
    stage: ExecutableStagePayload,
    environment: Arc<RemoteEnvironment>,
    data: Arc<ServerHandle<DataService>>,
    state: Arc<ServerHandle<StateService>>,
}

impl StageBundleFactory {
    pub fn stage(&self) -> &ExecutableStagePayload {
        &self.stage
    }

    /// Process one bundle; returns the elements produced per output pcollection
    pub async fn process(
        &self,
        elements: &[WindowedValue],
    ) -> Result<BTreeMap<String, Vec<WindowedValue>>> {
        let instruction_id = uuid::Uuid::new_v4().to_string();
        let client = self.environment.instruction_client();
        let worker_id = client.worker_id().to_string();
        let data = self.data.service();

        let mut received = data.receive(&instruction_id)?;
        let descriptor = ProcessBundleDescriptor {
            stage_id: self.stage_id.clone(),
            stage: self.stage.clone(),
            data_endpoint: self.data.endpoint().clone(),
            state_endpoint: self.state.endpoint().clone(),
        };

        let target = self.stage.input.clone().unwrap_or_default();
        for chunk in elements.chunks(MAX_ELEMENTS_PER_FRAME) {
            data.send(
                &worker_id,
                Elements {
                    instruction_id: instruction_id.clone(),
                    transform_id: target.clone(),
                    data: chunk.to_vec(),
                    is_last: false,
                },
            )?;
        }
        data.send(&worker_id, Elements::last(&instruction_id))?;

        let response = client
            .execute(&instruction_id, Instruction::ProcessBundle(descriptor))
            .await;
        self.state.service().clear_instruction(&instruction_id);
        let response = response?;
        if let Some(error) = response.error {
            return Err(RuntimeError::evaluation(&self.stage_id, error));
        }

        let mut outputs: BTreeMap<String, Vec<WindowedValue>> = self
            .stage
            .outputs
            .iter()
            .map(|pc| (pc.clone(), Vec::new()))
            .collect();
        loop {
            let frame = received.recv().await.ok_or_else(|| {
                RuntimeError::Channel(format!(
                    "data stream of instruction '{}' ended early",
                    instruction_id
                ))
            })?;
            if frame.is_last {
                break;
            }
            outputs
                .entry(frame.transform_id)
                .or_default()
                .extend(frame.data);
        }

        debug!(
            stage = %self.stage_id,
            instruction = %instruction_id,
            inputs = elements.len(),
            "Processed bundle"
        );
        Ok(outputs)
    }
}
