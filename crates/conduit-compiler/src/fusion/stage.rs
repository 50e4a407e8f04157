//! Executable stage description

use crate::error::Result;
use conduit_core::{FunctionSpec, PTransform};
use serde::{Deserialize, Serialize};

/// One transform inside a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTransform {
    pub id: String,
    pub transform: PTransform,
}

/// Everything a worker needs to run a fused chain of transforms.
///
/// Carried as the payload of the synthetic stage transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableStagePayload {
    pub environment_id: String,

    /// PCollection consumed by the first transform, if any
    pub input: Option<String>,

    /// Transforms in execution order
    pub transforms: Vec<StageTransform>,

    /// PCollections leaving the stage
    pub outputs: Vec<String>,
}

impl ExecutableStagePayload {
    pub fn to_spec(&self) -> Result<FunctionSpec> {
        Ok(FunctionSpec::new(conduit_core::urns::EXECUTABLE_STAGE)
            .with_payload(serde_json::to_value(self)?))
    }

    pub fn from_spec(spec: &FunctionSpec) -> Result<Self> {
        Ok(serde_json::from_value(spec.payload.clone())?)
    }

    /// Ids of the fused transforms
    pub fn transform_ids(&self) -> impl Iterator<Item = &str> {
        self.transforms.iter().map(|t| t.id.as_str())
    }
}
