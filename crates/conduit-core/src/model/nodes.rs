//! Graph node definitions

use crate::error::{CoreError, Result};
use crate::urns;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A URN identifying semantics plus an opaque payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub urn: String,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl FunctionSpec {
    /// Create a spec with an empty payload
    pub fn new(urn: impl Into<String>) -> Self {
        Self {
            urn: urn.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Set the payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// A processing step, primitive or composite
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PTransform {
    /// Human-readable, pipeline-unique name
    #[serde(default)]
    pub unique_name: String,

    /// Logical input name -> PCollection id
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,

    /// Logical output name -> PCollection id
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<FunctionSpec>,

    /// Ordered sub-transform ids (empty for primitives)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtransforms: Vec<String>,

    /// Environment that executes this transform, if it needs one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
}

impl PTransform {
    /// Create a primitive transform with the given urn
    pub fn new(unique_name: impl Into<String>, urn: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            spec: Some(FunctionSpec::new(urn)),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, pcollection: impl Into<String>) -> Self {
        self.inputs.insert(name.into(), pcollection.into());
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, pcollection: impl Into<String>) -> Self {
        self.outputs.insert(name.into(), pcollection.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        if let Some(spec) = self.spec.as_mut() {
            spec.payload = payload;
        }
        self
    }

    pub fn with_environment(mut self, environment_id: impl Into<String>) -> Self {
        self.environment_id = Some(environment_id.into());
        self
    }

    /// The spec urn, or an empty string for spec-less composites
    pub fn urn(&self) -> &str {
        self.spec.as_ref().map(|s| s.urn.as_str()).unwrap_or("")
    }

    pub fn is_primitive(&self) -> bool {
        self.subtransforms.is_empty()
    }
}

/// A dataset node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PCollection {
    pub unique_name: String,
    pub coder_id: String,
    pub windowing_strategy_id: String,

    #[serde(default = "default_bounded")]
    pub is_bounded: bool,
}

fn default_bounded() -> bool {
    true
}

impl PCollection {
    pub fn new(
        unique_name: impl Into<String>,
        coder_id: impl Into<String>,
        windowing_strategy_id: impl Into<String>,
    ) -> Self {
        Self {
            unique_name: unique_name.into(),
            coder_id: coder_id.into(),
            windowing_strategy_id: windowing_strategy_id.into(),
            is_bounded: true,
        }
    }
}

/// A serialization scheme, possibly composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coder {
    pub urn: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component_coder_ids: Vec<String>,
}

/// Key and value coder ids of a paired coder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvCoderComponents {
    pub key_coder_id: String,
    pub value_coder_id: String,
}

impl Coder {
    pub fn new(urn: impl Into<String>) -> Self {
        Self {
            urn: urn.into(),
            component_coder_ids: Vec::new(),
        }
    }

    pub fn with_components(urn: impl Into<String>, components: Vec<String>) -> Self {
        Self {
            urn: urn.into(),
            component_coder_ids: components,
        }
    }

    /// Key-value coder over the two given component coders
    pub fn kv(key_coder_id: impl Into<String>, value_coder_id: impl Into<String>) -> Self {
        Self::with_components(
            urns::KV_CODER,
            vec![key_coder_id.into(), value_coder_id.into()],
        )
    }

    /// Split a paired coder into its key and value coder ids.
    ///
    /// `id` is only used for the error message.
    pub fn kv_components(&self, id: &str) -> Result<KvCoderComponents> {
        if self.urn != urns::KV_CODER {
            return Err(CoreError::InvalidCoder {
                id: id.to_string(),
                reason: format!("expected urn {}, got {}", urns::KV_CODER, self.urn),
            });
        }
        match self.component_coder_ids.as_slice() {
            [key, value] => Ok(KvCoderComponents {
                key_coder_id: key.clone(),
                value_coder_id: value.clone(),
            }),
            other => Err(CoreError::InvalidCoder {
                id: id.to_string(),
                reason: format!(
                    "a paired coder has exactly 2 component coders, got {}",
                    other.len()
                ),
            }),
        }
    }
}

/// Whether a windowing strategy merges windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    #[default]
    NonMerging,
    NeedsMerge,
    AlreadyMerged,
}

/// Window assignment and merging policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowingStrategy {
    pub window_fn: FunctionSpec,
    pub window_coder_id: String,

    #[serde(default)]
    pub merge_status: MergeStatus,
}

impl WindowingStrategy {
    /// The global windowing strategy using the given window coder
    pub fn global(window_coder_id: impl Into<String>) -> Self {
        Self {
            window_fn: FunctionSpec::new(urns::GLOBAL_WINDOWS_FN),
            window_coder_id: window_coder_id.into(),
            merge_status: MergeStatus::NonMerging,
        }
    }
}

/// An isolated worker execution context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub urn: String,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl Environment {
    pub fn in_process() -> Self {
        Self {
            urn: urns::IN_PROCESS_ENVIRONMENT.to_string(),
            payload: serde_json::Value::Null,
        }
    }
}
