//! Wire messages exchanged between the runner services and workers
//!
//! Every message is one line of JSON (see [`crate::services::framing`]).

use conduit_compiler::ExecutableStagePayload;
use conduit_core::{Value, WindowedValue};
use serde::{Deserialize, Serialize};

/// Address of a running service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiServiceDescriptor {
    pub url: String,
}

// Control plane

/// First frame a worker sends on its control connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Register {
    pub worker_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionRequest {
    pub instruction_id: String,
    pub instruction: Instruction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instruction {
    ProcessBundle(ProcessBundleDescriptor),
    Shutdown,
}

/// Everything a worker needs to run one bundle of a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessBundleDescriptor {
    pub stage_id: String,
    pub stage: ExecutableStagePayload,
    pub data_endpoint: ApiServiceDescriptor,
    pub state_endpoint: ApiServiceDescriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionResponse {
    pub instruction_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InstructionResponse {
    pub fn ok(instruction_id: impl Into<String>) -> Self {
        Self {
            instruction_id: instruction_id.into(),
            error: None,
        }
    }

    pub fn failed(instruction_id: impl Into<String>, error: impl ToString) -> Self {
        Self {
            instruction_id: instruction_id.into(),
            error: Some(error.to_string()),
        }
    }
}

// Data plane

/// First frame a worker sends on its data connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataHello {
    pub worker_id: String,
}

/// Elements for one pcollection of one instruction.
///
/// Exactly one frame per instruction and direction carries `is_last`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Elements {
    pub instruction_id: String,
    pub transform_id: String,

    #[serde(default)]
    pub data: Vec<WindowedValue>,

    #[serde(default)]
    pub is_last: bool,
}

impl Elements {
    /// Marker frame closing an instruction's stream
    pub fn last(instruction_id: impl Into<String>) -> Self {
        Self {
            instruction_id: instruction_id.into(),
            transform_id: String::new(),
            data: Vec::new(),
            is_last: true,
        }
    }
}

// State plane

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRequest {
    pub id: u64,
    pub instruction_id: String,
    pub transform_id: String,
    pub state_key: String,
    pub op: StateOp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateOp {
    Get,
    Append { values: Vec<Value> },
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResponse {
    pub id: u64,

    #[serde(default)]
    pub values: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// Logging

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub severity: Severity,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_id: Option<String>,
}

impl LogEntry {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            instruction_id: None,
            transform_id: None,
        }
    }

    pub fn for_instruction(mut self, instruction_id: impl Into<String>) -> Self {
        self.instruction_id = Some(instruction_id.into());
        self
    }
}
