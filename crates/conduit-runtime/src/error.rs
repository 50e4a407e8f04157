//! Runtime error types

use conduit_compiler::CompileError;
use conduit_core::CoreError;
use thiserror::Error;

/// Runtime error
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Socket or file I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A runtime service failed to start, serve or stop
    #[error("Service '{service}' failed: {message}")]
    Service {
        service: &'static str,
        message: String,
    },

    /// A worker environment could not be created or used
    #[error("Environment error: {0}")]
    Environment(String),

    /// Malformed or unexpected frame on a runtime connection
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An evaluator failed while processing a bundle
    #[error("Evaluation of '{transform}' failed: {message}")]
    Evaluation { transform: String, message: String },

    /// No evaluator is registered for a node's urn
    #[error("No evaluator registered for urn '{urn}' (node '{node}')")]
    NoEvaluator { node: String, urn: String },

    /// No root provider is registered for a root node's urn
    #[error("No root provider registered for urn '{urn}' (node '{node}')")]
    NoRootProvider { node: String, urn: String },

    /// The scheduler itself failed
    #[error("Executor error: {0}")]
    Executor(String),

    /// A channel closed while a peer still expected it open
    #[error("Channel closed: {0}")]
    Channel(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RuntimeError {
    pub fn evaluation(transform: impl Into<String>, message: impl ToString) -> Self {
        RuntimeError::Evaluation {
            transform: transform.into(),
            message: message.to_string(),
        }
    }

    pub fn service(service: &'static str, message: impl ToString) -> Self {
        RuntimeError::Service {
            service,
            message: message.to_string(),
        }
    }
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
