//! Error types for Conduit Core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// An id did not resolve in its component namespace
    #[error("No {kind} with id '{id}' in components")]
    MissingComponent { kind: &'static str, id: String },

    /// A coder does not have the shape a caller requires
    #[error("Invalid coder '{id}': {reason}")]
    InvalidCoder { id: String, reason: String },

    /// A pipeline references something inconsistent
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// JSON/YAML (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
