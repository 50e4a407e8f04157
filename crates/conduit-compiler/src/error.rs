//! Compiler error types

use conduit_core::CoreError;
use thiserror::Error;

/// Compiler error
#[derive(Error, Debug)]
pub enum CompileError {
    /// Caller-fixable precondition violation; nothing was modified
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Symbol table lookup or validation failure
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Stage fusion could not place a transform
    #[error("Fusion error: {0}")]
    Fusion(String),

    /// Stage payload (de)serialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for compiler operations
pub type Result<T> = std::result::Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_display() {
        let err = CompileError::InvalidArgument("bad input".to_string());
        assert_eq!(err.to_string(), "Invalid argument: bad input");
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: CompileError = CoreError::InvalidPipeline("dangling".to_string()).into();
        assert_eq!(err.to_string(), "Invalid pipeline: dangling");
    }
}
