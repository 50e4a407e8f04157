//! SDK error types

use thiserror::Error;

/// SDK error type
#[derive(Error, Debug)]
pub enum SdkError {
    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The builder or a caller supplied something unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Model error: {0}")]
    Core(#[from] conduit_core::CoreError),

    #[error("Compile error: {0}")]
    Compile(#[from] conduit_compiler::CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] conduit_runtime::RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument() {
        let error = SdkError::InvalidArgument("no pipeline".to_string());
        assert_eq!(error.to_string(), "Invalid argument: no pipeline");
    }

    #[test]
    fn test_runtime_error_conversion() {
        let runtime = conduit_runtime::RuntimeError::Executor("stalled".to_string());
        let error: SdkError = runtime.into();
        assert!(error.to_string().contains("Runtime error"));
        assert!(error.to_string().contains("stalled"));
    }
}
