//! Conduit SDK - run portable pipelines in process
//!
//! [`ReferenceRunner`] compiles a pipeline (group-by-key decomposition and
//! stage fusion), starts the runtime services for each run and drives the
//! parallel executor to completion. [`RunnerBuilder`] assembles a runner
//! with custom functions, evaluators and configuration.

pub mod builder;
pub mod config;
pub mod error;
pub mod resources;
pub mod runner;

pub use builder::RunnerBuilder;
pub use config::RunnerConfig;
pub use error::{Result, SdkError};
pub use resources::{CloseFailure, Closeable, ResourceScope};
pub use runner::{ReferenceRunner, RunResult, TeardownReport};

// Re-export the types callers need to describe and inspect a run
pub use conduit_core::{Pipeline, Value, WindowedValue};
pub use conduit_runtime::State;
