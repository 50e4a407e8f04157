//! Conduit Runtime - executes a compiled pipeline
//!
//! This crate provides:
//! - The logging, control, data and state services workers talk to
//! - Worker environments and the job-bundle factory driving them
//! - Per-urn transform evaluators and the evaluation context
//! - The parallel executor scheduling bundles to completion

pub mod bundle;
pub mod context;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod job_bundle_factory;
pub mod observability;
pub mod protocol;
pub mod services;

pub use bundle::{BundleFactory, CommittedBundle, ImmutableListBundleFactory, UncommittedBundle};
pub use context::{Clock, EvaluationContext, ManualClock, StateTable, SystemClock};
pub use environment::{
    EnvironmentFactory, FunctionRegistry, InProcessEnvironmentFactory, RemoteEnvironment,
    UserFunction,
};
pub use error::{Result, RuntimeError};
pub use evaluator::{
    EvaluatorInput, RootProviderRegistry, TransformEvaluator, TransformEvaluatorRegistry,
    TransformResult,
};
pub use executor::{target_parallelism, ParallelExecutor, State};
pub use job_bundle_factory::{DirectJobBundleFactory, StageBundleFactory};
pub use observability::ExecutorMetrics;
pub use protocol::ApiServiceDescriptor;
pub use services::{
    ControlClientPool, ControlService, DataExecutor, DataService, LoggingService, ReleaseProbe,
    ServerHandle, Service, StateService, TracingLogWriter,
};
