//! Stage fusion
//!
//! Groups primitives that run in the same worker environment into executable
//! stages so that a chain of them costs one round trip to the worker.

pub mod fuser;
pub mod stage;

pub use fuser::{FusedPipeline, GreedyPipelineFuser};
pub use stage::{ExecutableStagePayload, StageTransform};
