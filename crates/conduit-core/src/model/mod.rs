//! Pipeline model definitions
//!
//! The pipeline graph is an arena: every node lives in [`Components`] under
//! an id and edges are id references, so rewrites are expressed as deltas
//! merged into the arena.

pub mod components;
pub mod nodes;
pub mod pipeline;

pub use components::Components;
pub use nodes::{
    Coder, Environment, FunctionSpec, KvCoderComponents, MergeStatus, PCollection, PTransform,
    WindowingStrategy,
};
pub use pipeline::Pipeline;
