//! Conduit Core - Core types and definitions for the Conduit runner
//!
//! This crate provides the fundamental types used across the Conduit workspace:
//! - The pipeline symbol table (`Components`) and its graph nodes
//! - Well-known URNs shared with runner collaborators
//! - Collision-free synthetic id allocation
//! - Element values and windows
//! - Error types

pub mod error;
pub mod model;
pub mod synthetic;
pub mod types;
pub mod urns;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use model::{
    Coder, Components, Environment, FunctionSpec, KvCoderComponents, MergeStatus, PCollection,
    PTransform, Pipeline, WindowingStrategy,
};
pub use synthetic::unique_id;
pub use types::{BoundedWindow, KeyedWorkItem, PaneInfo, StructuralKey, Value, WindowedValue};
