//! Conduit Compiler - turns a submitted pipeline into an executable graph
//!
//! Group-by-key transforms are decomposed into runner primitives, the
//! remaining primitives are fused into stages, and the result is indexed as
//! an [`ExecutableGraph`].

pub mod compiler;
pub mod error;
pub mod fusion;
pub mod graph;
pub mod rewrite;

// Re-export main types
pub use compiler::{Compiler, CompilerOptions};
pub use error::{CompileError, Result};
pub use fusion::{ExecutableStagePayload, FusedPipeline, GreedyPipelineFuser, StageTransform};
pub use graph::ExecutableGraph;
pub use rewrite::{update_transform, GroupByKeyReplacer, MessageWithComponents, TransformReplacement};
