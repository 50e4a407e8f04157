//! Main compiler
//!
//! Turns a submitted pipeline into its executable form.

use crate::error::Result;
use crate::fusion::GreedyPipelineFuser;
use crate::graph::ExecutableGraph;
use crate::rewrite::{update_transform, GroupByKeyReplacer};
use conduit_core::{urns, Pipeline};

/// Compiler options
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Validate the submitted pipeline before rewriting it
    pub enable_validation: bool,
    /// Fuse chains of same-environment transforms into one stage
    pub enable_fusion: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            enable_validation: true,
            enable_fusion: true,
        }
    }
}

/// The pipeline compiler
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    /// Create a new compiler instance with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new compiler instance with custom options
    pub fn with_options(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Decompose every group-by-key into runner primitives
    pub fn decompose(&self, pipeline: &Pipeline) -> Result<Pipeline> {
        update_transform(urns::GROUP_BY_KEY, pipeline, &GroupByKeyReplacer::new())
    }

    /// Validate, decompose and fuse.
    ///
    /// Deterministic for the same input; compiling the output again returns
    /// it unchanged.
    pub fn executable(&self, pipeline: &Pipeline) -> Result<Pipeline> {
        if self.options.enable_validation {
            pipeline.validate()?;
        }

        let decomposed = self.decompose(pipeline)?;

        let fuser = if self.options.enable_fusion {
            GreedyPipelineFuser::new()
        } else {
            GreedyPipelineFuser::without_chaining()
        };
        let executable = fuser.fuse_pipeline(&decomposed)?.to_pipeline()?;

        tracing::info!(
            nodes = executable.root_transform_ids.len(),
            "Compiled executable pipeline"
        );
        Ok(executable)
    }

    /// Compile and index for scheduling
    pub fn executable_graph(&self, pipeline: &Pipeline) -> Result<(Pipeline, ExecutableGraph)> {
        let executable = self.executable(pipeline)?;
        let graph = ExecutableGraph::for_pipeline(&executable)?;
        Ok((executable, graph))
    }
}
