//! Transform evaluators
//!
//! One evaluator per urn. The executor hands each node its committed input
//! bundles and, once all of them have been seen, a single `InputsExhausted`.

mod flatten;
mod group_by_key;
mod impulse;
mod remote_stage;
pub mod root;
mod window;

use crate::bundle::{BundleFactory, CommittedBundle, UncommittedBundle};
use crate::context::EvaluationContext;
use crate::error::{Result, RuntimeError};
use crate::job_bundle_factory::DirectJobBundleFactory;
use async_trait::async_trait;
use conduit_compiler::ExecutableGraph;
use conduit_core::urns;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub use flatten::FlattenEvaluator;
pub use group_by_key::{GroupAlsoByWindowEvaluator, GroupByKeyOnlyEvaluator};
pub use impulse::ImpulseEvaluator;
pub use remote_stage::RemoteStageEvaluator;
pub use root::{ImpulseRootProvider, RootInputProvider, RootProviderRegistry};
pub use window::AssignWindowsEvaluator;

/// What a node is asked to process
#[derive(Debug, Clone)]
pub enum EvaluatorInput {
    Bundle(CommittedBundle),
    /// Every producer of the node's inputs has finished
    InputsExhausted,
}

impl fmt::Display for EvaluatorInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluatorInput::Bundle(bundle) => write!(f, "bundle of {}", bundle.len()),
            EvaluatorInput::InputsExhausted => write!(f, "inputs exhausted"),
        }
    }
}

/// Output bundles of one evaluation, committed together
#[derive(Debug)]
pub struct TransformResult {
    pub transform_id: String,
    pub outputs: Vec<UncommittedBundle>,
}

impl TransformResult {
    pub fn new(transform_id: impl Into<String>) -> Self {
        Self {
            transform_id: transform_id.into(),
            outputs: Vec::new(),
        }
    }

    pub fn with_output(mut self, bundle: UncommittedBundle) -> Self {
        self.outputs.push(bundle);
        self
    }
}

#[async_trait]
pub trait TransformEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        node: &str,
        input: EvaluatorInput,
        ctx: &EvaluationContext,
    ) -> Result<TransformResult>;
}

/// The single output pcollection of a node
pub(crate) fn single_output(ctx: &EvaluationContext, node: &str) -> Result<String> {
    let transform = ctx.graph().transform(node)?;
    match transform.outputs.values().collect::<Vec<_>>().as_slice() {
        [only] => Ok((*only).clone()),
        other => Err(RuntimeError::evaluation(
            node,
            format!("expected exactly one output, got {}", other.len()),
        )),
    }
}

/// Evaluators by urn
#[derive(Clone, Default)]
pub struct TransformEvaluatorRegistry {
    evaluators: HashMap<String, Arc<dyn TransformEvaluator>>,
}

impl TransformEvaluatorRegistry {
    /// Evaluators for every urn a portable pipeline executes, checked against
    /// the nodes of `graph`
    pub fn portable_registry(
        graph: &ExecutableGraph,
        bundle_factory: Arc<dyn BundleFactory>,
        job_bundle_factory: Arc<DirectJobBundleFactory>,
    ) -> Result<Self> {
        let registry = Self::default()
            .with_evaluator(
                urns::IMPULSE,
                Arc::new(ImpulseEvaluator::new(bundle_factory.clone())),
            )
            .with_evaluator(
                urns::FLATTEN,
                Arc::new(FlattenEvaluator::new(bundle_factory.clone())),
            )
            .with_evaluator(
                urns::ASSIGN_WINDOWS,
                Arc::new(AssignWindowsEvaluator::new(bundle_factory.clone())),
            )
            .with_evaluator(
                urns::DIRECT_GBKO,
                Arc::new(GroupByKeyOnlyEvaluator::new(bundle_factory.clone())),
            )
            .with_evaluator(
                urns::DIRECT_GABW,
                Arc::new(GroupAlsoByWindowEvaluator::new(bundle_factory.clone())),
            )
            .with_evaluator(
                urns::EXECUTABLE_STAGE,
                Arc::new(RemoteStageEvaluator::new(bundle_factory, job_bundle_factory)),
            );
        registry.validate(graph)?;
        Ok(registry)
    }

    pub fn with_evaluator(
        mut self,
        urn: impl Into<String>,
        evaluator: Arc<dyn TransformEvaluator>,
    ) -> Self {
        self.evaluators.insert(urn.into(), evaluator);
        self
    }

    /// Fail with the first node that has no evaluator
    pub fn validate(&self, graph: &ExecutableGraph) -> Result<()> {
        for node in graph.nodes() {
            self.evaluator_for(graph, node)?;
        }
        Ok(())
    }

    pub fn evaluator_for(
        &self,
        graph: &ExecutableGraph,
        node: &str,
    ) -> Result<Arc<dyn TransformEvaluator>> {
        let urn = graph.transform(node)?.urn();
        self.evaluators
            .get(urn)
            .cloned()
            .ok_or_else(|| RuntimeError::NoEvaluator {
                node: node.to_string(),
                urn: urn.to_string(),
            })
    }
}
