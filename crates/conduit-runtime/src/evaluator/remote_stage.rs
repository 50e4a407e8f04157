use super::{EvaluatorInput, TransformEvaluator, TransformResult};
use crate::bundle::BundleFactory;
use crate::context::EvaluationContext;
use crate::error::{Result, RuntimeError};
use crate::job_bundle_factory::DirectJobBundleFactory;
use async_trait::async_trait;
use conduit_compiler::ExecutableStagePayload;
use std::sync::Arc;

/// Runs a fused stage on its worker environment
pub struct RemoteStageEvaluator {
    bundle_factory: Arc<dyn BundleFactory>,
    job_bundle_factory: Arc<DirectJobBundleFactory>,
}

impl RemoteStageEvaluator {
    pub fn new(
        bundle_factory: Arc<dyn BundleFactory>,
        job_bundle_factory: Arc<DirectJobBundleFactory>,
    ) -> Self {
        Self {
            bundle_factory,
            job_bundle_factory,
        }
    }
}

#[async_trait]
impl TransformEvaluator for RemoteStageEvaluator {
    async fn evaluate(
        &self,
        node: &str,
        input: EvaluatorInput,
        ctx: &EvaluationContext,
    ) -> Result<TransformResult> {
        let EvaluatorInput::Bundle(bundle) = input else {
            return Ok(TransformResult::new(node));
        };
        let spec = ctx
            .graph()
            .transform(node)?
            .spec
            .as_ref()
            .ok_or_else(|| RuntimeError::evaluation(node, "stage has no payload"))?;
        let stage = ExecutableStagePayload::from_spec(spec)?;

        let factory = self
            .job_bundle_factory
            .for_stage(node, &stage, ctx.graph().components())
            .await?;
        let produced = factory.process(bundle.elements()).await?;

        let mut result = TransformResult::new(node);
        for (pcollection, elements) in produced {
            let mut output = self.bundle_factory.create_bundle(&pcollection);
            output.extend(elements);
            result = result.with_output(output);
        }
        Ok(result)
    }
}
