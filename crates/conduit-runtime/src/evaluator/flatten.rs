use super::{single_output, EvaluatorInput, TransformEvaluator, TransformResult};
use crate::bundle::BundleFactory;
use crate::context::EvaluationContext;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Re-emits every input bundle into the single output
pub struct FlattenEvaluator {
    bundle_factory: Arc<dyn BundleFactory>,
}

impl FlattenEvaluator {
    pub fn new(bundle_factory: Arc<dyn BundleFactory>) -> Self {
        Self { bundle_factory }
    }
}

#[async_trait]
impl TransformEvaluator for FlattenEvaluator {
    async fn evaluate(
        &self,
        node: &str,
        input: EvaluatorInput,
        ctx: &EvaluationContext,
    ) -> Result<TransformResult> {
        let EvaluatorInput::Bundle(bundle) = input else {
            return Ok(TransformResult::new(node));
        };
        let mut output = self.bundle_factory.create_bundle(&single_output(ctx, node)?);
        output.extend(bundle.elements().iter().cloned());
        Ok(TransformResult::new(node).with_output(output))
    }
}
