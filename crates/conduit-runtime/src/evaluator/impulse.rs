use super::{single_output, EvaluatorInput, TransformEvaluator, TransformResult};
use crate::bundle::BundleFactory;
use crate::context::EvaluationContext;
use crate::error::Result;
use async_trait::async_trait;
use conduit_core::{Value, WindowedValue};
use std::sync::Arc;

/// Emits one empty byte string in the global window per root element
pub struct ImpulseEvaluator {
    bundle_factory: Arc<dyn BundleFactory>,
}

impl ImpulseEvaluator {
    pub fn new(bundle_factory: Arc<dyn BundleFactory>) -> Self {
        Self { bundle_factory }
    }
}

#[async_trait]
impl TransformEvaluator for ImpulseEvaluator {
    async fn evaluate(
        &self,
        node: &str,
        input: EvaluatorInput,
        ctx: &EvaluationContext,
    ) -> Result<TransformResult> {
        let EvaluatorInput::Bundle(root) = input else {
            return Ok(TransformResult::new(node));
        };
        let mut output = self.bundle_factory.create_bundle(&single_output(ctx, node)?);
        for _ in root.elements() {
            output.add(WindowedValue::in_global_window(Value::Bytes(Vec::new())));
        }
        Ok(TransformResult::new(node).with_output(output))
    }
}
