use super::{single_output, EvaluatorInput, TransformEvaluator, TransformResult};
use crate::bundle::BundleFactory;
use crate::context::EvaluationContext;
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use conduit_core::{BoundedWindow, PTransform};
use std::sync::Arc;

/// Window function of an assign-windows transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowFn {
    Global,
    Fixed { size_millis: i64 },
}

impl WindowFn {
    /// `{ "size_millis": n }` selects fixed windows, anything else global ones
    fn from_transform(node: &str, transform: &PTransform) -> Result<Self> {
        let size = transform
            .spec
            .as_ref()
            .and_then(|spec| spec.payload.get("size_millis"));
        match size {
            None => Ok(WindowFn::Global),
            Some(size) => match size.as_i64() {
                Some(size_millis) if size_millis > 0 => Ok(WindowFn::Fixed { size_millis }),
                _ => Err(RuntimeError::evaluation(
                    node,
                    format!("window size must be a positive integer, got {}", size),
                )),
            },
        }
    }

    fn assign(&self, timestamp_millis: i64) -> BoundedWindow {
        match self {
            WindowFn::Global => BoundedWindow::Global,
            WindowFn::Fixed { size_millis } => {
                let start = timestamp_millis - timestamp_millis.rem_euclid(*size_millis);
                BoundedWindow::Interval {
                    start,
                    end: start.saturating_add(*size_millis),
                }
            }
        }
    }
}

pub struct AssignWindowsEvaluator {
    bundle_factory: Arc<dyn BundleFactory>,
}

impl AssignWindowsEvaluator {
    pub fn new(bundle_factory: Arc<dyn BundleFactory>) -> Self {
        Self { bundle_factory }
    }
}

#[async_trait]
impl TransformEvaluator for AssignWindowsEvaluator {
    async fn evaluate(
        &self,
        node: &str,
        input: EvaluatorInput,
        ctx: &EvaluationContext,
    ) -> Result<TransformResult> {
        let EvaluatorInput::Bundle(bundle) = input else {
            return Ok(TransformResult::new(node));
        };
        let window_fn = WindowFn::from_transform(node, ctx.graph().transform(node)?)?;
        let mut output = self.bundle_factory.create_bundle(&single_output(ctx, node)?);
        for element in bundle.elements() {
            let mut windowed = element.clone();
            windowed.windows = vec![window_fn.assign(element.timestamp_millis)];
            output.add(windowed);
        }
        Ok(TransformResult::new(node).with_output(output))
    }
}
