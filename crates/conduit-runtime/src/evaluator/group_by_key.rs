//! The two halves of a decomposed group-by-key

use super::{single_output, EvaluatorInput, TransformEvaluator, TransformResult};
use crate::bundle::BundleFactory;
use crate::context::EvaluationContext;
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use conduit_core::{BoundedWindow, PaneInfo, Value, WindowedValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Buffers key/value elements per key; once its input is exhausted, emits
/// one keyed bundle per key holding that key's work item.
pub struct GroupByKeyOnlyEvaluator {
    bundle_factory: Arc<dyn BundleFactory>,
}

impl GroupByKeyOnlyEvaluator {
    pub fn new(bundle_factory: Arc<dyn BundleFactory>) -> Self {
        Self { bundle_factory }
    }
}

#[async_trait]
impl TransformEvaluator for GroupByKeyOnlyEvaluator {
    async fn evaluate(
        &self,
        node: &str,
        input: EvaluatorInput,
        ctx: &EvaluationContext,
    ) -> Result<TransformResult> {
        match input {
            EvaluatorInput::Bundle(bundle) => {
                for element in bundle.elements() {
                    let (key, value) = element.value.as_kv().ok_or_else(|| {
                        RuntimeError::evaluation(
                            node,
                            format!("expected a key/value element, got {}", element.value),
                        )
                    })?;
                    ctx.record_state_write(node, key, element.with_value(value.clone()))?;
                }
                Ok(TransformResult::new(node))
            }
            EvaluatorInput::InputsExhausted => {
                let output = single_output(ctx, node)?;
                let mut result = TransformResult::new(node);
                for (key, table) in ctx.take_state(node) {
                    let mut bundle = self.bundle_factory.create_keyed_bundle(key, &output);
                    bundle.extend(table.elements);
                    result = result.with_output(bundle);
                }
                debug!(node, keys = result.outputs.len(), "Emitting keyed work items");
                Ok(result)
            }
        }
    }
}

/// Groups each work item's values by window and emits
/// `Kv(key, [values...])` at the end of every window
pub struct GroupAlsoByWindowEvaluator {
    bundle_factory: Arc<dyn BundleFactory>,
}

impl GroupAlsoByWindowEvaluator {
    pub fn new(bundle_factory: Arc<dyn BundleFactory>) -> Self {
        Self { bundle_factory }
    }
}

#[async_trait]
impl TransformEvaluator for GroupAlsoByWindowEvaluator {
    async fn evaluate(
        &self,
        node: &str,
        input: EvaluatorInput,
        ctx: &EvaluationContext,
    ) -> Result<TransformResult> {
        let EvaluatorInput::Bundle(bundle) = input else {
            return Ok(TransformResult::new(node));
        };
        let item = bundle.keyed_work_item()?.ok_or_else(|| {
            RuntimeError::evaluation(node, "expected a keyed bundle of work items")
        })?;

        let mut windows: BTreeMap<BoundedWindow, Vec<Value>> = BTreeMap::new();
        for element in &item.elements {
            for window in &element.windows {
                windows
                    .entry(window.clone())
                    .or_default()
                    .push(element.value.clone());
            }
        }

        let mut output = self.bundle_factory.create_bundle(&single_output(ctx, node)?);
        for (window, values) in windows {
            let mut grouped = WindowedValue::new(
                Value::kv(item.key.clone(), Value::Array(values)),
                window.max_timestamp(),
                vec![window],
            );
            grouped.pane = PaneInfo::on_time_and_only_firing();
            output.add(grouped);
        }
        Ok(TransformResult::new(node).with_output(output))
    }
}
