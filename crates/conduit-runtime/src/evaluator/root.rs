//! Root input providers: the bundles that start a run

use crate::bundle::{BundleFactory, CommittedBundle};
use crate::context::EvaluationContext;
use crate::error::{Result, RuntimeError};
use conduit_core::{urns, Value, WindowedValue};
use std::collections::HashMap;
use std::sync::Arc;

pub trait RootInputProvider: Send + Sync {
    /// Initial bundles for a root node
    fn initial_inputs(&self, node: &str, ctx: &EvaluationContext) -> Result<Vec<CommittedBundle>>;
}

/// Gives every impulse a single root bundle with one placeholder element
pub struct ImpulseRootProvider {
    bundle_factory: Arc<dyn BundleFactory>,
}

impl ImpulseRootProvider {
    pub fn new(bundle_factory: Arc<dyn BundleFactory>) -> Self {
        Self { bundle_factory }
    }
}

impl RootInputProvider for ImpulseRootProvider {
    fn initial_inputs(&self, _node: &str, ctx: &EvaluationContext) -> Result<Vec<CommittedBundle>> {
        let mut bundle = self.bundle_factory.create_root_bundle();
        bundle.add(WindowedValue::in_global_window(Value::Null));
        Ok(vec![bundle.commit(ctx.now())])
    }
}

/// Root providers by urn
#[derive(Clone, Default)]
pub struct RootProviderRegistry {
    providers: HashMap<String, Arc<dyn RootInputProvider>>,
}

impl RootProviderRegistry {
    pub fn impulse_registry(bundle_factory: Arc<dyn BundleFactory>) -> Self {
        Self::default().with_provider(
            urns::IMPULSE,
            Arc::new(ImpulseRootProvider::new(bundle_factory)),
        )
    }

    pub fn with_provider(
        mut self,
        urn: impl Into<String>,
        provider: Arc<dyn RootInputProvider>,
    ) -> Self {
        self.providers.insert(urn.into(), provider);
        self
    }

    pub fn initial_inputs(&self, node: &str, ctx: &EvaluationContext) -> Result<Vec<CommittedBundle>> {
        let urn = ctx.graph().transform(node)?.urn();
        let provider = self
            .providers
            .get(urn)
            .ok_or_else(|| RuntimeError::NoRootProvider {
                node: node.to_string(),
                urn: urn.to_string(),
            })?;
        provider.initial_inputs(node, ctx)
    }
}
