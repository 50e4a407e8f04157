//! Evaluation context
//!
//! The only mutable state shared between concurrently running evaluators:
//! committed bundles per pcollection and per-step keyed state.

use crate::bundle::{BundleFactory, CommittedBundle};
use crate::error::{Result, RuntimeError};
use crate::evaluator::TransformResult;
use crate::observability::ExecutorMetrics;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use conduit_compiler::ExecutableGraph;
use conduit_core::{StructuralKey, Value, WindowedValue};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Source of processing time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Elements buffered for one key of one step
#[derive(Debug, Clone, PartialEq)]
pub struct StateTable {
    pub key: Value,
    pub elements: Vec<WindowedValue>,
}

pub struct EvaluationContext {
    clock: Arc<dyn Clock>,
    bundle_factory: Arc<dyn BundleFactory>,
    graph: Arc<ExecutableGraph>,
    keyed_pcollections: HashSet<String>,
    committed: Mutex<HashMap<String, Vec<CommittedBundle>>>,
    state: DashMap<(String, StructuralKey), StateTable>,
    metrics: ExecutorMetrics,
}

impl EvaluationContext {
    pub fn create(
        clock: Arc<dyn Clock>,
        bundle_factory: Arc<dyn BundleFactory>,
        graph: Arc<ExecutableGraph>,
        keyed_pcollections: HashSet<String>,
    ) -> Self {
        Self {
            clock,
            bundle_factory,
            graph,
            keyed_pcollections,
            committed: Mutex::new(HashMap::new()),
            state: DashMap::new(),
            metrics: ExecutorMetrics::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn graph(&self) -> &ExecutableGraph {
        &self.graph
    }

    pub fn bundle_factory(&self) -> &dyn BundleFactory {
        self.bundle_factory.as_ref()
    }

    pub fn metrics(&self) -> &ExecutorMetrics {
        &self.metrics
    }

    pub fn is_keyed(&self, pcollection: &str) -> bool {
        self.keyed_pcollections.contains(pcollection)
    }

    /// Commit every output of a result in one step.
    ///
    /// Either all outputs become visible or, on a validation failure, none do.
    pub fn handle_result(&self, result: TransformResult) -> Result<Vec<CommittedBundle>> {
        for bundle in &result.outputs {
            let pcollection = bundle.pcollection().ok_or_else(|| {
                RuntimeError::evaluation(&result.transform_id, "output bundle has no pcollection")
            })?;
            if self.is_keyed(pcollection) && bundle.key().is_none() {
                return Err(RuntimeError::evaluation(
                    &result.transform_id,
                    format!("unkeyed bundle written to keyed pcollection '{}'", pcollection),
                ));
            }
        }

        let now = self.now();
        let mut committed = self.committed.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = Vec::with_capacity(result.outputs.len());
        for bundle in result.outputs {
            let bundle = bundle.commit(now);
            self.metrics.bundles_committed.inc();
            self.metrics.elements_committed.add(bundle.len() as u64);
            if let Some(pcollection) = bundle.pcollection() {
                committed
                    .entry(pcollection.to_string())
                    .or_default()
                    .push(bundle.clone());
            }
            out.push(bundle);
        }
        debug!(
            transform = %result.transform_id,
            bundles = out.len(),
            "Committed transform result"
        );
        Ok(out)
    }

    /// Buffer an element under `key` for `step`
    pub fn record_state_write(&self, step: &str, key: &Value, element: WindowedValue) -> Result<()> {
        let structural = StructuralKey::of(key)?;
        self.state
            .entry((step.to_string(), structural))
            .or_insert_with(|| StateTable {
                key: key.clone(),
                elements: Vec::new(),
            })
            .elements
            .push(element);
        Ok(())
    }

    pub fn state_for(&self, step: &str, key: &Value) -> Result<Option<StateTable>> {
        let structural = StructuralKey::of(key)?;
        Ok(self
            .state
            .get(&(step.to_string(), structural))
            .map(|table| table.value().clone()))
    }

    /// Remove and return all state of `step`, ordered by key
    pub fn take_state(&self, step: &str) -> Vec<(StructuralKey, StateTable)> {
        let keys: Vec<(String, StructuralKey)> = self
            .state
            .iter()
            .filter(|entry| entry.key().0 == step)
            .map(|entry| entry.key().clone())
            .collect();

        let mut tables: Vec<(StructuralKey, StateTable)> = keys
            .into_iter()
            .filter_map(|key| self.state.remove(&key))
            .map(|((_, key), table)| (key, table))
            .collect();
        tables.sort_by(|a, b| a.0.cmp(&b.0));
        tables
    }

    /// Everything committed to `pcollection` so far, in commit order
    pub fn committed_bundles(&self, pcollection: &str) -> Vec<CommittedBundle> {
        self.committed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pcollection)
            .cloned()
            .unwrap_or_default()
    }
}
