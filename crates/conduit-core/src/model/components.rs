//! The pipeline symbol table

use crate::error::{CoreError, Result};
use crate::model::nodes::{Coder, Environment, PCollection, PTransform, WindowingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Registry of every node of a pipeline, keyed by id.
///
/// Each namespace is independent. Rewrites never edit a `Components` in
/// place while they are running; they produce a delta that the caller merges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Components {
    #[serde(default)]
    pub transforms: BTreeMap<String, PTransform>,

    #[serde(default)]
    pub pcollections: BTreeMap<String, PCollection>,

    #[serde(default)]
    pub windowing_strategies: BTreeMap<String, WindowingStrategy>,

    #[serde(default)]
    pub coders: BTreeMap<String, Coder>,

    #[serde(default)]
    pub environments: BTreeMap<String, Environment>,
}

impl Components {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Existence queries ==========

    pub fn contains_transform(&self, id: &str) -> bool {
        self.transforms.contains_key(id)
    }

    pub fn contains_pcollection(&self, id: &str) -> bool {
        self.pcollections.contains_key(id)
    }

    pub fn contains_coder(&self, id: &str) -> bool {
        self.coders.contains_key(id)
    }

    pub fn contains_windowing_strategy(&self, id: &str) -> bool {
        self.windowing_strategies.contains_key(id)
    }

    pub fn contains_environment(&self, id: &str) -> bool {
        self.environments.contains_key(id)
    }

    /// True if `id` is taken in any namespace
    pub fn contains_any(&self, id: &str) -> bool {
        self.contains_transform(id)
            || self.contains_pcollection(id)
            || self.contains_coder(id)
            || self.contains_windowing_strategy(id)
            || self.contains_environment(id)
    }

    // ========== Lookups ==========

    pub fn transform(&self, id: &str) -> Result<&PTransform> {
        self.transforms.get(id).ok_or_else(|| missing("transform", id))
    }

    pub fn pcollection(&self, id: &str) -> Result<&PCollection> {
        self.pcollections
            .get(id)
            .ok_or_else(|| missing("pcollection", id))
    }

    pub fn coder(&self, id: &str) -> Result<&Coder> {
        self.coders.get(id).ok_or_else(|| missing("coder", id))
    }

    pub fn windowing_strategy(&self, id: &str) -> Result<&WindowingStrategy> {
        self.windowing_strategies
            .get(id)
            .ok_or_else(|| missing("windowing strategy", id))
    }

    pub fn environment(&self, id: &str) -> Result<&Environment> {
        self.environments
            .get(id)
            .ok_or_else(|| missing("environment", id))
    }

    // ========== Builders ==========

    pub fn with_transform(mut self, id: impl Into<String>, transform: PTransform) -> Self {
        self.transforms.insert(id.into(), transform);
        self
    }

    pub fn with_pcollection(mut self, id: impl Into<String>, pcollection: PCollection) -> Self {
        self.pcollections.insert(id.into(), pcollection);
        self
    }

    pub fn with_coder(mut self, id: impl Into<String>, coder: Coder) -> Self {
        self.coders.insert(id.into(), coder);
        self
    }

    pub fn with_windowing_strategy(
        mut self,
        id: impl Into<String>,
        strategy: WindowingStrategy,
    ) -> Self {
        self.windowing_strategies.insert(id.into(), strategy);
        self
    }

    pub fn with_environment(mut self, id: impl Into<String>, environment: Environment) -> Self {
        self.environments.insert(id.into(), environment);
        self
    }

    /// Merge a delta into this table.
    ///
    /// Entries of `delta` replace entries with the same id; everything else
    /// is kept.
    pub fn merge(&mut self, delta: Components) {
        self.transforms.extend(delta.transforms);
        self.pcollections.extend(delta.pcollections);
        self.windowing_strategies.extend(delta.windowing_strategies);
        self.coders.extend(delta.coders);
        self.environments.extend(delta.environments);
    }

    /// Ids of transforms that produce `pcollection_id`
    pub fn producers_of<'a>(&'a self, pcollection_id: &'a str) -> impl Iterator<Item = &'a str> {
        self.transforms
            .iter()
            .filter(move |(_, t)| t.is_primitive() && t.outputs.values().any(|o| o == pcollection_id))
            .map(|(id, _)| id.as_str())
    }
}

fn missing(kind: &'static str, id: &str) -> CoreError {
    CoreError::MissingComponent {
        kind,
        id: id.to_string(),
    }
}
