//! Executable graph
//!
//! The fused pipeline indexed for scheduling: nodes are runner primitives and
//! stages, edges are the PCollections between them.

use crate::error::{CompileError, Result};
use conduit_core::{Components, PTransform, Pipeline};
use std::collections::HashMap;

/// Immutable dependency graph of a fused pipeline
#[derive(Debug, Clone)]
pub struct ExecutableGraph {
    components: Components,
    nodes: Vec<String>,
    producers: HashMap<String, String>,
    consumers: HashMap<String, Vec<String>>,
}

impl ExecutableGraph {
    /// Index a fused pipeline. Its root transforms must all be primitives.
    pub fn for_pipeline(pipeline: &Pipeline) -> Result<Self> {
        let components = pipeline.components.clone();
        let nodes = pipeline.root_transform_ids.clone();

        let mut producers = HashMap::new();
        let mut consumers: HashMap<String, Vec<String>> = HashMap::new();
        for id in &nodes {
            let transform = components.transform(id)?;
            if !transform.is_primitive() {
                return Err(CompileError::Fusion(format!(
                    "executable node '{}' is a composite",
                    id
                )));
            }
            for pc in transform.outputs.values() {
                if let Some(previous) = producers.insert(pc.clone(), id.clone()) {
                    return Err(CompileError::Fusion(format!(
                        "pcollection '{}' is produced by both '{}' and '{}'",
                        pc, previous, id
                    )));
                }
            }
            for pc in transform.inputs.values() {
                consumers.entry(pc.clone()).or_default().push(id.clone());
            }
        }

        if let Some(orphan) = consumers.keys().find(|pc| !producers.contains_key(*pc)) {
            return Err(CompileError::Fusion(format!(
                "pcollection '{}' is consumed but never produced",
                orphan
            )));
        }

        Ok(Self {
            components,
            nodes,
            producers,
            consumers,
        })
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn transform(&self, node: &str) -> Result<&PTransform> {
        Ok(self.components.transform(node)?)
    }

    /// Nodes without inputs; they are fed by root providers
    pub fn root_transforms(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|id| {
                self.components
                    .transforms
                    .get(id.as_str())
                    .map(|t| t.inputs.is_empty())
                    .unwrap_or(false)
            })
            .map(String::as_str)
            .collect()
    }

    pub fn producer(&self, pcollection: &str) -> Option<&str> {
        self.producers.get(pcollection).map(String::as_str)
    }

    pub fn per_element_consumers(&self, pcollection: &str) -> &[String] {
        self.consumers
            .get(pcollection)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn inputs(&self, node: &str) -> Vec<&str> {
        self.components
            .transforms
            .get(node)
            .map(|t| t.inputs.values().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn outputs(&self, node: &str) -> Vec<&str> {
        self.components
            .transforms
            .get(node)
            .map(|t| t.outputs.values().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Nodes producing this node's inputs
    pub fn upstream(&self, node: &str) -> Vec<&str> {
        self.inputs(node)
            .into_iter()
            .filter_map(|pc| self.producer(pc))
            .collect()
    }
}
