//! Pipeline submission message

use crate::error::{CoreError, Result};
use crate::model::components::Components;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A self-contained pipeline: the symbol table plus its root transforms
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pipeline {
    pub components: Components,

    #[serde(default)]
    pub root_transform_ids: Vec<String>,
}

impl Pipeline {
    pub fn new(components: Components, root_transform_ids: Vec<String>) -> Self {
        Self {
            components,
            root_transform_ids,
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every id referenced by the graph resolves.
    pub fn validate(&self) -> Result<()> {
        let c = &self.components;

        for root in &self.root_transform_ids {
            if !c.contains_transform(root) {
                return Err(CoreError::InvalidPipeline(format!(
                    "root transform '{}' does not exist",
                    root
                )));
            }
        }

        for (id, transform) in &c.transforms {
            for pc in transform.inputs.values().chain(transform.outputs.values()) {
                if !c.contains_pcollection(pc) {
                    return Err(CoreError::InvalidPipeline(format!(
                        "transform '{}' references unknown pcollection '{}'",
                        id, pc
                    )));
                }
            }
            for sub in &transform.subtransforms {
                if !c.contains_transform(sub) {
                    return Err(CoreError::InvalidPipeline(format!(
                        "transform '{}' references unknown subtransform '{}'",
                        id, sub
                    )));
                }
            }
            if let Some(env) = &transform.environment_id {
                if !c.contains_environment(env) {
                    return Err(CoreError::InvalidPipeline(format!(
                        "transform '{}' references unknown environment '{}'",
                        id, env
                    )));
                }
            }
        }

        for (id, pcollection) in &c.pcollections {
            if !c.contains_coder(&pcollection.coder_id) {
                return Err(CoreError::InvalidPipeline(format!(
                    "pcollection '{}' references unknown coder '{}'",
                    id, pcollection.coder_id
                )));
            }
            if !c.contains_windowing_strategy(&pcollection.windowing_strategy_id) {
                return Err(CoreError::InvalidPipeline(format!(
                    "pcollection '{}' references unknown windowing strategy '{}'",
                    id, pcollection.windowing_strategy_id
                )));
            }
        }

        for (id, coder) in &c.coders {
            if let Some(component) = coder
                .component_coder_ids
                .iter()
                .find(|component| !c.contains_coder(component))
            {
                return Err(CoreError::InvalidPipeline(format!(
                    "coder '{}' references unknown coder '{}'",
                    id, component
                )));
            }
        }

        Ok(())
    }

    /// Primitive transforms reachable from the roots, depth first
    pub fn leaf_transform_ids(&self) -> Result<Vec<String>> {
        let mut leaves = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = self.root_transform_ids.iter().rev().map(String::as_str).collect();

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let transform = self.components.transform(id)?;
            if transform.is_primitive() {
                leaves.push(id.to_string());
            } else {
                stack.extend(transform.subtransforms.iter().rev().map(String::as_str));
            }
        }

        Ok(leaves)
    }
}
