//! Greedy stage fuser

use crate::error::{CompileError, Result};
use crate::fusion::stage::{ExecutableStagePayload, StageTransform};
use conduit_core::{unique_id, urns, Components, PTransform, Pipeline};
use std::collections::{HashMap, HashSet};

/// Result of fusion: runner-executed primitives plus environment stages
#[derive(Debug, Clone, PartialEq)]
pub struct FusedPipeline {
    pub components: Components,
    pub runner_transform_ids: Vec<String>,
    pub stages: Vec<ExecutableStagePayload>,
}

impl FusedPipeline {
    /// Materialize as a pipeline whose roots are exactly the executable nodes.
    ///
    /// Each stage becomes one synthetic transform carrying its payload.
    pub fn to_pipeline(&self) -> Result<Pipeline> {
        let mut components = self.components.clone();
        let mut roots = self.runner_transform_ids.clone();

        for stage in &self.stages {
            let first = stage
                .transforms
                .first()
                .map(|t| t.id.as_str())
                .ok_or_else(|| CompileError::Fusion("empty stage".to_string()))?;
            let stage_id = unique_id(&format!("{}/fused", first), |candidate| {
                components.contains_transform(candidate)
            });

            let mut transform = PTransform {
                unique_name: stage_id.clone(),
                spec: Some(stage.to_spec()?),
                environment_id: Some(stage.environment_id.clone()),
                ..Default::default()
            };
            if let Some(input) = &stage.input {
                transform.inputs.insert("input".to_string(), input.clone());
            }
            for (i, output) in stage.outputs.iter().enumerate() {
                transform
                    .outputs
                    .insert(format!("output_{}", i), output.clone());
            }

            components.transforms.insert(stage_id.clone(), transform);
            roots.push(stage_id);
        }

        Ok(Pipeline::new(components, roots))
    }
}

/// Fuses chains of same-environment transforms.
///
/// A transform joins its producer's stage when it is the sole consumer of
/// the producer's only output, has a single input and runs in the same
/// environment. Everything the runner evaluates itself stays standalone.
#[derive(Debug, Clone)]
pub struct GreedyPipelineFuser {
    fuse_chains: bool,
}

impl Default for GreedyPipelineFuser {
    fn default() -> Self {
        Self { fuse_chains: true }
    }
}

struct Topology<'a> {
    components: &'a Components,
    producers: HashMap<&'a str, &'a str>,
    consumers: HashMap<&'a str, Vec<&'a str>>,
}

impl GreedyPipelineFuser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every environment transform gets a stage of its own
    pub fn without_chaining() -> Self {
        Self { fuse_chains: false }
    }

    pub fn fuse(pipeline: &Pipeline) -> Result<FusedPipeline> {
        Self::new().fuse_pipeline(pipeline)
    }

    pub fn fuse_pipeline(&self, pipeline: &Pipeline) -> Result<FusedPipeline> {
        let leaves = pipeline.leaf_transform_ids()?;
        let components = &pipeline.components;

        let mut topology = Topology {
            components,
            producers: HashMap::new(),
            consumers: HashMap::new(),
        };
        for id in &leaves {
            let transform = components.transform(id)?;
            for pc in transform.inputs.values() {
                topology
                    .consumers
                    .entry(pc.as_str())
                    .or_default()
                    .push(id.as_str());
            }
            for pc in transform.outputs.values() {
                topology.producers.insert(pc.as_str(), id.as_str());
            }
        }

        let mut runner_transform_ids = Vec::new();
        let mut stages = Vec::new();
        let mut placed: HashSet<String> = HashSet::new();

        for id in &leaves {
            let transform = components.transform(id)?;
            if !needs_environment(transform) {
                runner_transform_ids.push(id.clone());
                continue;
            }
            if self.fuses_into_producer(&topology, id)? {
                continue;
            }

            let stage = self.grow_stage(&topology, id)?;
            placed.extend(stage.transforms.iter().map(|t| t.id.clone()));
            stages.push(stage);
        }

        for id in &leaves {
            if needs_environment(components.transform(id)?) && !placed.contains(id) {
                return Err(CompileError::Fusion(format!(
                    "transform '{}' could not be placed in any stage",
                    id
                )));
            }
        }

        tracing::debug!(
            runner_transforms = runner_transform_ids.len(),
            stages = stages.len(),
            "Fused pipeline"
        );

        Ok(FusedPipeline {
            components: components.clone(),
            runner_transform_ids,
            stages,
        })
    }

    /// The transform `id` chains into, if any
    fn next_in_chain<'a>(&self, topology: &Topology<'a>, id: &str) -> Result<Option<&'a str>> {
        if !self.fuse_chains {
            return Ok(None);
        }
        let transform = topology.components.transform(id)?;
        let output = match transform.outputs.values().collect::<Vec<_>>().as_slice() {
            [only] => only.as_str(),
            _ => return Ok(None),
        };
        let next = match topology.consumers.get(output).map(Vec::as_slice) {
            Some([only]) => *only,
            _ => return Ok(None),
        };
        let next_transform = topology.components.transform(next)?;
        let chains = needs_environment(next_transform)
            && next_transform.inputs.len() == 1
            && next_transform.environment_id == transform.environment_id;
        Ok(chains.then_some(next))
    }

    fn fuses_into_producer(&self, topology: &Topology<'_>, id: &str) -> Result<bool> {
        let transform = topology.components.transform(id)?;
        let input = match transform.inputs.values().collect::<Vec<_>>().as_slice() {
            [only] => only.as_str(),
            _ => return Ok(false),
        };
        match topology.producers.get(input) {
            Some(producer) if needs_environment(topology.components.transform(producer)?) => {
                Ok(self.next_in_chain(topology, producer)? == Some(id))
            }
            _ => Ok(false),
        }
    }

    fn grow_stage(&self, topology: &Topology<'_>, root: &str) -> Result<ExecutableStagePayload> {
        let root_transform = topology.components.transform(root)?;
        let environment_id = root_transform
            .environment_id
            .clone()
            .ok_or_else(|| CompileError::Fusion(format!("transform '{}' has no environment", root)))?;
        let input = match root_transform.inputs.values().collect::<Vec<_>>().as_slice() {
            [] => None,
            [only] => Some((*only).clone()),
            _ => {
                return Err(CompileError::Fusion(format!(
                    "transform '{}' has more than one input",
                    root
                )))
            }
        };

        let mut transforms = vec![StageTransform {
            id: root.to_string(),
            transform: root_transform.clone(),
        }];
        let mut current = root.to_string();
        while let Some(next) = self.next_in_chain(topology, &current)? {
            transforms.push(StageTransform {
                id: next.to_string(),
                transform: topology.components.transform(next)?.clone(),
            });
            current = next.to_string();
        }

        let outputs = topology
            .components
            .transform(&current)?
            .outputs
            .values()
            .cloned()
            .collect();

        Ok(ExecutableStagePayload {
            environment_id,
            input,
            transforms,
            outputs,
        })
    }
}

fn needs_environment(transform: &PTransform) -> bool {
    transform.environment_id.is_some()
        && transform.urn() != urns::EXECUTABLE_STAGE
        && !urns::is_runner_primitive(transform.urn())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::{Coder, Environment, PCollection, WindowingStrategy};

    fn chain_pipeline() -> Pipeline {
        let components = Components::new()
            .with_coder("bytes", Coder::new(urns::BYTES_CODER))
            .with_coder("gw", Coder::new(urns::GLOBAL_WINDOW_CODER))
            .with_windowing_strategy("global", WindowingStrategy::global("gw"))
            .with_environment("env", Environment::in_process())
            .with_pcollection("p0", PCollection::new("p0", "bytes", "global"))
            .with_pcollection("p1", PCollection::new("p1", "bytes", "global"))
            .with_pcollection("p2", PCollection::new("p2", "bytes", "global"))
            .with_transform(
                "impulse",
                PTransform::new("Impulse", urns::IMPULSE).with_output("out", "p0"),
            )
            .with_transform(
                "a",
                PTransform::new("A", urns::PAR_DO)
                    .with_input("in", "p0")
                    .with_output("out", "p1")
                    .with_environment("env"),
            )
            .with_transform(
                "b",
                PTransform::new("B", urns::PAR_DO)
                    .with_input("in", "p1")
                    .with_output("out", "p2")
                    .with_environment("env"),
            );
        Pipeline::new(
            components,
            vec!["b".to_string(), "impulse".to_string(), "a".to_string()],
        )
    }

    #[test]
    fn test_chain_is_fused() {
        let fused = GreedyPipelineFuser::fuse(&chain_pipeline()).unwrap();
        assert_eq!(fused.runner_transform_ids, vec!["impulse".to_string()]);
        assert_eq!(fused.stages.len(), 1);

        let stage = &fused.stages[0];
        assert_eq!(stage.transform_ids().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(stage.input.as_deref(), Some("p0"));
        assert_eq!(stage.outputs, vec!["p2".to_string()]);
    }

    #[test]
    fn test_without_chaining() {
        let fused = GreedyPipelineFuser::without_chaining()
            .fuse_pipeline(&chain_pipeline())
            .unwrap();
        assert_eq!(fused.stages.len(), 2);
    }

    #[test]
    fn test_to_pipeline_is_idempotent() {
        let once = GreedyPipelineFuser::fuse(&chain_pipeline())
            .unwrap()
            .to_pipeline()
            .unwrap();
        assert!(once.root_transform_ids.contains(&"a/fused".to_string()));

        let twice = GreedyPipelineFuser::fuse(&once)
            .unwrap()
            .to_pipeline()
            .unwrap();
        assert_eq!(once, twice);
    }
}
