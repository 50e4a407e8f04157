//! Group-by-key decomposition
//!
//! A group-by-key becomes two runner primitives joined by one partitioned
//! PCollection:
//!
//! ```text
//! input --GBKO--> input.partitioned --GABW--> output
//! ```
//!
//! GBKO partitions elements by key without touching windows, GABW then groups
//! each key's elements by window.

use crate::error::{CompileError, Result};
use crate::rewrite::{MessageWithComponents, TransformReplacement};
use conduit_core::{unique_id, urns, Coder, Components, FunctionSpec, PTransform};
use std::collections::{BTreeMap, HashSet};

/// Name of GBKO's single output
pub const GBKO_OUTPUT: &str = "output";
/// Name of GABW's single input
pub const GABW_INPUT: &str = "input";

/// Replaces a group-by-key with GBKO followed by GABW
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupByKeyReplacer;

impl GroupByKeyReplacer {
    pub fn new() -> Self {
        Self
    }
}

/// Hands out ids that are free in every namespace of the snapshot and
/// distinct from everything already handed out by this allocator.
struct IdAllocator<'a> {
    components: &'a Components,
    allocated: HashSet<String>,
}

impl<'a> IdAllocator<'a> {
    fn new(components: &'a Components) -> Self {
        Self {
            components,
            allocated: HashSet::new(),
        }
    }

    fn allocate(&mut self, seed: &str) -> String {
        let id = unique_id(seed, |candidate| {
            self.components.contains_any(candidate) || self.allocated.contains(candidate)
        });
        self.allocated.insert(id.clone());
        id
    }
}

impl TransformReplacement for GroupByKeyReplacer {
    fn replacement(
        &self,
        gbk_id: &str,
        components: &Components,
    ) -> Result<MessageWithComponents> {
        let gbk = components.transform(gbk_id)?;
        if gbk.urn() != urns::GROUP_BY_KEY {
            return Err(CompileError::InvalidArgument(format!(
                "URN must be {}, got {}",
                urns::GROUP_BY_KEY,
                gbk.urn()
            )));
        }

        let input_id = match gbk.inputs.values().collect::<Vec<_>>().as_slice() {
            [only] => (*only).clone(),
            other => {
                return Err(CompileError::InvalidArgument(format!(
                    "group by key '{}' must have exactly one input, got {}",
                    gbk_id,
                    other.len()
                )))
            }
        };
        let input = components.pcollection(&input_id)?;

        let kv = components
            .coder(&input.coder_id)?
            .kv_components(&input.coder_id)
            .map_err(|e| CompileError::InvalidArgument(e.to_string()))?;
        let window_coder_id = components
            .windowing_strategy(&input.windowing_strategy_id)?
            .window_coder_id
            .clone();

        // Never used to encode anything; it keeps the rewritten graph
        // self-describing.
        let intermediate_coder = Coder::with_components(
            urns::KEYED_WORK_ITEM_CODER,
            vec![
                kv.key_coder_id.clone(),
                kv.value_coder_id.clone(),
                window_coder_id,
            ],
        );

        let mut ids = IdAllocator::new(components);
        let intermediate_coder_id = ids.allocate(&format!(
            "keyed_work_item({}:{})",
            kv.key_coder_id, kv.value_coder_id
        ));
        let partitioned_id = ids.allocate(&format!("{}.partitioned", input_id));
        let gbko_id = ids.allocate(&format!("{}/GBKO", gbk_id));
        let gabw_id = ids.allocate(&format!("{}/GABW", gbk_id));

        // Same windowing strategy as the input: nothing has been merged yet,
        // so elements are still in their original windows.
        let mut partitioned = input.clone();
        partitioned.unique_name = partitioned_id.clone();
        partitioned.coder_id = intermediate_coder_id.clone();

        let gbko = PTransform {
            unique_name: gbko_id.clone(),
            inputs: gbk.inputs.clone(),
            outputs: BTreeMap::from([(GBKO_OUTPUT.to_string(), partitioned_id.clone())]),
            spec: Some(FunctionSpec::new(urns::DIRECT_GBKO)),
            ..Default::default()
        };
        let gabw = PTransform {
            unique_name: gabw_id.clone(),
            inputs: BTreeMap::from([(GABW_INPUT.to_string(), partitioned_id.clone())]),
            outputs: gbk.outputs.clone(),
            spec: Some(FunctionSpec::new(urns::DIRECT_GABW)),
            ..Default::default()
        };

        tracing::debug!(
            gbk = gbk_id,
            gbko = %gbko_id,
            gabw = %gabw_id,
            partitioned = %partitioned_id,
            "Decomposed group by key"
        );

        let delta = Components::new()
            .with_coder(intermediate_coder_id, intermediate_coder)
            .with_pcollection(partitioned_id, partitioned)
            .with_transform(gbko_id.clone(), gbko)
            .with_transform(gabw_id.clone(), gabw);

        let mut replaced = gbk.clone();
        replaced.subtransforms.push(gbko_id);
        replaced.subtransforms.push(gabw_id);

        Ok(MessageWithComponents {
            transform: replaced,
            components: delta,
        })
    }
}
