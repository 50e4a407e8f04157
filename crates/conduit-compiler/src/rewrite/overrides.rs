//! Pipeline-wide transform replacement

use crate::error::Result;
use crate::rewrite::TransformReplacement;
use conduit_core::Pipeline;

/// Replace every primitive transform with spec `urn`.
///
/// Each replacement is computed against the components as merged so far, so
/// ids allocated for one replacement are visible to the next. Transforms that
/// already have sub-transforms are left alone, which makes running the pass
/// twice a no-op. On error the input pipeline is untouched.
pub fn update_transform(
    urn: &str,
    original: &Pipeline,
    replacement: &dyn TransformReplacement,
) -> Result<Pipeline> {
    let targets: Vec<String> = original
        .components
        .transforms
        .iter()
        .filter(|(_, t)| t.urn() == urn && t.is_primitive())
        .map(|(id, _)| id.clone())
        .collect();

    let mut components = original.components.clone();
    for id in &targets {
        let message = replacement.replacement(id, &components)?;
        components.transforms.insert(id.clone(), message.transform);
        components.merge(message.components);
    }

    if !targets.is_empty() {
        tracing::debug!(urn, replaced = targets.len(), "Replaced transforms");
    }

    Ok(Pipeline::new(components, original.root_transform_ids.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::GroupByKeyReplacer;
    use conduit_core::{urns, Coder, Components, PCollection, PTransform, WindowingStrategy};

    fn two_gbk_pipeline() -> Pipeline {
        let components = Components::new()
            .with_coder("bytes", Coder::new(urns::BYTES_CODER))
            .with_coder("kv", Coder::kv("bytes", "bytes"))
            .with_coder("gw", Coder::new(urns::GLOBAL_WINDOW_CODER))
            .with_windowing_strategy("global", WindowingStrategy::global("gw"))
            .with_pcollection("a", PCollection::new("a", "kv", "global"))
            .with_pcollection("b", PCollection::new("b", "kv", "global"))
            .with_pcollection("c", PCollection::new("c", "kv", "global"))
            .with_transform(
                "first",
                PTransform::new("First", urns::GROUP_BY_KEY)
                    .with_input("in", "a")
                    .with_output("out", "b"),
            )
            .with_transform(
                "second",
                PTransform::new("Second", urns::GROUP_BY_KEY)
                    .with_input("in", "a")
                    .with_output("out", "c"),
            );
        Pipeline::new(components, vec!["first".to_string(), "second".to_string()])
    }

    #[test]
    fn test_replaces_every_match() {
        let pipeline = two_gbk_pipeline();
        let updated =
            update_transform(urns::GROUP_BY_KEY, &pipeline, &GroupByKeyReplacer::new()).unwrap();

        assert_eq!(updated.components.transform("first").unwrap().subtransforms.len(), 2);
        assert_eq!(updated.components.transform("second").unwrap().subtransforms.len(), 2);
        // Both groupings read "a", so the second partitioned collection must
        // probe past the first one.
        assert!(updated.components.contains_pcollection("a.partitioned"));
        assert!(updated.components.contains_pcollection("a.partitioned:0"));
        // Same for the intermediate coder seed.
        assert!(updated.components.contains_coder("keyed_work_item(bytes:bytes)"));
        assert!(updated.components.contains_coder("keyed_work_item(bytes:bytes):0"));
    }

    #[test]
    fn test_second_pass_is_noop() {
        let pipeline = two_gbk_pipeline();
        let replacer = GroupByKeyReplacer::new();
        let once = update_transform(urns::GROUP_BY_KEY, &pipeline, &replacer).unwrap();
        let twice = update_transform(urns::GROUP_BY_KEY, &once, &replacer).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_error_leaves_input_untouched() {
        let mut pipeline = two_gbk_pipeline();
        pipeline
            .components
            .coders
            .insert("kv".to_string(), Coder::new(urns::BYTES_CODER));
        let before = pipeline.clone();

        let result = update_transform(urns::GROUP_BY_KEY, &pipeline, &GroupByKeyReplacer::new());
        assert!(result.is_err());
        assert_eq!(pipeline, before);
    }
}
