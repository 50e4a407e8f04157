//! Pipeline model tests: loading, validation and graph traversal

use conduit_core::{
    unique_id, urns, Coder, Components, CoreError, Environment, PCollection, PTransform, Pipeline,
    StructuralKey, Value, WindowingStrategy,
};

const WORD_COUNT_YAML: &str = r#"
components:
  coders:
    str: { urn: "beam:coder:string_utf8:v1" }
    varint: { urn: "beam:coder:varint:v1" }
    kv: { urn: "beam:coder:kv:v1", component_coder_ids: [str, varint] }
    gw: { urn: "beam:coder:global_window:v1" }
  windowing_strategies:
    global:
      window_fn: { urn: "beam:window_fn:global_windows:v1" }
      window_coder_id: gw
  environments:
    env: { urn: "conduit:env:in_process:v1" }
  pcollections:
    words: { unique_name: words, coder_id: str, windowing_strategy_id: global }
    pairs: { unique_name: pairs, coder_id: kv, windowing_strategy_id: global }
    counts: { unique_name: counts, coder_id: kv, windowing_strategy_id: global }
  transforms:
    read:
      unique_name: Read
      spec: { urn: "beam:transform:impulse:v1" }
      outputs: { out: words }
    count:
      unique_name: Count
      inputs: { in: words }
      outputs: { out: counts }
      subtransforms: [pair, group]
    pair:
      unique_name: Count/Pair
      spec: { urn: "beam:transform:pardo:v1", payload: { function: to_kv } }
      environment_id: env
      inputs: { in: words }
      outputs: { out: pairs }
    group:
      unique_name: Count/Group
      spec: { urn: "beam:transform:group_by_key:v1" }
      inputs: { input: pairs }
      outputs: { output: counts }
root_transform_ids: [read, count]
"#;

fn word_count() -> Pipeline {
    Pipeline::from_yaml(WORD_COUNT_YAML).unwrap()
}

#[test]
fn test_yaml_pipeline_is_valid() {
    let pipeline = word_count();
    pipeline.validate().unwrap();

    let kv = pipeline
        .components
        .coder("kv")
        .unwrap()
        .kv_components("kv")
        .unwrap();
    assert_eq!(kv.key_coder_id, "str");
    assert_eq!(kv.value_coder_id, "varint");
    assert_eq!(
        pipeline.components.environment("env").unwrap(),
        &Environment::in_process()
    );
}

#[test]
fn test_leaf_transforms_follow_composite_order() {
    let leaves = word_count().leaf_transform_ids().unwrap();
    assert_eq!(leaves, vec!["read", "pair", "group"]);
}

#[test]
fn test_producers_of() {
    let pipeline = word_count();
    let producers: Vec<&str> = pipeline.components.producers_of("counts").collect();
    // Composites declare the output too but never produce it
    assert_eq!(producers, vec!["group"]);
}

#[test]
fn test_validation_catches_each_dangling_reference() {
    let cases: Vec<(&str, Box<dyn Fn(&mut Pipeline)>)> = vec![
        (
            "root transform 'missing'",
            Box::new(|p: &mut Pipeline| p.root_transform_ids.push("missing".to_string())),
        ),
        (
            "unknown subtransform 'ghost'",
            Box::new(|p: &mut Pipeline| {
                p.components
                    .transforms
                    .get_mut("count")
                    .unwrap()
                    .subtransforms
                    .push("ghost".to_string())
            }),
        ),
        (
            "unknown environment 'env'",
            Box::new(|p: &mut Pipeline| {
                p.components.environments.clear();
            }),
        ),
        (
            "unknown windowing strategy 'global'",
            Box::new(|p: &mut Pipeline| {
                p.components.windowing_strategies.clear();
            }),
        ),
        (
            "unknown coder 'varint'",
            Box::new(|p: &mut Pipeline| {
                p.components.coders.remove("varint");
            }),
        ),
        (
            "unknown pcollection 'nowhere'",
            Box::new(|p: &mut Pipeline| {
                p.components.transforms.insert(
                    "sink".to_string(),
                    PTransform::new("Sink", urns::PAR_DO).with_input("in", "nowhere"),
                );
            }),
        ),
    ];

    for (expected, corrupt) in cases {
        let mut pipeline = word_count();
        corrupt(&mut pipeline);
        let before = pipeline.clone();

        match pipeline.validate() {
            Err(CoreError::InvalidPipeline(message)) => {
                assert!(message.contains(expected), "{} not in {}", expected, message)
            }
            other => panic!("expected an invalid pipeline for {}, got {:?}", expected, other),
        }
        assert_eq!(pipeline, before);
    }
}

#[test]
fn test_unique_id_never_collides_across_rewrites() {
    let mut components = Components::new()
        .with_coder("bytes", Coder::new(urns::BYTES_CODER))
        .with_coder("gw", Coder::new(urns::GLOBAL_WINDOW_CODER))
        .with_windowing_strategy("global", WindowingStrategy::global("gw"));

    let mut allocated = Vec::new();
    for _ in 0..5 {
        let id = unique_id("gbk/GBKO", |candidate| components.contains_any(candidate));
        components = components.with_pcollection(
            id.clone(),
            PCollection::new(id.clone(), "bytes", "global"),
        );
        allocated.push(id);
    }

    assert_eq!(
        allocated,
        vec!["gbk/GBKO", "gbk/GBKO:0", "gbk/GBKO:1", "gbk/GBKO:2", "gbk/GBKO:3"]
    );
}

#[test]
fn test_structural_keys_group_equal_values() {
    let a = StructuralKey::of(&Value::kv("user", 7i64)).unwrap();
    let b = StructuralKey::of(&Value::kv("user", 7i64)).unwrap();
    let c = StructuralKey::of(&Value::kv("user", 8i64)).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.value().unwrap(), Value::kv("user", 7i64));
}
