//! End-to-end runs of the reference runner

use async_trait::async_trait;
use conduit_core::{
    urns, Coder, Components, Environment, PCollection, PTransform, Pipeline, Value,
    WindowingStrategy,
};
use conduit_runtime::{
    target_parallelism, EvaluationContext, EvaluatorInput, RuntimeError, TransformEvaluator,
    TransformResult,
};
use conduit_sdk::{ReferenceRunner, RunnerBuilder, RunnerConfig, SdkError, State};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn pairs() -> Vec<Value> {
    vec![
        Value::kv("a", 1i64),
        Value::kv("b", 2i64),
        Value::kv("a", 3i64),
        Value::kv("c", 4i64),
        Value::kv("a", 5i64),
    ]
}

/// impulse -> create (worker function) -> group-by-key
fn grouping_pipeline(function: &str) -> Pipeline {
    let components = Components::new()
        .with_coder("bytes", Coder::new(urns::BYTES_CODER))
        .with_coder("str", Coder::new(urns::STRING_UTF8_CODER))
        .with_coder("varint", Coder::new(urns::VARINT_CODER))
        .with_coder("kv", Coder::kv("str", "varint"))
        .with_coder("gw", Coder::new(urns::GLOBAL_WINDOW_CODER))
        .with_windowing_strategy("global", WindowingStrategy::global("gw"))
        .with_environment("env", Environment::in_process())
        .with_pcollection("impulse.out", PCollection::new("impulse.out", "bytes", "global"))
        .with_pcollection("pairs", PCollection::new("pairs", "kv", "global"))
        .with_pcollection("grouped", PCollection::new("grouped", "kv", "global"))
        .with_transform(
            "impulse",
            PTransform::new("Impulse", urns::IMPULSE).with_output("out", "impulse.out"),
        )
        .with_transform(
            "create",
            PTransform::new("Create", urns::PAR_DO)
                .with_payload(serde_json::json!({ "function": function }))
                .with_input("in", "impulse.out")
                .with_output("out", "pairs")
                .with_environment("env"),
        )
        .with_transform(
            "gbk",
            PTransform::new("GroupByKey", urns::GROUP_BY_KEY)
                .with_input("input", "pairs")
                .with_output("output", "grouped"),
        );
    Pipeline::new(
        components,
        vec!["impulse".to_string(), "create".to_string(), "gbk".to_string()],
    )
}

fn grouped(runner: &ReferenceRunner) -> HashMap<String, Vec<i64>> {
    runner
        .committed_output("grouped")
        .into_iter()
        .map(|element| {
            let (key, values) = element.value.as_kv().unwrap();
            let Value::Array(values) = values else {
                panic!("grouped value is not an array: {}", values);
            };
            let mut ints: Vec<i64> = values.iter().map(|v| v.as_int().unwrap()).collect();
            ints.sort_unstable();
            (key.as_str().unwrap().to_string(), ints)
        })
        .collect()
}

struct FailingEvaluator;

#[async_trait]
impl TransformEvaluator for FailingEvaluator {
    async fn evaluate(
        &self,
        node: &str,
        input: EvaluatorInput,
        _ctx: &EvaluationContext,
    ) -> conduit_runtime::Result<TransformResult> {
        match input {
            EvaluatorInput::Bundle(_) => Err(RuntimeError::evaluation(node, "injected failure")),
            EvaluatorInput::InputsExhausted => Ok(TransformResult::new(node)),
        }
    }
}

struct StalledEvaluator;

#[async_trait]
impl TransformEvaluator for StalledEvaluator {
    async fn evaluate(
        &self,
        node: &str,
        _input: EvaluatorInput,
        _ctx: &EvaluationContext,
    ) -> conduit_runtime::Result<TransformResult> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(TransformResult::new(node))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_group_by_key_end_to_end() {
    let runner = RunnerBuilder::new()
        .with_pipeline(grouping_pipeline("emit_pairs"))
        .with_function("emit_pairs", |_| Ok(pairs()))
        .build()
        .unwrap();

    let result = runner.execute().await.unwrap();
    assert_eq!(result.state, State::Done);
    assert_eq!(result.committed.get("grouped"), Some(&3));

    let grouped = grouped(&runner);
    assert_eq!(grouped.len(), 3);
    assert_eq!(grouped["a"], vec![1, 3, 5]);
    assert_eq!(grouped["b"], vec![2]);
    assert_eq!(grouped["c"], vec![4]);

    let report = runner.teardown_report().unwrap();
    assert!(report.is_clean(), "{:?}", report);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_evaluator_still_tears_down_once() {
    let runner = RunnerBuilder::new()
        .with_pipeline(grouping_pipeline("emit_pairs"))
        .with_function("emit_pairs", |_| Ok(pairs()))
        .with_evaluator(urns::DIRECT_GABW, Arc::new(FailingEvaluator))
        .build()
        .unwrap();

    let err = runner.execute().await.unwrap_err();
    assert!(matches!(
        err,
        SdkError::Runtime(RuntimeError::Evaluation { ref message, .. }) if message == "injected failure"
    ));

    let report = runner.teardown_report().unwrap();
    let services: Vec<&str> = report.services.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(services, vec!["logging", "control", "data", "state"]);
    assert!(report.services.iter().all(|(_, count)| *count == 1));
    assert!(report.data_executor_shut_down);
    assert!(report.failures.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_primitive_releases_started_services() {
    let components = Components::new()
        .with_coder("bytes", Coder::new(urns::BYTES_CODER))
        .with_coder("gw", Coder::new(urns::GLOBAL_WINDOW_CODER))
        .with_windowing_strategy("global", WindowingStrategy::global("gw"))
        .with_pcollection("impulse.out", PCollection::new("impulse.out", "bytes", "global"))
        .with_pcollection("mystery.out", PCollection::new("mystery.out", "bytes", "global"))
        .with_transform(
            "impulse",
            PTransform::new("Impulse", urns::IMPULSE).with_output("out", "impulse.out"),
        )
        .with_transform(
            "mystery",
            PTransform::new("Mystery", "beam:transform:mystery:v1")
                .with_input("in", "impulse.out")
                .with_output("out", "mystery.out"),
        );
    let pipeline = Pipeline::new(
        components,
        vec!["impulse".to_string(), "mystery".to_string()],
    );
    let runner = RunnerBuilder::new().with_pipeline(pipeline).build().unwrap();

    let err = runner.execute().await.unwrap_err();
    assert!(matches!(
        err,
        SdkError::Runtime(RuntimeError::NoEvaluator { ref urn, .. }) if urn == "beam:transform:mystery:v1"
    ));

    let report = runner.teardown_report().unwrap();
    assert!(report.is_clean());
    assert_eq!(
        report.services,
        vec![
            ("logging".to_string(), 1),
            ("control".to_string(), 1),
            ("data".to_string(), 1),
            ("state".to_string(), 1),
        ]
    );
    assert!(report.data_executor_shut_down);
    assert!(report.failures.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_worker_function_is_reported() {
    let runner = RunnerBuilder::new()
        .with_pipeline(grouping_pipeline("explode_badly"))
        .with_function("explode_badly", |_| Err(anyhow::anyhow!("bad input")))
        .build()
        .unwrap();

    let err = runner.execute().await.unwrap_err();
    assert!(err.to_string().contains("bad input"));
    assert!(runner.committed_output("grouped").is_empty());
    assert!(runner.teardown_report().unwrap().is_clean());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bounded_wait_reports_running() {
    let runner = RunnerBuilder::new()
        .with_pipeline(grouping_pipeline("emit_pairs"))
        .with_function("emit_pairs", |_| Ok(pairs()))
        .with_evaluator(urns::DIRECT_GBKO, Arc::new(StalledEvaluator))
        .with_config(RunnerConfig {
            wait_millis: 200,
            ..RunnerConfig::default()
        })
        .build()
        .unwrap();

    let result = runner.execute().await.unwrap();
    assert_eq!(result.state, State::Running);
    assert!(runner.teardown_report().unwrap().is_clean());
}

#[test]
fn test_invalid_pipeline_fails_before_running() {
    let mut pipeline = grouping_pipeline("emit_pairs");
    pipeline
        .components
        .coders
        .insert("kv".to_string(), Coder::new(urns::BYTES_CODER));

    let err = ReferenceRunner::for_pipeline(&pipeline, serde_json::Map::new())
        .err()
        .unwrap();
    assert!(matches!(err, SdkError::Compile(_)));
}

#[test]
fn test_target_parallelism() {
    assert_eq!(target_parallelism(1), 3);
    assert_eq!(target_parallelism(2), 3);
    assert_eq!(target_parallelism(3), 3);
    assert_eq!(target_parallelism(8), 8);

    let runner = RunnerBuilder::new()
        .with_pipeline(grouping_pipeline("emit_pairs"))
        .with_target_parallelism(5)
        .build()
        .unwrap();
    assert_eq!(runner.target_parallelism(), 5);

    let default = ReferenceRunner::for_pipeline(&grouping_pipeline("emit_pairs"), serde_json::Map::new())
        .unwrap();
    assert!(default.target_parallelism() >= 3);
}

#[test]
fn test_executable_pipeline_is_decomposed_and_fused() {
    let runner =
        ReferenceRunner::for_pipeline(&grouping_pipeline("emit_pairs"), serde_json::Map::new())
            .unwrap();
    let pipeline = runner.executable_pipeline();
    let urns_in_graph: Vec<&str> = pipeline
        .root_transform_ids
        .iter()
        .map(|id| pipeline.components.transform(id).unwrap().urn())
        .collect();

    assert!(urns_in_graph.contains(&urns::DIRECT_GBKO));
    assert!(urns_in_graph.contains(&urns::DIRECT_GABW));
    assert!(urns_in_graph.contains(&urns::EXECUTABLE_STAGE));
    assert!(!urns_in_graph.contains(&urns::GROUP_BY_KEY));
}
