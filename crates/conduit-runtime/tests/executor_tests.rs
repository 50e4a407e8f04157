//! Executor behavior over runner primitives and test evaluators

use async_trait::async_trait;
use conduit_compiler::ExecutableGraph;
use conduit_core::{
    urns, Coder, Components, PCollection, PTransform, Pipeline, Value, WindowingStrategy,
};
use conduit_runtime::{
    BundleFactory, EvaluationContext, EvaluatorInput, ImmutableListBundleFactory,
    ParallelExecutor, RootProviderRegistry, RuntimeError, State, SystemClock,
    TransformEvaluator, TransformEvaluatorRegistry, TransformResult,
};
use conduit_runtime::evaluator::{GroupAlsoByWindowEvaluator, GroupByKeyOnlyEvaluator, ImpulseEvaluator};
use conduit_core::WindowedValue;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CREATE: &str = "test:create:v1";
const FAIL: &str = "test:fail:v1";
const SLOW: &str = "test:slow:v1";

/// Emits each configured value in its own bundle
struct CreateEvaluator {
    values: Vec<Value>,
    factory: Arc<dyn BundleFactory>,
}

#[async_trait]
impl TransformEvaluator for CreateEvaluator {
    async fn evaluate(
        &self,
        node: &str,
        input: EvaluatorInput,
        ctx: &EvaluationContext,
    ) -> conduit_runtime::Result<TransformResult> {
        let EvaluatorInput::Bundle(_) = input else {
            return Ok(TransformResult::new(node));
        };
        let output = ctx.graph().outputs(node)[0].to_string();
        let mut result = TransformResult::new(node);
        for value in &self.values {
            let mut bundle = self.factory.create_bundle(&output);
            bundle.add(WindowedValue::in_global_window(value.clone()));
            result = result.with_output(bundle);
        }
        Ok(result)
    }
}

struct FailingEvaluator {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl TransformEvaluator for FailingEvaluator {
    async fn evaluate(
        &self,
        node: &str,
        input: EvaluatorInput,
        _ctx: &EvaluationContext,
    ) -> conduit_runtime::Result<TransformResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match input {
            EvaluatorInput::Bundle(_) => Err(RuntimeError::evaluation(node, "user code failed")),
            EvaluatorInput::InputsExhausted => Ok(TransformResult::new(node)),
        }
    }
}

struct SlowEvaluator;

#[async_trait]
impl TransformEvaluator for SlowEvaluator {
    async fn evaluate(
        &self,
        node: &str,
        _input: EvaluatorInput,
        _ctx: &EvaluationContext,
    ) -> conduit_runtime::Result<TransformResult> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(TransformResult::new(node))
    }
}

fn base_components() -> Components {
    Components::new()
        .with_coder("bytes", Coder::new(urns::BYTES_CODER))
        .with_coder("str", Coder::new(urns::STRING_UTF8_CODER))
        .with_coder("varint", Coder::new(urns::VARINT_CODER))
        .with_coder("kv", Coder::kv("str", "varint"))
        .with_coder("gw", Coder::new(urns::GLOBAL_WINDOW_CODER))
        .with_windowing_strategy("global", WindowingStrategy::global("gw"))
        .with_pcollection("impulse.out", PCollection::new("impulse.out", "bytes", "global"))
        .with_transform(
            "impulse",
            PTransform::new("Impulse", urns::IMPULSE).with_output("out", "impulse.out"),
        )
}

/// impulse -> `middle_urn` -> gbko -> gabw
fn grouping_graph(middle_urn: &str) -> ExecutableGraph {
    let components = base_components()
        .with_pcollection("pairs", PCollection::new("pairs", "kv", "global"))
        .with_pcollection("partitioned", PCollection::new("partitioned", "kv", "global"))
        .with_pcollection("grouped", PCollection::new("grouped", "kv", "global"))
        .with_transform(
            "create",
            PTransform::new("Create", middle_urn)
                .with_input("in", "impulse.out")
                .with_output("out", "pairs"),
        )
        .with_transform(
            "gbko",
            PTransform::new("GBKO", urns::DIRECT_GBKO)
                .with_input("in", "pairs")
                .with_output("out", "partitioned"),
        )
        .with_transform(
            "gabw",
            PTransform::new("GABW", urns::DIRECT_GABW)
                .with_input("in", "partitioned")
                .with_output("out", "grouped"),
        );
    let roots = ["impulse", "create", "gbko", "gabw"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    ExecutableGraph::for_pipeline(&Pipeline::new(components, roots)).unwrap()
}

fn registry(factory: Arc<dyn BundleFactory>) -> TransformEvaluatorRegistry {
    TransformEvaluatorRegistry::default()
        .with_evaluator(urns::IMPULSE, Arc::new(ImpulseEvaluator::new(factory.clone())))
        .with_evaluator(
            urns::DIRECT_GBKO,
            Arc::new(GroupByKeyOnlyEvaluator::new(factory.clone())),
        )
        .with_evaluator(urns::DIRECT_GABW, Arc::new(GroupAlsoByWindowEvaluator::new(factory)))
}

fn executor(
    graph: ExecutableGraph,
    evaluators: TransformEvaluatorRegistry,
    factory: Arc<dyn BundleFactory>,
) -> ParallelExecutor {
    let graph = Arc::new(graph);
    let ctx = Arc::new(EvaluationContext::create(
        Arc::new(SystemClock),
        factory.clone(),
        graph.clone(),
        HashSet::from(["partitioned".to_string()]),
    ));
    ParallelExecutor::create(
        3,
        RootProviderRegistry::impulse_registry(factory),
        evaluators,
        graph,
        ctx,
    )
}

fn grouped_values(executor: &ParallelExecutor) -> HashMap<String, Vec<i64>> {
    let mut grouped = HashMap::new();
    for bundle in executor.context().committed_bundles("grouped") {
        for element in bundle.elements() {
            let (key, values) = element.value.as_kv().unwrap();
            let Value::Array(values) = values else {
                panic!("grouped value is not an array: {}", values);
            };
            let mut ints: Vec<i64> = values.iter().map(|v| v.as_int().unwrap()).collect();
            ints.sort_unstable();
            grouped.insert(key.as_str().unwrap().to_string(), ints);
        }
    }
    grouped
}

#[tokio::test]
async fn test_group_by_key_runs_to_completion() {
    let factory: Arc<dyn BundleFactory> = Arc::new(ImmutableListBundleFactory::create());
    let values = vec![
        Value::kv("a", 1i64),
        Value::kv("b", 2i64),
        Value::kv("a", 3i64),
        Value::kv("c", 4i64),
        Value::kv("a", 5i64),
    ];
    let evaluators = registry(factory.clone()).with_evaluator(
        CREATE,
        Arc::new(CreateEvaluator {
            values,
            factory: factory.clone(),
        }),
    );
    let executor = executor(grouping_graph(CREATE), evaluators, factory);

    executor.start().unwrap();
    let state = executor.wait_until_finish(Duration::ZERO).await.unwrap();
    assert_eq!(state, State::Done);

    let grouped = grouped_values(&executor);
    assert_eq!(grouped.len(), 3);
    assert_eq!(grouped["a"], vec![1, 3, 5]);
    assert_eq!(grouped["b"], vec![2]);
    assert_eq!(grouped["c"], vec![4]);

    // One keyed bundle per key, all committed to the partitioned pcollection
    let partitioned = executor.context().committed_bundles("partitioned");
    assert_eq!(partitioned.len(), 3);
    assert!(partitioned.iter().all(|b| b.key().is_some()));
}

#[tokio::test]
async fn test_first_failure_is_reported() {
    let factory: Arc<dyn BundleFactory> = Arc::new(ImmutableListBundleFactory::create());
    let calls = Arc::new(AtomicUsize::new(0));
    let evaluators = registry(factory.clone()).with_evaluator(
        FAIL,
        Arc::new(FailingEvaluator {
            calls: calls.clone(),
        }),
    );
    let executor = executor(grouping_graph(FAIL), evaluators, factory);

    executor.start().unwrap();
    let err = executor
        .wait_until_finish(Duration::ZERO)
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::Evaluation { ref transform, .. } if transform == "create"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(executor.context().committed_bundles("grouped").is_empty());
    assert_eq!(executor.context().metrics().evaluation_failures.get(), 1);
}

#[tokio::test]
async fn test_wait_returns_running_on_timeout() {
    let factory: Arc<dyn BundleFactory> = Arc::new(ImmutableListBundleFactory::create());
    let evaluators = registry(factory.clone()).with_evaluator(SLOW, Arc::new(SlowEvaluator));
    let executor = executor(grouping_graph(SLOW), evaluators, factory);

    executor.start().unwrap();
    let state = executor
        .wait_until_finish(Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(state, State::Running);

    let state = executor.wait_until_finish(Duration::ZERO).await.unwrap();
    assert_eq!(state, State::Done);
    assert_eq!(
        executor.wait_until_finish(Duration::ZERO).await.unwrap(),
        State::Done
    );
}

#[tokio::test]
async fn test_missing_evaluator_is_rejected() {
    let factory: Arc<dyn BundleFactory> = Arc::new(ImmutableListBundleFactory::create());
    let graph = grouping_graph(CREATE);
    let err = registry(factory).validate(&graph).unwrap_err();
    assert!(matches!(err, RuntimeError::NoEvaluator { ref urn, .. } if urn == CREATE));
}

#[tokio::test]
async fn test_start_twice_fails() {
    let factory: Arc<dyn BundleFactory> = Arc::new(ImmutableListBundleFactory::create());
    let evaluators = registry(factory.clone()).with_evaluator(SLOW, Arc::new(SlowEvaluator));
    let executor = executor(grouping_graph(SLOW), evaluators, factory);

    executor.start().unwrap();
    assert!(executor.start().is_err());
    executor.wait_until_finish(Duration::ZERO).await.unwrap();
}
