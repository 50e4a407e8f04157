//! Reference runner
//!
//! Compiles a pipeline into its executable form, then for every run starts
//! the logging, control, data and state services, wires the environment and
//! job-bundle factories, the evaluator registry and the evaluation context,
//! and drives the parallel executor to completion. Everything acquired is
//! released before `execute` returns.

use crate::config::RunnerConfig;
use crate::error::Result;
use crate::resources::{CloseFailure, ResourceScope};
use conduit_compiler::{Compiler, CompilerOptions, ExecutableGraph};
use conduit_core::{urns, Pipeline, WindowedValue};
use conduit_runtime::environment::EnvironmentFactory;
use conduit_runtime::services::{ControlClientPool, LogWriter};
use conduit_runtime::{
    target_parallelism, BundleFactory, ControlService, DataExecutor, DataService,
    DirectJobBundleFactory, EvaluationContext, FunctionRegistry, ImmutableListBundleFactory,
    InProcessEnvironmentFactory, LoggingService, ParallelExecutor, ReleaseProbe,
    RootProviderRegistry, ServerHandle, State, StateService, SystemClock, TracingLogWriter,
    TransformEvaluator, TransformEvaluatorRegistry,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tracing::{info, warn};

/// Outcome of a run that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub state: State,

    /// Element count per pipeline output pcollection
    pub committed: BTreeMap<String, usize>,
}

/// What teardown released during the last run
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    /// Release count per service, in acquisition order
    pub services: Vec<(String, usize)>,
    pub data_executor_shut_down: bool,
    pub failures: Vec<CloseFailure>,
}

impl TeardownReport {
    /// Every service released exactly once and the data executor stopped
    pub fn is_clean(&self) -> bool {
        self.data_executor_shut_down
            && self.failures.is_empty()
            && self.services.iter().all(|(_, count)| *count == 1)
    }
}

struct LastRun {
    context: Option<Arc<EvaluationContext>>,
    probes: Vec<(String, ReleaseProbe)>,
    data_executor: Option<Arc<DataExecutor>>,
    failures: Vec<CloseFailure>,
}

pub struct ReferenceRunner {
    pipeline: Pipeline,
    graph: Arc<ExecutableGraph>,
    config: RunnerConfig,
    functions: Arc<FunctionRegistry>,
    evaluator_overrides: Vec<(String, Arc<dyn TransformEvaluator>)>,
    log_writer: Arc<dyn LogWriter>,
    last_run: Mutex<Option<LastRun>>,
}

impl ReferenceRunner {
    /// Compile `pipeline` for execution with the given options and the
    /// built-in functions. Fails before acquiring anything.
    pub fn for_pipeline(
        pipeline: &Pipeline,
        options: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self> {
        let config = RunnerConfig {
            options,
            ..RunnerConfig::default()
        };
        Self::from_parts(
            pipeline,
            config,
            FunctionRegistry::with_builtins(),
            Vec::new(),
            Arc::new(TracingLogWriter),
        )
    }

    pub(crate) fn from_parts(
        pipeline: &Pipeline,
        config: RunnerConfig,
        functions: FunctionRegistry,
        evaluator_overrides: Vec<(String, Arc<dyn TransformEvaluator>)>,
        log_writer: Arc<dyn LogWriter>,
    ) -> Result<Self> {
        let compiler = Compiler::with_options(CompilerOptions {
            enable_fusion: config.enable_fusion,
            ..CompilerOptions::default()
        });
        let (pipeline, graph) = compiler.executable_graph(pipeline)?;
        Ok(Self {
            pipeline,
            graph: Arc::new(graph),
            config,
            functions: Arc::new(functions),
            evaluator_overrides,
            log_writer,
            last_run: Mutex::new(None),
        })
    }

    /// The pipeline as it is executed: group-by-keys decomposed, stages fused
    pub fn executable_pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn target_parallelism(&self) -> usize {
        self.config.target_parallelism_override.unwrap_or_else(|| {
            let available = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
            target_parallelism(available)
        })
    }

    /// Run the pipeline and release every resource of the run.
    ///
    /// Waits as configured by `wait_millis`; a run still going when the wait
    /// ends reports `State::Running` and is stopped by teardown.
    pub async fn execute(&self) -> Result<RunResult> {
        let mut scope = ResourceScope::new();
        let mut last_run = LastRun {
            context: None,
            probes: Vec::new(),
            data_executor: None,
            failures: Vec::new(),
        };

        let outcome = self.run(&mut scope, &mut last_run).await;

        last_run.failures = scope.close().await;
        *self.last_run.lock().unwrap_or_else(PoisonError::into_inner) = Some(last_run);

        match &outcome {
            Ok(result) => info!(state = ?result.state, "Run ended"),
            Err(e) => warn!(error = %e, "Run failed"),
        }
        outcome
    }

    async fn run(&self, scope: &mut ResourceScope, last_run: &mut LastRun) -> Result<RunResult> {
        let bundle_factory: Arc<dyn BundleFactory> = Arc::new(ImmutableListBundleFactory::create());
        let root_registry = RootProviderRegistry::impulse_registry(bundle_factory.clone());
        let parallelism = self.target_parallelism();
        let runtime = Handle::current();

        let data_executor = Arc::new(DataExecutor::create(self.config.data_threads)?);
        scope.register("data executor", data_executor.clone());
        last_run.data_executor = Some(data_executor.clone());

        let client_pool = ControlClientPool::create();
        let logging = Arc::new(ServerHandle::allocate_port_and_create_for(
            LoggingService::new(self.log_writer.clone()),
            &runtime,
        )?);
        scope.register("logging", logging.clone());
        last_run.probes.push(("logging".to_string(), logging.release_probe()));

        let control = Arc::new(ServerHandle::allocate_port_and_create_for(
            ControlService::new(client_pool.sink()),
            &runtime,
        )?);
        scope.register("control", control.clone());
        last_run.probes.push(("control".to_string(), control.release_probe()));

        let data = Arc::new(ServerHandle::allocate_port_and_create_for(
            DataService::new(),
            data_executor.handle(),
        )?);
        scope.register("data", data.clone());
        last_run.probes.push(("data".to_string(), data.release_probe()));

        let state = Arc::new(ServerHandle::allocate_port_and_create_for(
            StateService::new(),
            &runtime,
        )?);
        scope.register("state", state.clone());
        last_run.probes.push(("state".to_string(), state.release_probe()));

        let environment_factory: Arc<dyn EnvironmentFactory> =
            Arc::new(InProcessEnvironmentFactory::create(
                self.config.options.clone(),
                &logging,
                &control,
                client_pool.source(),
                self.functions.clone(),
            ));
        let job_bundle_factory = Arc::new(DirectJobBundleFactory::create(
            environment_factory,
            data.clone(),
            state.clone(),
        ));
        // Closed first: workers stop while the control service is still up
        scope.register("job bundle factory", job_bundle_factory.clone());

        let mut evaluators = TransformEvaluatorRegistry::portable_registry(
            &self.graph,
            bundle_factory.clone(),
            job_bundle_factory,
        )?;
        for (urn, evaluator) in &self.evaluator_overrides {
            evaluators = evaluators.with_evaluator(urn.clone(), evaluator.clone());
        }

        let ctx = Arc::new(EvaluationContext::create(
            Arc::new(SystemClock),
            bundle_factory,
            self.graph.clone(),
            self.keyed_pcollections(),
        ));
        last_run.context = Some(ctx.clone());

        let executor = ParallelExecutor::create(
            parallelism,
            root_registry,
            evaluators,
            self.graph.clone(),
            ctx.clone(),
        );
        info!(
            nodes = self.graph.nodes().len(),
            parallelism,
            logging = %logging.endpoint().url,
            control = %control.endpoint().url,
            data = %data.endpoint().url,
            state = %state.endpoint().url,
            "Starting run"
        );
        executor.start()?;
        let state = executor.wait_until_finish(self.config.wait()).await?;

        Ok(RunResult {
            state,
            committed: self
                .output_pcollections()
                .into_iter()
                .map(|pc| {
                    let count = ctx.committed_bundles(&pc).iter().map(|b| b.len()).sum();
                    (pc, count)
                })
                .collect(),
        })
    }

    /// Outputs of group-by-key-only nodes carry keyed bundles
    fn keyed_pcollections(&self) -> HashSet<String> {
        self.graph
            .nodes()
            .iter()
            .filter_map(|node| self.graph.transform(node).ok())
            .filter(|transform| transform.urn() == urns::DIRECT_GBKO)
            .flat_map(|transform| transform.outputs.values().cloned())
            .collect()
    }

    /// Pcollections produced but consumed by no node
    fn output_pcollections(&self) -> Vec<String> {
        let mut outputs: Vec<String> = self
            .graph
            .nodes()
            .iter()
            .flat_map(|node| self.graph.outputs(node))
            .filter(|pc| self.graph.per_element_consumers(pc).is_empty())
            .map(str::to_string)
            .collect();
        outputs.sort();
        outputs
    }

    /// Elements committed to `pcollection` in the last run
    pub fn committed_output(&self, pcollection: &str) -> Vec<WindowedValue> {
        let last_run = self.last_run.lock().unwrap_or_else(PoisonError::into_inner);
        last_run
            .as_ref()
            .and_then(|run| run.context.as_ref())
            .map(|ctx| {
                ctx.committed_bundles(pcollection)
                    .iter()
                    .flat_map(|bundle| bundle.elements().iter().cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Releases performed by the last run's teardown
    pub fn teardown_report(&self) -> Option<TeardownReport> {
        let last_run = self.last_run.lock().unwrap_or_else(PoisonError::into_inner);
        last_run.as_ref().map(|run| TeardownReport {
            services: run
                .probes
                .iter()
                .map(|(name, probe)| (name.clone(), probe.count()))
                .collect(),
            data_executor_shut_down: run
                .data_executor
                .as_ref()
                .map(|executor| executor.is_shut_down())
                .unwrap_or(false),
            failures: run.failures.clone(),
        })
    }
}
