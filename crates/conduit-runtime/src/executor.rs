//! Parallel executor
//!
//! A single driver task owns all scheduling state. Evaluations run on a
//! semaphore-bounded set of tasks and report back to the driver, which feeds
//! committed bundles to their consumers and fires `InputsExhausted` once a
//! node's producers are all finished.

use crate::bundle::CommittedBundle;
use crate::context::EvaluationContext;
use crate::error::{Result, RuntimeError};
use crate::evaluator::{EvaluatorInput, RootProviderRegistry, TransformEvaluatorRegistry};
use conduit_compiler::ExecutableGraph;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

/// Lower bound on scheduling parallelism
pub const MIN_PARALLELISM: usize = 3;

/// Parallelism for a machine with `available` hardware threads
pub fn target_parallelism(available: usize) -> usize {
    available.max(MIN_PARALLELISM)
}

/// Observed state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Done,
}

pub struct ParallelExecutor {
    target_parallelism: usize,
    root_registry: Arc<RootProviderRegistry>,
    evaluators: Arc<TransformEvaluatorRegistry>,
    graph: Arc<ExecutableGraph>,
    ctx: Arc<EvaluationContext>,
    driver: Mutex<Option<JoinHandle<Result<()>>>>,
    started: AtomicBool,
    finished: AtomicBool,
}

impl ParallelExecutor {
    pub fn create(
        target_parallelism: usize,
        root_registry: RootProviderRegistry,
        evaluators: TransformEvaluatorRegistry,
        graph: Arc<ExecutableGraph>,
        ctx: Arc<EvaluationContext>,
    ) -> Self {
        Self {
            target_parallelism: target_parallelism.max(1),
            root_registry: Arc::new(root_registry),
            evaluators: Arc::new(evaluators),
            graph,
            ctx,
            driver: Mutex::new(None),
            started: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &Arc<EvaluationContext> {
        &self.ctx
    }

    /// Spawn the driver and return immediately
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::Executor("executor already started".to_string()));
        }
        let driver = Driver {
            graph: self.graph.clone(),
            ctx: self.ctx.clone(),
            evaluators: self.evaluators.clone(),
            root_registry: self.root_registry.clone(),
            permits: Arc::new(Semaphore::new(self.target_parallelism)),
            tasks: JoinSet::new(),
            progress: self
                .graph
                .nodes()
                .iter()
                .map(|node| (node.clone(), NodeProgress::default()))
                .collect(),
        };
        let handle = tokio::spawn(driver.run(self.target_parallelism));
        match self.driver.try_lock() {
            Ok(mut slot) => {
                *slot = Some(handle);
                Ok(())
            }
            Err(_) => {
                handle.abort();
                Err(RuntimeError::Executor("executor is being awaited".to_string()))
            }
        }
    }

    /// Wait for the run to end. A zero `wait` waits indefinitely; otherwise
    /// `State::Running` is returned when `wait` elapses first.
    pub async fn wait_until_finish(&self, wait: Duration) -> Result<State> {
        let mut slot = self.driver.lock().await;
        let Some(driver) = slot.as_mut() else {
            return if self.finished.load(Ordering::SeqCst) {
                Ok(State::Done)
            } else {
                Err(RuntimeError::Executor("executor not started".to_string()))
            };
        };

        let joined = if wait.is_zero() {
            driver.await
        } else {
            match tokio::time::timeout(wait, driver).await {
                Ok(joined) => joined,
                Err(_) => return Ok(State::Running),
            }
        };
        *slot = None;
        self.finished.store(true, Ordering::SeqCst);

        match joined {
            Ok(Ok(())) => Ok(State::Done),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(RuntimeError::Executor(format!("driver task failed: {}", e))),
        }
    }
}

impl Drop for ParallelExecutor {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.abort();
        }
    }
}

#[derive(Debug, Default)]
struct NodeProgress {
    in_flight: usize,
    exhausted_scheduled: bool,
    finished: bool,
}

struct WorkOutcome {
    node: String,
    exhausted: bool,
    result: Result<Vec<CommittedBundle>>,
}

struct Driver {
    graph: Arc<ExecutableGraph>,
    ctx: Arc<EvaluationContext>,
    evaluators: Arc<TransformEvaluatorRegistry>,
    root_registry: Arc<RootProviderRegistry>,
    permits: Arc<Semaphore>,
    tasks: JoinSet<WorkOutcome>,
    progress: HashMap<String, NodeProgress>,
}

impl Driver {
    async fn run(mut self, parallelism: usize) -> Result<()> {
        info!(
            nodes = self.graph.nodes().len(),
            parallelism, "Executor started"
        );

        let roots: Vec<String> = self
            .graph
            .root_transforms()
            .into_iter()
            .map(str::to_string)
            .collect();
        for root in &roots {
            for bundle in self.root_registry.initial_inputs(root, &self.ctx)? {
                self.schedule(root, EvaluatorInput::Bundle(bundle))?;
            }
        }

        loop {
            self.fire_exhausted()?;
            if self.progress.values().all(|p| p.finished) {
                break;
            }

            let Some(joined) = self.tasks.join_next().await else {
                return Err(RuntimeError::Executor(
                    "no work in flight but nodes remain unfinished".to_string(),
                ));
            };
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    let failure = RuntimeError::Executor(format!("evaluation task failed: {}", e));
                    return self.fail(failure).await;
                }
            };

            if let Some(progress) = self.progress.get_mut(&outcome.node) {
                progress.in_flight -= 1;
                if outcome.exhausted {
                    progress.finished = true;
                    debug!(node = %outcome.node, "Node finished");
                }
            }

            match outcome.result {
                Ok(bundles) => {
                    for bundle in bundles {
                        self.deliver(bundle)?;
                    }
                }
                Err(e) => {
                    self.ctx.metrics().evaluation_failures.inc();
                    return self.fail(e).await;
                }
            }
        }

        let metrics = self.ctx.metrics();
        info!(
            bundles = metrics.bundles_committed.get(),
            elements = metrics.elements_committed.get(),
            "Executor finished"
        );
        Ok(())
    }

    fn deliver(&mut self, bundle: CommittedBundle) -> Result<()> {
        let Some(pcollection) = bundle.pcollection() else {
            return Ok(());
        };
        let consumers = self.graph.per_element_consumers(pcollection).to_vec();
        for consumer in consumers {
            self.schedule(&consumer, EvaluatorInput::Bundle(bundle.clone()))?;
        }
        Ok(())
    }

    /// Fire `InputsExhausted` on every node whose producers have all finished
    /// and which has no work outstanding
    fn fire_exhausted(&mut self) -> Result<()> {
        let ready: Vec<String> = self
            .graph
            .nodes()
            .iter()
            .filter(|node| {
                let progress = &self.progress[node.as_str()];
                !progress.exhausted_scheduled
                    && progress.in_flight == 0
                    && self
                        .graph
                        .upstream(node)
                        .iter()
                        .all(|up| self.progress.get(*up).map(|p| p.finished).unwrap_or(true))
            })
            .cloned()
            .collect();

        for node in ready {
            if let Some(progress) = self.progress.get_mut(&node) {
                progress.exhausted_scheduled = true;
            }
            self.schedule(&node, EvaluatorInput::InputsExhausted)?;
        }
        Ok(())
    }

    fn schedule(&mut self, node: &str, input: EvaluatorInput) -> Result<()> {
        let evaluator = self.evaluators.evaluator_for(&self.graph, node)?;
        if let Some(progress) = self.progress.get_mut(node) {
            progress.in_flight += 1;
        }
        debug!(node, input = %input, "Scheduling");

        let exhausted = matches!(input, EvaluatorInput::InputsExhausted);
        let permits = self.permits.clone();
        let ctx = self.ctx.clone();
        let node = node.to_string();
        self.tasks.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => {
                    let started = Instant::now();
                    let result = evaluator
                        .evaluate(&node, input, &ctx)
                        .await
                        .and_then(|result| ctx.handle_result(result));
                    ctx.metrics().bundle_duration.observe_duration(started.elapsed());
                    result
                }
                Err(_) => Err(RuntimeError::Executor("scheduler closed".to_string())),
            };
            WorkOutcome {
                node,
                exhausted,
                result,
            }
        });
        Ok(())
    }

    /// Stop scheduling, let in-flight work drain and report `failure`
    async fn fail(&mut self, failure: RuntimeError) -> Result<()> {
        error!(error = %failure, "Execution failed");
        while let Some(joined) = self.tasks.join_next().await {
            if let Ok(WorkOutcome {
                node,
                result: Err(e),
                ..
            }) = joined
            {
                debug!(node = %node, error = %e, "Further failure while draining");
            }
        }
        Err(failure)
    }
}
