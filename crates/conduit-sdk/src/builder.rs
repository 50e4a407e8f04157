//! Builder for [`ReferenceRunner`]

use crate::config::RunnerConfig;
use crate::error::{Result, SdkError};
use crate::runner::ReferenceRunner;
use conduit_core::{Pipeline, Value};
use conduit_runtime::services::LogWriter;
use conduit_runtime::{FunctionRegistry, TracingLogWriter, TransformEvaluator};
use std::sync::Arc;

/// Builder for a [`ReferenceRunner`]
///
/// # Example
///
/// ```rust,ignore
/// use conduit_sdk::RunnerBuilder;
///
/// let runner = RunnerBuilder::new()
///     .with_pipeline(pipeline)
///     .with_function("double", |v| Ok(vec![Value::Int(v.as_int().unwrap_or(0) * 2)]))
///     .build()?;
/// let result = runner.execute().await?;
/// ```
pub struct RunnerBuilder {
    pipeline: Option<Pipeline>,
    config: RunnerConfig,
    functions: FunctionRegistry,
    evaluators: Vec<(String, Arc<dyn TransformEvaluator>)>,
    log_writer: Arc<dyn LogWriter>,
}

impl RunnerBuilder {
    /// Start from the default configuration and the built-in functions
    pub fn new() -> Self {
        Self {
            pipeline: None,
            config: RunnerConfig::default(),
            functions: FunctionRegistry::with_builtins(),
            evaluators: Vec::new(),
            log_writer: Arc::new(TracingLogWriter),
        }
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Replace the whole configuration; options set earlier are kept
    /// unless the new configuration carries its own
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        let options = std::mem::take(&mut self.config.options);
        self.config = config;
        if self.config.options.is_empty() {
            self.config.options = options;
        }
        self
    }

    pub fn with_options(mut self, options: serde_json::Map<String, serde_json::Value>) -> Self {
        self.config.options = options;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.options.insert(key.into(), value);
        self
    }

    /// Register an element-wise function workers can run by name
    pub fn with_function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        self.functions.register_map(name, f);
        self
    }

    /// Register a function that also sees the state stored under the
    /// element's key
    pub fn with_stateful_function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> anyhow::Result<(Vec<Value>, Vec<Value>)>
            + Send
            + Sync
            + 'static,
    {
        self.functions.register_stateful(name, f);
        self
    }

    /// Evaluate nodes of `urn` with `evaluator` instead of the default one
    pub fn with_evaluator(
        mut self,
        urn: impl Into<String>,
        evaluator: Arc<dyn TransformEvaluator>,
    ) -> Self {
        self.evaluators.push((urn.into(), evaluator));
        self
    }

    pub fn with_log_writer(mut self, writer: Arc<dyn LogWriter>) -> Self {
        self.log_writer = writer;
        self
    }

    pub fn with_data_threads(mut self, threads: usize) -> Self {
        self.config.data_threads = threads;
        self
    }

    pub fn with_target_parallelism(mut self, parallelism: usize) -> Self {
        self.config.target_parallelism_override = Some(parallelism);
        self
    }

    /// Compile the pipeline and create the runner
    pub fn build(self) -> Result<ReferenceRunner> {
        let pipeline = self
            .pipeline
            .ok_or_else(|| SdkError::InvalidArgument("no pipeline given".to_string()))?;
        ReferenceRunner::from_parts(
            &pipeline,
            self.config,
            self.functions,
            self.evaluators,
            self.log_writer,
        )
    }
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
