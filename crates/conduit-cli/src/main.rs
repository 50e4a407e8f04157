//! Conduit command line runner
//!
//! Loads a pipeline file and runs it with the reference runner.

use anyhow::Result;
use clap::Parser;
use conduit_cli::{load_pipeline, CliArgs, LogFormat};
use conduit_sdk::{RunnerBuilder, RunnerConfig, State};
use std::io::Write;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_format)?;

    let config = match &args.config {
        Some(path) => {
            dotenvy::dotenv().ok();
            RunnerConfig::load_from(path)?
        }
        None => RunnerConfig::load()?,
    };
    info!("Loaded configuration: {:?}", config);

    let pipeline = load_pipeline(&args.pipeline)?;
    let runner = RunnerBuilder::new()
        .with_pipeline(pipeline)
        .with_config(config)
        .build()?;
    info!(
        nodes = runner.executable_pipeline().root_transform_ids.len(),
        parallelism = runner.target_parallelism(),
        "Pipeline compiled"
    );

    let result = runner.execute().await?;
    for (pcollection, count) in &result.committed {
        info!(pcollection = %pcollection, elements = count, "Output committed");
    }
    if result.state == State::Running {
        warn!("Run did not finish within the configured wait");
    }

    if args.print_outputs {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for pcollection in result.committed.keys() {
            for element in runner.committed_output(pcollection) {
                let line = serde_json::json!({ "pcollection": pcollection, "element": element });
                writeln!(out, "{}", line)?;
            }
        }
    }

    if let Some(report) = runner.teardown_report() {
        if !report.is_clean() {
            warn!(?report, "Teardown was not clean");
        }
    }
    Ok(())
}

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "conduit_cli=info,conduit_sdk=info,conduit_runtime=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    let initialized = match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    initialized.map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}
