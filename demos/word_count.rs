//! Word count example
//!
//! This example demonstrates:
//! - Describing a pipeline with a composite group-by-key
//! - Registering worker functions with the runner builder
//! - Inspecting the committed output of a run

use conduit_core::{
    urns, Coder, Components, Environment, PCollection, PTransform, Pipeline, WindowingStrategy,
};
use conduit_sdk::{RunnerBuilder, Value};

const TEXT: &[&str] = &[
    "the quick brown fox",
    "jumps over the lazy dog",
    "the dog sleeps",
];

fn word_count_pipeline() -> Pipeline {
    let pardo = |name: &str, function: &str, input: &str, output: &str| {
        PTransform::new(name, urns::PAR_DO)
            .with_payload(serde_json::json!({ "function": function }))
            .with_input("in", input)
            .with_output("out", output)
            .with_environment("env")
    };

    let components = Components::new()
        .with_coder("bytes", Coder::new(urns::BYTES_CODER))
        .with_coder("str", Coder::new(urns::STRING_UTF8_CODER))
        .with_coder("varint", Coder::new(urns::VARINT_CODER))
        .with_coder("kv", Coder::kv("str", "varint"))
        .with_coder("gw", Coder::new(urns::GLOBAL_WINDOW_CODER))
        .with_windowing_strategy("global", WindowingStrategy::global("gw"))
        .with_environment("env", Environment::in_process())
        .with_pcollection("impulse", PCollection::new("impulse", "bytes", "global"))
        .with_pcollection("lines", PCollection::new("lines", "str", "global"))
        .with_pcollection("words", PCollection::new("words", "kv", "global"))
        .with_pcollection("grouped", PCollection::new("grouped", "kv", "global"))
        .with_pcollection("counts", PCollection::new("counts", "kv", "global"))
        .with_transform(
            "read",
            PTransform::new("Read", urns::IMPULSE).with_output("out", "impulse"),
        )
        .with_transform("lines", pardo("Lines", "lines", "impulse", "lines"))
        .with_transform("split", pardo("Split", "split", "lines", "words"))
        .with_transform(
            "group",
            PTransform::new("Group", urns::GROUP_BY_KEY)
                .with_input("input", "words")
                .with_output("output", "grouped"),
        )
        .with_transform("sum", pardo("Sum", "sum", "grouped", "counts"));

    Pipeline::new(
        components,
        ["read", "lines", "split", "group", "sum"]
            .iter()
            .map(|id| id.to_string())
            .collect(),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("conduit_sdk=info"))
        .init();

    println!("=== Word Count Example ===\n");

    let runner = RunnerBuilder::new()
        .with_pipeline(word_count_pipeline())
        .with_function("lines", |_| {
            Ok(TEXT.iter().map(|line| Value::from(*line)).collect())
        })
        .with_function("split", |line| {
            let line = line.as_str().unwrap_or_default();
            Ok(line
                .split_whitespace()
                .map(|word| Value::kv(word, 1i64))
                .collect())
        })
        .with_function("sum", |grouped| {
            let (word, ones) = grouped
                .as_kv()
                .ok_or_else(|| anyhow::anyhow!("expected a grouped pair, got {}", grouped))?;
            let count = match ones {
                Value::Array(ones) => ones.iter().filter_map(Value::as_int).sum::<i64>(),
                other => anyhow::bail!("expected grouped values, got {}", other),
            };
            Ok(vec![Value::kv(word.clone(), count)])
        })
        .build()?;

    println!("Executable pipeline:");
    for id in &runner.executable_pipeline().root_transform_ids {
        println!("  {}", id);
    }
    println!();

    let result = runner.execute().await?;
    println!("Run finished: {:?}\n", result.state);

    let mut counts: Vec<(String, i64)> = runner
        .committed_output("counts")
        .into_iter()
        .filter_map(|element| {
            let (word, count) = element.value.as_kv()?;
            Some((word.as_str()?.to_string(), count.as_int()?))
        })
        .collect();
    counts.sort();

    println!("Counts:");
    for (word, count) in counts {
        println!("  {:<8} {}", word, count);
    }

    Ok(())
}
