//! Command line arguments

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Run a pipeline with the reference runner.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "conduit")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Pipeline definition (JSON or YAML).
    #[arg(value_name = "PIPELINE")]
    pub pipeline: PathBuf,

    /// Runner configuration file; `config/runner` when absent.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Write the elements of every output pcollection to stdout.
    #[arg(long)]
    pub print_outputs: bool,
}
