//! Conduit CLI library
//!
//! Argument parsing and pipeline loading, kept out of `main.rs` so they can
//! be tested.

pub mod args;
pub mod loader;

pub use args::{CliArgs, LogFormat};
pub use loader::load_pipeline;
