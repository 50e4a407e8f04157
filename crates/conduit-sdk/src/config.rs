//! Runner configuration

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings of one runner instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Pipeline options handed to worker environments
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,

    /// Threads of the dedicated data-plane runtime
    #[serde(default = "default_data_threads")]
    pub data_threads: usize,

    /// How long `execute` waits for the run; 0 waits until it ends
    #[serde(default)]
    pub wait_millis: u64,

    #[serde(default = "default_enable_fusion")]
    pub enable_fusion: bool,

    /// Fixed scheduling parallelism instead of one derived from the machine
    #[serde(default)]
    pub target_parallelism_override: Option<usize>,
}

fn default_data_threads() -> usize {
    4
}

fn default_enable_fusion() -> bool {
    true
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            options: serde_json::Map::new(),
            data_threads: default_data_threads(),
            wait_millis: 0,
            enable_fusion: default_enable_fusion(),
            target_parallelism_override: None,
        }
    }
}

impl RunnerConfig {
    /// Load from `config/runner.*` and `CONDUIT_*` environment variables,
    /// after reading a `.env` file if one exists
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from(Path::new("config/runner"))
    }

    /// Load from the given file (optional) layered under the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("CONDUIT").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_millis)
    }
}
