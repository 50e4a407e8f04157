//! Pipeline file loading

use anyhow::{Context, Result};
use conduit_core::Pipeline;
use std::path::Path;
use tracing::debug;

/// Load a pipeline from a `.json` or `.yaml`/`.yml` file.
///
/// Other extensions are read as YAML, which also accepts JSON.
pub fn load_pipeline(path: &Path) -> Result<Pipeline> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read pipeline {}", path.display()))?;

    let pipeline = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Pipeline::from_json(&content),
        _ => Pipeline::from_yaml(&content),
    }
    .with_context(|| format!("failed to parse pipeline {}", path.display()))?;

    debug!(
        path = %path.display(),
        transforms = pipeline.components.transforms.len(),
        roots = pipeline.root_transform_ids.len(),
        "Loaded pipeline"
    );
    Ok(pipeline)
}
