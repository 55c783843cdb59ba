//! Document Loading
//!
//! Reads the documents a translation consumes and writes the spec it
//! produces. CWL and job-input documents are YAML (JSON is accepted as
//! the YAML subset it is); the Compute spec is written as JSON.

use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::de::DeserializeOwned;

use super::model::{ComputeWorkflow, CwlWorkflow, JobInputs, ToolDefinition};
use crate::error::{Result, TranslateError};

/// Reads and deserializes a YAML document.
///
/// `what` names the document in errors, e.g. "workflow document".
pub fn read_yaml<T: DeserializeOwned>(path: &Path, what: &'static str) -> Result<T> {
    if !path.exists() {
        return Err(TranslateError::MissingArtifact {
            what,
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path).map_err(|source| TranslateError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("Read {} '{}' ({} bytes)", what, path.display(), content.len());

    serde_yaml::from_str(&content).map_err(|source| TranslateError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads a compiled workflow document.
///
/// # Example
///
/// ```rust,no_run
/// use std::path::Path;
/// use cwl2compute::workflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow(Path::new("autogenerated/viz_workflow.cwl"))?;
///     println!("Loaded {} steps", workflow.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_workflow(path: &Path) -> Result<CwlWorkflow> {
    info!("Loading workflow from: {}", path.display());

    let workflow: CwlWorkflow = read_yaml(path, "workflow document")?;

    info!(
        "Parsed {} steps, {} inputs, {} outputs",
        workflow.steps.len(),
        workflow.inputs.len(),
        workflow.outputs.len()
    );
    Ok(workflow)
}

/// Loads the job-input document generated alongside a compiled workflow.
///
/// An empty document yields an empty mapping.
pub fn load_job_inputs(path: &Path) -> Result<JobInputs> {
    info!("Loading job inputs from: {}", path.display());

    let inputs: Option<JobInputs> = read_yaml(path, "job inputs")?;
    let inputs = inputs.unwrap_or_default();

    debug!("Parsed {} job inputs", inputs.len());
    Ok(inputs)
}

/// Loads a materialized tool definition.
pub fn load_tool_definition(path: &Path) -> Result<ToolDefinition> {
    read_yaml(path, "tool definition")
}

/// Writes a Compute workflow spec as pretty-printed JSON.
///
/// Parent directories are created as needed.
pub fn save_compute_workflow(workflow: &ComputeWorkflow, path: &Path) -> Result<()> {
    let io_error = |source| TranslateError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let json = serde_json::to_string_pretty(workflow)?;
    fs::write(path, json).map_err(io_error)?;

    info!("Compute workflow saved to: {}", path.display());
    Ok(())
}
