//! Workflow Validation
//!
//! Checks applied around the graph rewrite:
//! - Step bindings against the parameters their tool declares
//! - Reference integrity of the rewritten document (no dangling sources)

use std::collections::{HashMap, HashSet};

use log::{debug, info};
use serde_json::Value;

use super::model::{ComputeWorkflow, CwlStep, ToolDefinition};
use crate::error::{Result, TranslateError};
use crate::naming::qualified::OUTPUT_SEPARATOR;

/// Validates a step's bindings against its tool definition.
///
/// Every bound input and every listed output must be declared by the tool.
/// Tools that do not declare a section are not checked for it.
pub fn validate_bindings(step_id: &str, step: &CwlStep, tool: &ToolDefinition) -> Result<()> {
    let tool_name = tool.name().unwrap_or(step_id).to_string();

    if let Some(declared) = tool.declared_inputs() {
        let declared: HashSet<&str> = declared.iter().map(String::as_str).collect();
        if let Some(param) = step.bindings.keys().find(|p| !declared.contains(p.as_str())) {
            return Err(TranslateError::UnknownParameter {
                step: step_id.to_string(),
                tool: tool_name,
                direction: "input",
                param: param.clone(),
            });
        }
    }

    if let Some(declared) = tool.declared_outputs() {
        if let Some(output) = step
            .output_names()
            .into_iter()
            .find(|o| !declared.contains(o))
        {
            return Err(TranslateError::UnknownParameter {
                step: step_id.to_string(),
                tool: tool_name,
                direction: "output",
                param: output,
            });
        }
    }

    debug!("Step '{}' bindings match tool '{}'", step_id, tool_name);
    Ok(())
}

/// Extracts the source references of a step binding.
///
/// Handles plain string bindings, `{source: ...}` objects and multi-source
/// lists. Bindings without a source (defaults, literals) yield nothing.
pub fn binding_sources(binding: &Value) -> Vec<&str> {
    match binding {
        Value::String(source) => vec![source.as_str()],
        Value::Object(map) => match map.get("source") {
            Some(Value::String(source)) => vec![source.as_str()],
            Some(Value::Array(sources)) => sources.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Verifies that every dependency reference of a Compute workflow resolves.
///
/// `step/output` references must name an existing step and one of its
/// outputs; bare references must name a workflow input.
pub fn validate_references(workflow: &ComputeWorkflow) -> Result<()> {
    let step_outputs: HashMap<&str, Vec<String>> = workflow
        .steps
        .iter()
        .map(|(id, step)| (id.as_str(), step.output_names()))
        .collect();

    let check = |location: String, reference: &str| -> Result<()> {
        let resolves = match reference.split_once(OUTPUT_SEPARATOR) {
            Some((step, output)) => step_outputs
                .get(step)
                .is_some_and(|outputs| outputs.iter().any(|o| o == output)),
            None => workflow.inputs.contains_key(reference),
        };

        if resolves {
            Ok(())
        } else {
            Err(TranslateError::DanglingReference {
                location,
                reference: reference.to_string(),
            })
        }
    };

    let mut checked = 0;
    for (step_id, step) in &workflow.steps {
        for (param, binding) in &step.bindings {
            for source in binding_sources(binding) {
                check(format!("step '{}' input '{}'", step_id, param), source)?;
                checked += 1;
            }
        }
    }

    for (output_id, output) in &workflow.outputs {
        if let Some(source) = output.get("outputSource").and_then(Value::as_str) {
            check(format!("workflow output '{}'", output_id), source)?;
            checked += 1;
        }
    }

    info!("Verified {} dependency references", checked);
    Ok(())
}
