//! Workflow Graph Rewriter
//!
//! Drives a translation from a compiled CWL workflow to a Compute workflow
//! spec. The pass is linear and fail-fast: the first fatal condition aborts
//! the translation and nothing is emitted.
//!
//! # Phases
//!
//! 1. Strip document metadata, attach name and driver
//! 2. Per step, in document order: rewrite the job inputs it owns or binds,
//!    flatten bindings, inline the run definition
//! 3. Rename every qualified name used as a key or as a dependency reference
//! 4. Rewrite the job inputs no step claimed
//! 5. Verify that every dependency reference still resolves

use std::collections::{HashMap, HashSet};
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, info, warn};
use serde_json::{Map, Value};

use super::paths::PathRewriter;
use super::resolver::{RunResolver, ToolCatalog};
use crate::config::TranslationConfig;
use crate::error::{Result, TranslateError};
use crate::naming::qualified::OUTPUT_SEPARATOR;
use crate::naming::{QualifiedName, Reference};
use crate::registry::PluginRegistry;
use crate::workflow::model::{ComputeWorkflow, CwlStep, CwlWorkflow, JobInputs, RunDefinition};
use crate::workflow::parser::{load_job_inputs, load_workflow};
use crate::workflow::validator::{binding_sources, validate_bindings, validate_references};

/// Document class of a compiled workflow.
pub const WORKFLOW_CLASS: &str = "Workflow";

/// Top-level keys the Compute spec defines itself.
const RESERVED_KEYS: [&str; 3] = ["name", "driver", "cwlJobInputs"];

/// Translates compiled workflows into Compute workflow specs.
///
/// The tool catalog and the plugin registry are loaded by the caller and
/// only read here.
#[derive(Debug, Clone)]
pub struct Translator<'a> {
    config: TranslationConfig,
    paths: PathRewriter,
    catalog: &'a ToolCatalog,
    registry: &'a PluginRegistry,
}

impl<'a> Translator<'a> {
    pub fn new(
        config: TranslationConfig,
        catalog: &'a ToolCatalog,
        registry: &'a PluginRegistry,
    ) -> Self {
        let paths = PathRewriter::from_config(&config);
        Self {
            config,
            paths,
            catalog,
            registry,
        }
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    /// Loads a compiled workflow and its job inputs, then translates them.
    ///
    /// The spec is named after the workflow file's stem.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use std::path::Path;
    /// use cwl2compute::config::TranslationConfig;
    /// use cwl2compute::registry::PluginRegistry;
    /// use cwl2compute::translate::{ToolCatalog, Translator};
    ///
    /// fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let catalog = ToolCatalog::from_dir(Path::new("autogenerated/cwl_adapters"))?;
    ///     let registry = PluginRegistry::load_default()?;
    ///     let translator = Translator::new(TranslationConfig::default(), &catalog, &registry);
    ///
    ///     let spec = translator.translate_files(
    ///         Path::new("autogenerated/viz_workflow.cwl"),
    ///         Path::new("autogenerated/viz_workflow_inputs.yml"),
    ///     )?;
    ///     println!("{} steps", spec.steps.len());
    ///     Ok(())
    /// }
    /// ```
    pub fn translate_files(
        &self,
        workflow_path: &Path,
        job_inputs_path: &Path,
    ) -> Result<ComputeWorkflow> {
        let workflow = load_workflow(workflow_path)?;
        let job_inputs = load_job_inputs(job_inputs_path)?;

        let name = workflow_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| {
                TranslateError::invalid(
                    "workflow path",
                    format!("cannot derive a name from {}", workflow_path.display()),
                )
            })?;

        self.translate(name, workflow, job_inputs)
    }

    /// Translates an in-memory workflow document.
    pub fn translate(
        &self,
        name: &str,
        workflow: CwlWorkflow,
        mut job_inputs: JobInputs,
    ) -> Result<ComputeWorkflow> {
        info!(
            "Translating workflow '{}' ({} steps, {} job inputs)",
            name,
            workflow.steps.len(),
            job_inputs.len()
        );

        if let Some(class) = workflow.class.as_deref() {
            if class != WORKFLOW_CLASS {
                return Err(TranslateError::invalid(
                    "workflow document",
                    format!("expected class '{}', found '{}'", WORKFLOW_CLASS, class),
                ));
            }
        }

        // class, cwlVersion, $namespaces and $schemas are dropped here.
        let CwlWorkflow {
            inputs,
            outputs,
            mut steps,
            mut extra,
            ..
        } = workflow;

        for key in RESERVED_KEYS {
            if extra.remove(key).is_some() {
                warn!("Dropping top-level '{}' from the compiled workflow", key);
            }
        }

        let resolver = RunResolver::new(self.catalog, self.registry);
        let mut claimed = HashSet::new();
        for (step_key, step) in steps.iter_mut() {
            self.prepare_step(&resolver, step_key, step, &mut job_inputs, &mut claimed)?;
        }

        let renamer = ReferenceRenamer::new(&inputs, &steps);

        let steps: IndexMap<String, CwlStep> = rename_keys("steps", steps)?
            .into_iter()
            .map(|(key, _, mut step)| {
                for binding in step.bindings.values_mut() {
                    renamer.rename_binding(binding);
                }
                (key, step)
            })
            .collect();

        let outputs: Map<String, Value> = rename_keys("outputs", outputs)?
            .into_iter()
            .map(|(key, _, mut output)| {
                renamer.rename_output(&mut output);
                (key, output)
            })
            .collect();

        let inputs: Map<String, Value> = rename_keys("inputs", inputs)?
            .into_iter()
            .map(|(key, _, input)| (key, input))
            .collect();

        let renamed_job_inputs = rename_keys("job inputs", job_inputs)?;
        let job_inputs = self.rewrite_unclaimed(renamed_job_inputs, &claimed);

        let compute = ComputeWorkflow {
            name: name.to_string(),
            driver: self.config.driver.clone(),
            job_inputs,
            inputs,
            outputs,
            steps,
            extra,
        };

        validate_references(&compute)?;

        info!(
            "Translated '{}' for driver '{}': steps {:?}",
            compute.name,
            compute.driver,
            compute.steps.keys().collect::<Vec<_>>()
        );
        Ok(compute)
    }

    /// Step-local work: job-input paths, binding form, run definition.
    fn prepare_step(
        &self,
        resolver: &RunResolver<'_>,
        step_key: &str,
        step: &mut CwlStep,
        job_inputs: &mut JobInputs,
        claimed: &mut HashSet<String>,
    ) -> Result<()> {
        let qualified = QualifiedName::parse(step_key).ok();
        if qualified.is_none() {
            debug!("Step '{}' is not a qualified name, keeping it as is", step_key);
        }
        let step_name = qualified.as_ref().map_or(step_key, |name| name.step.as_str());

        self.rewrite_step_inputs(qualified.as_ref(), &step.bindings, job_inputs, claimed);

        if self.config.paths_as_strings {
            flatten_bindings(step);
        }

        let definition = match &step.run {
            RunDefinition::Reference(run) => resolver.resolve(step_name, run)?,
            RunDefinition::Inline(definition) => {
                let tool = definition.name().unwrap_or(step_name).to_string();
                resolver.complete(step_name, &tool, definition.clone())?
            }
        };

        validate_bindings(step_key, step, &definition)?;
        step.run = RunDefinition::Inline(definition);
        Ok(())
    }

    /// Rewrites the job inputs a step owns or binds.
    fn rewrite_step_inputs(
        &self,
        step: Option<&QualifiedName>,
        bindings: &Map<String, Value>,
        job_inputs: &mut JobInputs,
        claimed: &mut HashSet<String>,
    ) {
        let sources: HashSet<&str> = bindings.values().flat_map(binding_sources).collect();

        let keys: Vec<String> = job_inputs
            .keys()
            .filter(|key| !claimed.contains(key.as_str()))
            .filter(|key| {
                sources.contains(key.as_str())
                    || step.is_some_and(|step| {
                        QualifiedName::parse(key).is_ok_and(|name| name.same_step(step))
                    })
            })
            .cloned()
            .collect();

        for key in keys {
            let owner = QualifiedName::parse(&key).ok();
            if let Some(value) = job_inputs.get_mut(&key) {
                self.paths.rewrite_value(&key, owner.as_ref(), value);
            }
            claimed.insert(key);
        }
    }

    /// Rewrites job inputs no step claimed, using their pre-rename names.
    fn rewrite_unclaimed(
        &self,
        renamed: Vec<(String, String, Value)>,
        claimed: &HashSet<String>,
    ) -> JobInputs {
        renamed
            .into_iter()
            .map(|(key, original, mut value)| {
                if !claimed.contains(&original) {
                    let owner = QualifiedName::parse(&original).ok();
                    self.paths.rewrite_value(&key, owner.as_ref(), &mut value);
                }
                (key, value)
            })
            .collect()
    }
}

/// Replaces `{source: X}` bindings by the plain reference `X`.
fn flatten_bindings(step: &mut CwlStep) {
    for binding in step.bindings.values_mut() {
        let source = match binding {
            Value::Object(map) if map.len() == 1 => {
                map.get("source").and_then(Value::as_str).map(str::to_string)
            }
            _ => None,
        };
        if let Some(source) = source {
            *binding = Value::String(source);
        }
    }
}

/// Renames the keys of a section, rejecting two names that map to one id.
///
/// Returns `(new key, original key, value)` triples in input order.
fn rename_keys<V>(
    section: &'static str,
    entries: impl IntoIterator<Item = (String, V)>,
) -> Result<Vec<(String, String, V)>> {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut renamed = Vec::new();

    for (key, value) in entries {
        let new_key = QualifiedName::parse(&key)
            .map(|name| name.target_id())
            .unwrap_or_else(|_| key.clone());

        if let Some(first) = seen.insert(new_key.clone(), key.clone()) {
            return Err(TranslateError::NameCollision {
                section,
                first,
                second: key,
                renamed: new_key,
            });
        }
        if new_key != key {
            debug!("{}: {} -> {}", section, key, new_key);
        }
        renamed.push((new_key, key, value));
    }

    Ok(renamed)
}

/// Renames dependency references against the pre-rename document.
struct ReferenceRenamer {
    inputs: HashSet<String>,
    step_outputs: HashMap<String, Vec<String>>,
}

impl ReferenceRenamer {
    fn new(inputs: &Map<String, Value>, steps: &IndexMap<String, CwlStep>) -> Self {
        Self {
            inputs: inputs.keys().cloned().collect(),
            step_outputs: steps
                .iter()
                .map(|(key, step)| (key.clone(), step.output_names()))
                .collect(),
        }
    }

    /// Target form of a reference. Literals come back unchanged.
    ///
    /// A parameter-form reference naming an output of a step, rather than a
    /// workflow input, becomes a `step/output` reference.
    fn rename(&self, value: &str) -> String {
        match Reference::parse(value) {
            Ok(Reference::Input(name)) => match &name.param {
                Some(param) if !self.inputs.contains(value) && self.is_step_output(&name, param) => {
                    format!("{}{}{}", name.sanitized_step(), OUTPUT_SEPARATOR, param)
                }
                _ => name.target_id(),
            },
            Ok(reference) => reference.renamed(),
            Err(_) => value.to_string(),
        }
    }

    fn is_step_output(&self, name: &QualifiedName, param: &str) -> bool {
        let step_key = QualifiedName::new(&name.workflow, name.ordinal, &name.step).to_string();
        self.step_outputs
            .get(&step_key)
            .is_some_and(|outputs| outputs.iter().any(|output| output == param))
    }

    fn rename_sources(&self, sources: &mut Value) {
        match sources {
            Value::String(source) => {
                let renamed = self.rename(source);
                *source = renamed;
            }
            Value::Array(items) => items.iter_mut().for_each(|item| self.rename_sources(item)),
            _ => {}
        }
    }

    fn rename_binding(&self, binding: &mut Value) {
        match binding {
            Value::Object(map) => {
                if let Some(sources) = map.get_mut("source") {
                    self.rename_sources(sources);
                }
            }
            other => self.rename_sources(other),
        }
    }

    fn rename_output(&self, output: &mut Value) {
        if let Some(sources) = output.get_mut("outputSource") {
            self.rename_sources(sources);
        }
    }
}
