//! Workflow Data Model
//!
//! Typed views over the documents involved in a translation: the compiled
//! CWL workflow, its job inputs, the tool definitions its steps run and the
//! Compute workflow spec produced from them.
//!
//! # Example Compiled Workflow
//!
//! ```yaml
//! class: Workflow
//! cwlVersion: v1.2
//! inputs:
//!   wf__0__FileRenaming___inpDir: Directory
//! outputs:
//!   wf__1__OmeConverter___outDir:
//!     type: Directory
//!     outputSource: wf__1__OmeConverter/outDir
//! steps:
//!   wf__0__FileRenaming:
//!     run: cwl_adapters/FileRenaming.cwl
//!     in:
//!       inpDir: { source: wf__0__FileRenaming___inpDir }
//!     out: [outDir]
//!   wf__1__OmeConverter:
//!     run: cwl_adapters/OmeConverter.cwl
//!     in:
//!       inpDir: { source: wf__0__FileRenaming/outDir }
//!     out: [outDir]
//! ```

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Job-input document: input name to literal or Directory value.
pub type JobInputs = Map<String, Value>;

/// Class tag carried by directory values.
pub const DIRECTORY_CLASS: &str = "Directory";

/// A compiled CWL workflow as emitted by the workflow compiler.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CwlWorkflow {
    /// Document class, expected to be `Workflow`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,

    #[serde(rename = "cwlVersion", default, skip_serializing_if = "Option::is_none")]
    pub cwl_version: Option<String>,

    #[serde(rename = "$namespaces", default, skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<Value>,

    #[serde(rename = "$schemas", default, skip_serializing_if = "Option::is_none")]
    pub schemas: Option<Value>,

    /// Workflow-level inputs keyed by (qualified) name
    #[serde(default, deserialize_with = "map_or_list")]
    pub inputs: Map<String, Value>,

    /// Workflow-level outputs keyed by (qualified) name
    #[serde(default, deserialize_with = "map_or_list")]
    pub outputs: Map<String, Value>,

    /// Steps in document order
    #[serde(default, deserialize_with = "steps_map_or_list")]
    pub steps: IndexMap<String, CwlStep>,

    /// Remaining top-level properties (requirements, hints, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single step of a compiled workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CwlStep {
    /// Tool the step runs, either a file reference or an inlined definition
    pub run: RunDefinition,

    /// Input parameter name to binding (source object or plain reference)
    #[serde(rename = "in", default, deserialize_with = "map_or_list")]
    pub bindings: Map<String, Value>,

    /// Output parameters the step exposes
    #[serde(default)]
    pub out: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CwlStep {
    /// Creates a step running the tool at `run`.
    pub fn new(run: impl Into<String>) -> Self {
        Self {
            run: RunDefinition::Reference(run.into()),
            bindings: Map::new(),
            out: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Binds an input parameter to a source reference.
    pub fn with_source(mut self, param: impl Into<String>, source: impl Into<String>) -> Self {
        let mut binding = Map::new();
        binding.insert("source".to_string(), Value::String(source.into()));
        self.bindings.insert(param.into(), Value::Object(binding));
        self
    }

    /// Declares an output parameter.
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.out.push(Value::String(output.into()));
        self
    }

    /// Names of the outputs listed in `out`, in either string or `{id}` form.
    pub fn output_names(&self) -> Vec<String> {
        self.out
            .iter()
            .filter_map(|entry| match entry {
                Value::String(name) => Some(name.clone()),
                Value::Object(map) => map.get("id").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect()
    }

    /// The tool reference when the run definition has not been inlined yet.
    pub fn run_reference(&self) -> Option<&str> {
        match &self.run {
            RunDefinition::Reference(path) => Some(path),
            RunDefinition::Inline(_) => None,
        }
    }
}

/// The `run` field of a step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RunDefinition {
    /// Path to a materialized tool definition
    Reference(String),

    /// Full tool definition
    Inline(ToolDefinition),
}

/// A CWL command-line tool definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct ToolDefinition(Map<String, Value>);

impl ToolDefinition {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// Returns the base command when it is present and non-empty.
    pub fn base_command(&self) -> Option<&Value> {
        self.0.get("baseCommand").filter(|command| match command {
            Value::String(s) => !s.trim().is_empty(),
            Value::Array(parts) => !parts.is_empty(),
            _ => false,
        })
    }

    pub fn set_base_command(&mut self, command: &[String]) {
        let parts = command.iter().cloned().map(Value::String).collect();
        self.0.insert("baseCommand".to_string(), Value::Array(parts));
    }

    /// Input parameter names declared by the tool, if it declares any.
    pub fn declared_inputs(&self) -> Option<Vec<String>> {
        self.0.get("inputs").and_then(declared_names)
    }

    /// Output parameter names declared by the tool, if it declares any.
    pub fn declared_outputs(&self) -> Option<Vec<String>> {
        self.0.get("outputs").and_then(declared_names)
    }
}

/// Collects parameter names from a CWL `inputs`/`outputs` section in map or list form.
fn declared_names(section: &Value) -> Option<Vec<String>> {
    match section {
        Value::Object(map) => Some(map.keys().cloned().collect()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::Object(entry) => entry.get("id").and_then(Value::as_str),
                    Value::String(id) => Some(id.as_str()),
                    _ => None,
                })
                .map(|id| id.trim_start_matches('#').to_string())
                .collect(),
        ),
        _ => None,
    }
}

/// Attribute carrying a Directory value's path.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryAttribute {
    Location,
    Path,
}

impl DirectoryAttribute {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::Path => "path",
        }
    }

    /// The attribute that is not this one.
    pub fn other(self) -> Self {
        match self {
            Self::Location => Self::Path,
            Self::Path => Self::Location,
        }
    }
}

/// Mutable view over a `{class: Directory, ...}` value.
#[derive(Debug)]
pub struct DirectoryValue<'a>(&'a mut Map<String, Value>);

impl<'a> DirectoryValue<'a> {
    /// Returns a view when `value` is a Directory value.
    pub fn from_value(value: &'a mut Value) -> Option<Self> {
        let map = value.as_object_mut()?;
        if map.get("class").and_then(Value::as_str) != Some(DIRECTORY_CLASS) {
            return None;
        }
        Some(Self(map))
    }

    pub fn get(&self, attribute: DirectoryAttribute) -> Option<&str> {
        self.0.get(attribute.as_str()).and_then(Value::as_str)
    }

    pub fn set(&mut self, attribute: DirectoryAttribute, path: impl Into<String>) {
        self.0
            .insert(attribute.as_str().to_string(), Value::String(path.into()));
    }

    /// Moves the other attribute into `canonical`, leaving exactly one populated.
    ///
    /// An existing canonical value wins over the other attribute.
    /// Returns true if the value changed.
    pub fn normalize(&mut self, canonical: DirectoryAttribute) -> bool {
        let Some(other) = self.0.remove(canonical.other().as_str()) else {
            return false;
        };

        let has_canonical = self
            .0
            .get(canonical.as_str())
            .is_some_and(|value| !value.is_null());
        if !has_canonical {
            self.0.insert(canonical.as_str().to_string(), other);
        }
        true
    }
}

/// The Compute workflow spec submitted to the execution service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ComputeWorkflow {
    /// Workflow name, derived from the compiled document's file name
    pub name: String,

    /// Execution backend the spec targets (e.g. `argo`)
    pub driver: String,

    /// Rewritten job inputs
    #[serde(rename = "cwlJobInputs")]
    pub job_inputs: JobInputs,

    #[serde(default)]
    pub inputs: Map<String, Value>,

    #[serde(default)]
    pub outputs: Map<String, Value>,

    /// Steps with inlined run definitions, keyed by sanitized step name
    #[serde(default)]
    pub steps: IndexMap<String, CwlStep>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Converts a CWL section in map or `[{id: ...}]` list form into a map.
fn keyed_entries(value: Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(mut entry) => {
                    let id = entry
                        .remove("id")
                        .and_then(|id| id.as_str().map(|s| s.trim_start_matches('#').to_string()))
                        .ok_or_else(|| "list entry without a string 'id'".to_string())?;
                    Ok((id, Value::Object(entry)))
                }
                _ => Err("expected a list of objects with an 'id'".to_string()),
            })
            .collect(),
        other => Err(format!("expected a map or a list, found {}", other)),
    }
}

/// Deserializes a CWL section given either as a map or as a list of `{id: ...}` entries.
fn map_or_list<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    keyed_entries(value).map_err(de::Error::custom)
}

fn steps_map_or_list<'de, D>(deserializer: D) -> Result<IndexMap<String, CwlStep>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = keyed_entries(Value::deserialize(deserializer)?).map_err(de::Error::custom)?;

    entries
        .into_iter()
        .map(|(id, value)| {
            serde_json::from_value(value)
                .map(|step| (id.clone(), step))
                .map_err(|e| de::Error::custom(format!("step '{}': {}", id, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_map_form_workflow() {
        let yaml = r#"
class: Workflow
cwlVersion: v1.2
$namespaces:
  edam: https://edamontology.org/
requirements:
  InlineJavascriptRequirement: {}
inputs:
  wf__0__FileRenaming___inpDir: Directory
outputs: {}
steps:
  wf__0__FileRenaming:
    run: cwl_adapters/FileRenaming.cwl
    in:
      inpDir: { source: wf__0__FileRenaming___inpDir }
    out: [outDir]
"#;
        let workflow: CwlWorkflow = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(workflow.class.as_deref(), Some("Workflow"));
        assert_eq!(workflow.cwl_version.as_deref(), Some("v1.2"));
        assert!(workflow.namespaces.is_some());
        assert!(workflow.extra.contains_key("requirements"));
        assert_eq!(workflow.steps.len(), 1);

        let step = &workflow.steps["wf__0__FileRenaming"];
        assert_eq!(step.run_reference(), Some("cwl_adapters/FileRenaming.cwl"));
        assert_eq!(step.output_names(), vec!["outDir"]);
        assert_eq!(
            step.bindings["inpDir"],
            json!({"source": "wf__0__FileRenaming___inpDir"})
        );
    }

    #[test]
    fn test_parse_list_form_sections() {
        let yaml = r#"
inputs:
  - id: wf__0__Montage___layout
    type: string
steps:
  - id: wf__0__Montage
    run: montage.cwl
    in:
      - id: layout
        source: wf__0__Montage___layout
    out:
      - id: outDir
"#;
        let workflow: CwlWorkflow = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(workflow.inputs["wf__0__Montage___layout"], json!({"type": "string"}));
        let step = &workflow.steps["wf__0__Montage"];
        assert_eq!(step.bindings["layout"], json!({"source": "wf__0__Montage___layout"}));
        assert_eq!(step.output_names(), vec!["outDir"]);
    }

    #[test]
    fn test_steps_keep_document_order() {
        let yaml = r#"
steps:
  zeta__0__Last: { run: last.cwl }
  alpha__1__First: { run: first.cwl }
  mid__2__Middle: { run: middle.cwl }
"#;
        let workflow: CwlWorkflow = serde_yaml::from_str(yaml).unwrap();
        let keys: Vec<&str> = workflow.steps.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta__0__Last", "alpha__1__First", "mid__2__Middle"]);
    }

    #[test]
    fn test_step_without_run_is_rejected() {
        let yaml = "steps:\n  wf__0__A:\n    in: {}\n";
        assert!(serde_yaml::from_str::<CwlWorkflow>(yaml).is_err());
    }

    #[test]
    fn test_tool_definition_base_command() {
        let mut tool = ToolDefinition::from_map(
            json!({"class": "CommandLineTool", "baseCommand": []})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert!(tool.base_command().is_none());

        tool.set_base_command(&["python3".to_string(), "-m".to_string(), "plugin".to_string()]);
        assert_eq!(tool.base_command(), Some(&json!(["python3", "-m", "plugin"])));
    }

    #[test]
    fn test_tool_definition_declared_names() {
        let tool: ToolDefinition = serde_json::from_value(json!({
            "inputs": {"inpDir": {"type": "Directory"}, "filePattern": {"type": "string"}},
            "outputs": [{"id": "#outDir", "type": "Directory"}]
        }))
        .unwrap();

        assert_eq!(
            tool.declared_inputs(),
            Some(vec!["inpDir".to_string(), "filePattern".to_string()])
        );
        assert_eq!(tool.declared_outputs(), Some(vec!["outDir".to_string()]));

        let bare = ToolDefinition::default();
        assert_eq!(bare.declared_inputs(), None);
    }

    #[test]
    fn test_directory_value_normalize() {
        let mut value = json!({"class": "Directory", "location": "/work/images"});
        let mut dir = DirectoryValue::from_value(&mut value).unwrap();

        assert!(dir.normalize(DirectoryAttribute::Path));
        assert_eq!(dir.get(DirectoryAttribute::Path), Some("/work/images"));
        assert_eq!(dir.get(DirectoryAttribute::Location), None);
        assert!(!dir.normalize(DirectoryAttribute::Path));
    }

    #[test]
    fn test_directory_value_normalize_keeps_canonical() {
        let mut value = json!({"class": "Directory", "location": "/a", "path": "/b"});
        let mut dir = DirectoryValue::from_value(&mut value).unwrap();

        assert!(dir.normalize(DirectoryAttribute::Path));
        assert_eq!(value, json!({"class": "Directory", "path": "/b"}));
    }

    #[test]
    fn test_directory_value_rejects_other_values() {
        let mut file = json!({"class": "File", "path": "/a.txt"});
        assert!(DirectoryValue::from_value(&mut file).is_none());

        let mut literal = json!(0.5);
        assert!(DirectoryValue::from_value(&mut literal).is_none());
    }

    #[test]
    fn test_compute_workflow_serializes_job_inputs_key() {
        let workflow = ComputeWorkflow {
            name: "viz".to_string(),
            driver: "argo".to_string(),
            job_inputs: json!({"threshold": 0.5}).as_object().cloned().unwrap(),
            inputs: Map::new(),
            outputs: Map::new(),
            steps: IndexMap::new(),
            extra: Map::new(),
        };

        let value = serde_json::to_value(&workflow).unwrap();
        assert_eq!(value["cwlJobInputs"]["threshold"], json!(0.5));
        assert_eq!(value["driver"], json!("argo"));
    }
}
