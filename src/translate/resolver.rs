//! Run-Definition Resolution
//!
//! Compiled steps reference their tool by file path. The execution backend
//! wants the full tool definition inlined in the step, carrying an `id` and
//! a base command.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::Value;

use crate::error::{Result, TranslateError};
use crate::naming::sanitize;
use crate::registry::PluginRegistry;
use crate::workflow::model::ToolDefinition;
use crate::workflow::parser::load_tool_definition;

/// File extension of materialized tool definitions.
pub const TOOL_EXTENSION: &str = "cwl";

/// Materialized tool definitions, keyed by file stem.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: BTreeMap<String, PathBuf>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes every `*.cwl` file in `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(TranslateError::MissingArtifact {
                what: "tool directory",
                path: dir.to_path_buf(),
            });
        }

        let entries = fs::read_dir(dir).map_err(|source| TranslateError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut catalog = Self::new();
        for path in entries.filter_map(|entry| entry.ok().map(|e| e.path())) {
            if path.extension().is_some_and(|ext| ext == TOOL_EXTENSION) {
                if let Some(stem) = tool_stem(&path.to_string_lossy()) {
                    catalog.insert(stem, path);
                }
            }
        }

        info!("Indexed {} tool definitions in {}", catalog.len(), dir.display());
        Ok(catalog)
    }

    /// Registers the definition of tool `name` stored at `path`.
    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        let name = name.into();
        let path = path.into();
        debug!("Tool '{}' -> {}", name, path.display());
        self.tools.insert(name, path);
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.tools.get(name).map(PathBuf::as_path)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Extracts the tool name from a `run` reference.
///
/// # Example
///
/// ```
/// use cwl2compute::translate::resolver::tool_stem;
///
/// assert_eq!(tool_stem("../cwl_adapters/file-renaming.cwl"), Some("file-renaming".to_string()));
/// assert_eq!(tool_stem("file://host/tools/Montage.cwl"), Some("Montage".to_string()));
/// ```
pub fn tool_stem(run_reference: &str) -> Option<String> {
    let path = run_reference.strip_prefix("file://").unwrap_or(run_reference);
    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

/// Inlines tool definitions into steps.
#[derive(Debug, Clone, Copy)]
pub struct RunResolver<'a> {
    catalog: &'a ToolCatalog,
    registry: &'a PluginRegistry,
}

impl<'a> RunResolver<'a> {
    pub fn new(catalog: &'a ToolCatalog, registry: &'a PluginRegistry) -> Self {
        Self { catalog, registry }
    }

    /// Resolves the tool a step runs into its full definition.
    ///
    /// # Arguments
    ///
    /// * `step_name` - Step name as written by the compiler (unsanitized)
    /// * `run_reference` - The step's `run` path
    ///
    /// # Returns
    ///
    /// The loaded definition with `name` set to the tool stem, `id` set to
    /// the sanitized step name and a non-empty `baseCommand`.
    pub fn resolve(&self, step_name: &str, run_reference: &str) -> Result<ToolDefinition> {
        let tool = tool_stem(run_reference).ok_or_else(|| {
            TranslateError::invalid(
                "step",
                format!("step '{}' has an unusable run reference '{}'", step_name, run_reference),
            )
        })?;

        let path = self.catalog.get(&tool).ok_or_else(|| {
            TranslateError::UnresolvedStepReference {
                step: step_name.to_string(),
                tool: tool.clone(),
            }
        })?;

        if !path.exists() {
            return Err(TranslateError::MissingArtifact {
                what: "tool definition",
                path: path.to_path_buf(),
            });
        }

        let definition = self.complete(step_name, &tool, load_tool_definition(path)?)?;
        debug!("Resolved step '{}' to tool '{}' ({})", step_name, tool, path.display());
        Ok(definition)
    }

    /// Attaches `name` and `id` to a definition and makes sure it has a base command.
    ///
    /// Also used for steps whose definition is already inlined.
    pub fn complete(
        &self,
        step_name: &str,
        tool: &str,
        mut definition: ToolDefinition,
    ) -> Result<ToolDefinition> {
        definition.insert("name", Value::String(tool.to_string()));
        definition.insert("id", Value::String(sanitize(step_name)));

        if definition.base_command().is_none() {
            self.inject_base_command(step_name, tool, &mut definition)?;
        }
        Ok(definition)
    }

    /// Copies the registry's entrypoint into a definition lacking one.
    fn inject_base_command(
        &self,
        step_name: &str,
        tool: &str,
        definition: &mut ToolDefinition,
    ) -> Result<()> {
        warn!(
            "Tool definition '{}' has no baseCommand, querying the plugin registry",
            tool
        );

        let plugin = self
            .registry
            .find(step_name)
            .or_else(|| self.registry.find(tool))
            .ok_or_else(|| TranslateError::PluginNotFound {
                name: step_name.to_string(),
                known: self.registry.len(),
            })?;

        if plugin.base_command.is_empty() {
            return Err(TranslateError::MissingBaseCommand {
                step: step_name.to_string(),
                plugin: plugin.name.clone(),
            });
        }

        info!(
            "Using baseCommand {:?} from plugin '{}'",
            plugin.base_command, plugin.name
        );
        definition.set_base_command(&plugin.base_command);
        Ok(())
    }
}
