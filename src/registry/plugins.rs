//! Plugin Registry
//!
//! Holds the manifests of the image-processing plugins known to the
//! submission flow. The registry is the authoritative source for a
//! plugin's entrypoint when a materialized tool definition lacks one.
//!
//! # Directory Resolution Priority
//!
//! The default manifest directory is resolved in the following order:
//! 1. `CWL2COMPUTE_PLUGIN_DIR` environment variable
//! 2. `{home}/.cwl2compute/plugins`
//! 3. `plugins/` in the current directory

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TranslateError};
use crate::naming::{class_name, sanitize};

/// Environment variable overriding the manifest directory.
pub const PLUGIN_DIR_VAR: &str = "CWL2COMPUTE_PLUGIN_DIR";

/// Lazily-resolved default directory of plugin manifests.
pub static PLUGIN_DIR: Lazy<PathBuf> = Lazy::new(|| {
    if let Ok(dir) = std::env::var(PLUGIN_DIR_VAR) {
        let dir = PathBuf::from(dir);
        info!("Using plugin directory from {}: {}", PLUGIN_DIR_VAR, dir.display());
        return dir;
    }

    let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"));
    if let Ok(home) = home {
        let user_dir = PathBuf::from(home).join(".cwl2compute").join("plugins");
        if user_dir.exists() {
            info!("Using user plugin directory: {}", user_dir.display());
            return user_dir;
        }
    }

    let cwd_dir = PathBuf::from("plugins");
    info!("Using CWD plugin directory: {}", cwd_dir.display());
    cwd_dir
});

/// A plugin manifest (`plugin.json`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    /// Human-readable plugin name, e.g. "File Renaming"
    pub name: String,

    #[serde(default)]
    pub version: String,

    /// Container image running the plugin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,

    /// Entrypoint of the plugin container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub base_command: Vec<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginManifest {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            container_id: None,
            base_command: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn with_base_command(mut self, command: &[&str]) -> Self {
        self.base_command = command.iter().map(|part| part.to_string()).collect();
        self
    }

    /// Returns true if `name` designates this plugin.
    ///
    /// Compiled workflows name steps after the plugin's class-style name,
    /// so the manifest name, its class name and their sanitized forms match.
    pub fn matches(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }
        let class = class_name(&self.name);
        class == name || class == class_name(name) || sanitize(&self.name) == sanitize(name)
    }
}

/// In-memory registry of plugin manifests.
///
/// Loading and refreshing are explicit; translations only read from it.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, PluginManifest>,
    source: Option<PathBuf>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every `*.json` manifest in `dir`.
    ///
    /// A missing directory yields an empty registry; an unreadable
    /// manifest is an error.
    pub fn load(dir: impl Into<PathBuf>) -> Result<Self> {
        let mut registry = Self {
            plugins: BTreeMap::new(),
            source: Some(dir.into()),
        };
        registry.refresh()?;
        Ok(registry)
    }

    /// Loads from the default plugin directory.
    pub fn load_default() -> Result<Self> {
        Self::load(PLUGIN_DIR.clone())
    }

    /// Re-reads the manifest directory, replacing the current content.
    ///
    /// Registries built in memory keep their content. Returns the number
    /// of registered plugins.
    pub fn refresh(&mut self) -> Result<usize> {
        let Some(dir) = self.source.clone() else {
            return Ok(self.plugins.len());
        };

        if !dir.is_dir() {
            warn!("Plugin directory not found: {}", dir.display());
            self.plugins.clear();
            return Ok(0);
        }

        let mut plugins = BTreeMap::new();
        for manifest in read_manifests(&dir)? {
            if plugins.contains_key(&manifest.name) {
                warn!("Plugin '{}' registered twice, keeping the last one", manifest.name);
            }
            plugins.insert(manifest.name.clone(), manifest);
        }

        self.plugins = plugins;
        info!(
            "Loaded {} plugins from {}",
            self.plugins.len(),
            dir.display()
        );
        Ok(self.plugins.len())
    }

    /// Registers a manifest, replacing any plugin with the same name.
    pub fn register(&mut self, manifest: PluginManifest) {
        debug!("Registering plugin '{}' {}", manifest.name, manifest.version);
        self.plugins.insert(manifest.name.clone(), manifest);
    }

    /// Looks a plugin up by manifest name or by the name a compiled step uses.
    ///
    /// An exact manifest name wins. Otherwise the first matching plugin in
    /// name order is returned, with a warning when several match.
    pub fn find(&self, name: &str) -> Option<&PluginManifest> {
        if let Some(plugin) = self.plugins.get(name) {
            return Some(plugin);
        }

        let matches: Vec<&PluginManifest> = self
            .plugins
            .values()
            .filter(|plugin| plugin.matches(name))
            .collect();
        if matches.len() > 1 {
            let names: Vec<&str> = matches.iter().map(|plugin| plugin.name.as_str()).collect();
            warn!(
                "'{}' matches several plugins ({}), using '{}'",
                name,
                names.join(", "),
                names[0]
            );
        }
        matches.into_iter().next()
    }

    /// Names of all registered plugins.
    pub fn list(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Parses all manifests in a directory, sorted by file name.
fn read_manifests(dir: &Path) -> Result<Vec<PluginManifest>> {
    let io_error = |source| TranslateError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_error)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let content = fs::read_to_string(&path).map_err(|source| TranslateError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content).map_err(|source| TranslateError::Manifest { path, source })
        })
        .collect()
}
