//! Translation Configuration
//!
//! Settings consumed by a translation run. Values come from defaults, an
//! optional YAML file and `CWL2COMPUTE_*` environment variables, in that
//! order of increasing priority; the CLI applies its flags last.
//!
//! # Example YAML Format
//!
//! ```yaml
//! working_root: /home/user/viz-workflow
//! target_root: /data/outputs
//! driver: argo
//! paths_as_strings: true
//! directory_attribute_is_path: true
//! ```

use std::env;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::workflow::model::DirectoryAttribute;
use crate::workflow::parser::read_yaml;

/// Mount root of step outputs on the execution backend.
pub const DEFAULT_TARGET_ROOT: &str = "/data/outputs";

/// Execution backend targeted by default.
pub const DEFAULT_DRIVER: &str = "argo";

/// Configuration of a translation run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TranslationConfig {
    /// Local root the workflow compiler ran in
    pub working_root: PathBuf,

    /// Root under which the backend mounts step directories
    pub target_root: PathBuf,

    /// Backend driver tag written into the spec
    pub driver: String,

    /// Emit step bindings as plain reference strings instead of `{source}` objects
    pub paths_as_strings: bool,

    /// Directory values carry `path` (true) or `location` (false)
    pub directory_attribute_is_path: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            working_root: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            target_root: PathBuf::from(DEFAULT_TARGET_ROOT),
            driver: DEFAULT_DRIVER.to_string(),
            paths_as_strings: true,
            directory_attribute_is_path: true,
        }
    }
}

impl TranslationConfig {
    /// Creates a configuration with explicit roots and default flags.
    pub fn new(working_root: impl Into<PathBuf>, target_root: impl Into<PathBuf>) -> Self {
        Self {
            working_root: working_root.into(),
            target_root: target_root.into(),
            ..Self::default()
        }
    }

    /// Loads a configuration file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = read_yaml(path, "configuration file")?;
        debug!("Loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Applies `CWL2COMPUTE_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable source.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(root) = lookup("CWL2COMPUTE_WORKING_ROOT") {
            self.working_root = PathBuf::from(root);
        }
        if let Some(root) = lookup("CWL2COMPUTE_TARGET_ROOT") {
            self.target_root = PathBuf::from(root);
        }
        if let Some(driver) = lookup("CWL2COMPUTE_DRIVER") {
            self.driver = driver;
        }
        if let Some(flag) = lookup("CWL2COMPUTE_PATHS_AS_STRINGS").and_then(|v| parse_flag(&v)) {
            self.paths_as_strings = flag;
        }
        if let Some(flag) = lookup("CWL2COMPUTE_DIRECTORY_PATH").and_then(|v| parse_flag(&v)) {
            self.directory_attribute_is_path = flag;
        }
        self
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn with_paths_as_strings(mut self, enabled: bool) -> Self {
        self.paths_as_strings = enabled;
        self
    }

    pub fn with_directory_attribute_is_path(mut self, enabled: bool) -> Self {
        self.directory_attribute_is_path = enabled;
        self
    }

    /// Directory attribute the target format requires.
    pub fn directory_attribute(&self) -> DirectoryAttribute {
        if self.directory_attribute_is_path {
            DirectoryAttribute::Path
        } else {
            DirectoryAttribute::Location
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
