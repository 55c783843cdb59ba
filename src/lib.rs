//! cwl2compute - Compiled Workflow Translator
//!
//! Turns CWL workflows produced by a workflow compiler into Compute workflow
//! specs and submits them to the Compute service. Compiled workflows address
//! steps with structured names such as `wf__0__FileRenaming___outDir`; the
//! translation renames them, rewrites directory paths into the backend's
//! mount namespace and inlines every tool definition, keeping each
//! inter-step dependency intact.
//!
//! # Architecture
//!
//! - [`naming`]: Qualified names, dependency references and identifier sanitization
//! - [`workflow`]: Document types, loading/saving and validation
//! - [`registry`]: Plugin manifests supplying missing entrypoints
//! - [`translate`]: Path rewriting, run-definition inlining and the translation driver
//! - [`submit`]: Token service and Compute HTTP client
//! - [`config`]: Translation settings
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use cwl2compute::{save_compute_workflow, PluginRegistry, ToolCatalog, TranslationConfig, Translator};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = ToolCatalog::from_dir(Path::new("autogenerated/cwl_adapters"))?;
//!     let registry = PluginRegistry::load_default()?;
//!
//!     let config = TranslationConfig::new("/home/user/viz", "/data/outputs");
//!     let translator = Translator::new(config, &catalog, &registry);
//!     let spec = translator.translate_files(
//!         Path::new("autogenerated/viz_workflow.cwl"),
//!         Path::new("autogenerated/viz_workflow_inputs.yml"),
//!     )?;
//!
//!     save_compute_workflow(&spec, Path::new("compute/viz_workflow.json"))?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod naming;
pub mod registry;
pub mod submit;
pub mod translate;
pub mod workflow;

// Re-export commonly used types
pub use config::TranslationConfig;
pub use error::{ErrorKind, Result, TranslateError};
pub use naming::{sanitize, QualifiedName};
pub use registry::PluginRegistry;
pub use translate::{ToolCatalog, Translator};
pub use workflow::model::{ComputeWorkflow, CwlWorkflow};
pub use workflow::parser::save_compute_workflow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "cwl2compute";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "cwl2compute");
    }

    #[test]
    fn test_module_exports_naming() {
        let name = QualifiedName::parse("wf__0__My_Step Name___outDir").unwrap();
        assert_eq!(name.sanitized_step(), sanitize("My_Step Name"));
        assert_eq!(sanitize("My_Step Name"), "my-step-name");
    }

    #[test]
    fn test_module_exports_translator() {
        let catalog = ToolCatalog::new();
        let registry = PluginRegistry::new();
        let translator = Translator::new(TranslationConfig::default(), &catalog, &registry);
        assert_eq!(translator.config().driver, "argo");
    }
}
