//! Plugin Registry Module
//!
//! Manifests of the processing plugins a compiled workflow runs.

pub mod plugins;

pub use plugins::{PluginManifest, PluginRegistry, PLUGIN_DIR, PLUGIN_DIR_VAR};
