//! Translation Module
//!
//! Turns a compiled CWL workflow into a Compute workflow spec.
//!
//! # Structure
//!
//! - [`paths`]: Directory path rewriting into the target mount namespace
//! - [`resolver`]: Tool catalog and run-definition inlining
//! - [`rewriter`]: The translation driver

pub mod paths;
pub mod resolver;
pub mod rewriter;

pub use paths::PathRewriter;
pub use resolver::{tool_stem, RunResolver, ToolCatalog};
pub use rewriter::Translator;
