//! Workflow Document Module
//!
//! Data structures and I/O for the documents a translation reads and
//! writes, plus the validation rules applied to them.
//!
//! # Structure
//!
//! - [`model`]: Compiled workflow, tool definition and Compute spec types
//! - [`parser`]: YAML loading and JSON saving
//! - [`validator`]: Binding and reference integrity checks

pub mod model;
pub mod parser;
pub mod validator;

pub use model::{
    ComputeWorkflow, CwlStep, CwlWorkflow, DirectoryAttribute, DirectoryValue, JobInputs,
    RunDefinition, ToolDefinition,
};
pub use parser::{load_job_inputs, load_tool_definition, load_workflow, save_compute_workflow};
pub use validator::{validate_bindings, validate_references};
