//! Identifier Naming Module
//!
//! Handles the identifiers the workflow compiler generates and their
//! translation into names the execution backend accepts.
//!
//! # Structure
//!
//! - [`qualified`]: Qualified step/parameter names and dependency references
//! - [`sanitize`]: Target-platform identifier rules

pub mod qualified;
pub mod sanitize;

pub use qualified::{NotQualifiedName, QualifiedName, Reference};
pub use sanitize::{class_name, sanitize};
