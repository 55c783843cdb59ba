//! Translation Errors
//!
//! Every fatal condition raised while translating a workflow. Malformed
//! qualified names are not represented here: they are an expected outcome
//! handled locally by [`crate::naming::NotQualifiedName`].

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of translation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced file does not exist on disk.
    MissingArtifact,
    /// A name or reference does not resolve to anything known.
    UnresolvedReference,
    /// A tool definition is missing mandatory content.
    IncompleteDefinition,
    /// A document could not be read or has an unexpected shape.
    InvalidDocument,
}

/// Fatal error aborting a translation.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Missing {what}: {}", path.display())]
    MissingArtifact { what: &'static str, path: PathBuf },

    #[error("Step '{step}' runs tool '{tool}' which is not in the tool catalog")]
    UnresolvedStepReference { step: String, tool: String },

    #[error("Plugin '{name}' not found in registry ({known} plugins registered)")]
    PluginNotFound { name: String, known: usize },

    #[error("Tool definition for step '{step}' has no baseCommand and plugin '{plugin}' does not declare one")]
    MissingBaseCommand { step: String, plugin: String },

    #[error("Step '{step}' binds {direction} '{param}' which tool '{tool}' does not declare")]
    UnknownParameter {
        step: String,
        tool: String,
        direction: &'static str,
        param: String,
    },

    #[error("Reference '{reference}' in {location} does not resolve")]
    DanglingReference { location: String, reference: String },

    #[error("'{first}' and '{second}' both rename to '{renamed}' in {section}")]
    NameCollision {
        section: &'static str,
        first: String,
        second: String,
        renamed: String,
    },

    #[error("Invalid {what}: {message}")]
    InvalidDocument { what: String, message: String },

    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid plugin manifest '{}': {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TranslateError {
    /// Maps the error onto the translation failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingArtifact { .. } => ErrorKind::MissingArtifact,
            Self::UnresolvedStepReference { .. }
            | Self::PluginNotFound { .. }
            | Self::DanglingReference { .. } => ErrorKind::UnresolvedReference,
            Self::MissingBaseCommand { .. } | Self::UnknownParameter { .. } => {
                ErrorKind::IncompleteDefinition
            }
            Self::NameCollision { .. }
            | Self::InvalidDocument { .. }
            | Self::Io { .. }
            | Self::Parse { .. }
            | Self::Manifest { .. }
            | Self::Json(_) => ErrorKind::InvalidDocument,
        }
    }

    pub(crate) fn invalid(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            what: what.into(),
            message: message.into(),
        }
    }
}

/// Result alias used across the translation pipeline.
pub type Result<T, E = TranslateError> = std::result::Result<T, E>;
