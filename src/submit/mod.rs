//! Workflow Submission Module
//!
//! Posts translated workflow specs to the Compute service.
//!
//! # Structure
//!
//! - [`token`]: OAuth client-credentials token service
//! - [`client`]: HTTP submission client

pub mod client;
pub mod token;

use std::path::PathBuf;

use thiserror::Error;

pub use client::{ComputeClient, ComputeConfig, Submission};
pub use token::{decode_claims, Credentials, TokenClaims, TokenService, DEFAULT_TOKEN_URL};

/// Errors raised while authenticating or submitting.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{0} env variable not defined")]
    MissingEnv(&'static str),

    #[error("No access token available: set COMPUTE_CLIENT_ID and COMPUTE_CLIENT_SECRET")]
    MissingCredentials,

    #[error("Failed to obtain token from the OAuth 2.0 server (HTTP {status}): {body}")]
    TokenRequest { status: u16, body: String },

    #[error("Malformed access token: {0}")]
    MalformedToken(String),

    #[error("Compute rejected the access token: {body}")]
    Unauthorized { body: String },

    #[error("Compute rejected the workflow (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Cannot submit '{}': {reason}", path.display())]
    InvalidFile { path: PathBuf, reason: &'static str },

    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid workflow JSON in '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SubmitError {
    /// True when retrying may succeed with a fresh token.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

pub type SubmitResult<T> = Result<T, SubmitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SubmitError::MissingEnv("COMPUTE_URL").to_string(),
            "COMPUTE_URL env variable not defined"
        );
        let err = SubmitError::InvalidFile {
            path: PathBuf::from("viz.yml"),
            reason: "expected a .json file",
        };
        assert!(err.to_string().contains("viz.yml"));
    }

    #[test]
    fn test_auth_failure() {
        assert!(SubmitError::Unauthorized { body: String::new() }.is_auth_failure());
        assert!(!SubmitError::MissingCredentials.is_auth_failure());
    }
}
