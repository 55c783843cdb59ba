//! Compute Submission Client
//!
//! Posts a Compute workflow spec to `{COMPUTE_URL}/compute/workflows` with a
//! bearer token. An unauthorized response discards the cached token so the
//! caller's next attempt re-authenticates.

use std::env;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use super::token::{Credentials, TokenService, DEFAULT_TOKEN_URL};
use super::{SubmitError, SubmitResult};
use crate::workflow::model::ComputeWorkflow;

/// Path of the workflow submission endpoint.
pub const WORKFLOWS_ENDPOINT: &str = "/compute/workflows";

/// Connection settings for the Compute service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeConfig {
    /// Base URL of the Compute service
    pub compute_url: String,

    /// OAuth token endpoint
    pub token_url: String,

    pub credentials: Option<Credentials>,

    /// Pre-issued token (`ACCESS_TOKEN`)
    pub access_token: Option<String>,
}

impl ComputeConfig {
    pub fn new(compute_url: impl Into<String>) -> Self {
        Self {
            compute_url: compute_url.into(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            credentials: None,
            access_token: None,
        }
    }

    /// Reads `COMPUTE_URL`, `COMPUTE_TOKEN_URL`, `ACCESS_TOKEN` and the client credentials.
    ///
    /// The CLI loads a `.env` file into the environment before calling this.
    pub fn from_env() -> SubmitResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SubmitResult<Self> {
        let compute_url = lookup("COMPUTE_URL").ok_or(SubmitError::MissingEnv("COMPUTE_URL"))?;

        Ok(Self {
            compute_url,
            token_url: lookup("COMPUTE_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            credentials: Credentials::from_lookup(&lookup),
            access_token: lookup("ACCESS_TOKEN"),
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Outcome of an accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub status: u16,

    /// Response body, JSON when the service returned JSON
    pub response: Value,
}

/// Client for the Compute workflow API.
#[derive(Debug)]
pub struct ComputeClient {
    http: reqwest::Client,
    workflows_url: String,
    tokens: TokenService,
}

impl ComputeClient {
    pub fn new(config: ComputeConfig) -> SubmitResult<Self> {
        let mut tokens = TokenService::new(config.token_url, config.credentials)?;
        if let Some(token) = config.access_token {
            tokens = tokens.with_token(token);
        }

        Ok(Self {
            http: reqwest::Client::new(),
            workflows_url: format!(
                "{}{}",
                config.compute_url.trim_end_matches('/'),
                WORKFLOWS_ENDPOINT
            ),
            tokens,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Submits a translated workflow.
    pub async fn submit(&self, workflow: &ComputeWorkflow) -> SubmitResult<Submission> {
        info!("Submitting workflow '{}' to {}", workflow.name, self.workflows_url);
        self.post(workflow).await
    }

    /// Submits a Compute spec stored as a `.json` file.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use std::path::Path;
    /// use cwl2compute::submit::{ComputeClient, ComputeConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = ComputeClient::new(ComputeConfig::from_env()?)?;
    ///     let submission = client.submit_file(Path::new("viz_workflow.json")).await?;
    ///     println!("HTTP {}", submission.status);
    ///     Ok(())
    /// }
    /// ```
    pub async fn submit_file(&self, path: &Path) -> SubmitResult<Submission> {
        if !path.is_file() {
            return Err(SubmitError::InvalidFile {
                path: path.to_path_buf(),
                reason: "file does not exist",
            });
        }
        if path.extension().map_or(true, |ext| ext != "json") {
            return Err(SubmitError::InvalidFile {
                path: path.to_path_buf(),
                reason: "expected a .json file",
            });
        }

        let content = fs::read_to_string(path).map_err(|source| SubmitError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let workflow: Value = serde_json::from_str(&content).map_err(|source| SubmitError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        info!("Submitting {} to {}", path.display(), self.workflows_url);
        self.post(&workflow).await
    }

    async fn post<T: Serialize + ?Sized>(&self, body: &T) -> SubmitResult<Submission> {
        let token = self.tokens.token().await?;

        let response = self
            .http
            .post(&self.workflows_url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        debug!("Compute responded HTTP {}: {}", status.as_u16(), text);

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
            return Err(SubmitError::Unauthorized { body: text });
        }
        if !status.is_success() {
            warn!("Compute rejected the workflow with HTTP {}", status.as_u16());
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let response = serde_json::from_str(&text).unwrap_or(Value::String(text));
        info!("Workflow accepted (HTTP {})", status.as_u16());
        Ok(Submission {
            status: status.as_u16(),
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::collections::HashMap;
    use mockito::{Matcher, Server};
    use serde_json::{json, Map};
    use tempfile::tempdir;

    fn client(url: &str) -> ComputeClient {
        ComputeClient::new(ComputeConfig::new(url).with_access_token("abc")).unwrap()
    }

    fn workflow() -> ComputeWorkflow {
        ComputeWorkflow {
            name: "viz_workflow".to_string(),
            driver: "argo".to_string(),
            job_inputs: json!({"threshold": 0.5}).as_object().cloned().unwrap(),
            inputs: Map::new(),
            outputs: Map::new(),
            steps: IndexMap::new(),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_config_requires_compute_url() {
        let err = ComputeConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, SubmitError::MissingEnv("COMPUTE_URL")));
    }

    #[test]
    fn test_config_from_lookup() {
        let config = ComputeConfig::from_lookup(|key| match key {
            "COMPUTE_URL" => Some("https://compute.example.org".to_string()),
            "COMPUTE_CLIENT_ID" => Some("svc".to_string()),
            "COMPUTE_CLIENT_SECRET" => Some("secret".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.credentials, Some(Credentials::new("svc", "secret")));
        assert_eq!(config.access_token, None);
    }

    #[test]
    fn test_config_from_dotenv_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");
        fs::write(
            &path,
            "# compute settings\nCOMPUTE_URL=https://compute.example.org\nACCESS_TOKEN=\"abc def\"\n",
        )
        .unwrap();

        let vars: HashMap<String, String> = dotenvy::from_path_iter(&path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let config = ComputeConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();

        assert_eq!(config.compute_url, "https://compute.example.org");
        assert_eq!(config.access_token.as_deref(), Some("abc def"));
        assert_eq!(config.credentials, None);
    }

    #[tokio::test]
    async fn test_submit_workflow() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/compute/workflows")
            .match_header("authorization", "Bearer abc")
            .match_body(Matcher::PartialJson(
                json!({"name": "viz_workflow", "driver": "argo", "cwlJobInputs": {"threshold": 0.5}}),
            ))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "viz_workflow-7f3a", "status": "PENDING"}"#)
            .create_async()
            .await;

        let submission = client(&server.url()).submit(&workflow()).await.unwrap();

        assert_eq!(submission.status, 201);
        assert_eq!(submission.response["status"], json!("PENDING"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_discards_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/compute/workflows")
            .with_status(401)
            .with_body("token expired")
            .create_async()
            .await;

        let client = client(&server.url());
        let err = client.submit(&workflow()).await.unwrap_err();

        assert!(err.is_auth_failure());
        assert!(!client.tokens().has_token().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_workflow() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/compute/workflows")
            .with_status(422)
            .with_body("unknown driver")
            .create_async()
            .await;

        let client = client(&server.url());
        match client.submit(&workflow()).await {
            Err(SubmitError::Rejected { status, body }) => {
                assert_eq!(status, 422);
                assert_eq!(body, "unknown driver");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(client.tokens().has_token().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_file() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/compute/workflows")
            .match_body(Matcher::PartialJson(json!({"name": "viz_workflow"})))
            .with_status(200)
            .with_body("accepted")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let path = dir.path().join("viz_workflow.json");
        fs::write(&path, serde_json::to_string(&workflow()).unwrap()).unwrap();

        let submission = client(&server.url()).submit_file(&path).await.unwrap();
        assert_eq!(submission.response, json!("accepted"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_file_checks() {
        let dir = tempdir().unwrap();
        let yaml = dir.path().join("viz_workflow.yml");
        fs::write(&yaml, "name: viz").unwrap();

        let client = client("http://127.0.0.1:9");
        for path in [yaml, dir.path().join("missing.json")] {
            assert!(matches!(
                client.submit_file(&path).await,
                Err(SubmitError::InvalidFile { .. })
            ));
        }
    }
}
