//! Access Token Service
//!
//! Obtains bearer tokens for the Compute service with an OAuth 2.0
//! client-credentials exchange. A token is requested at most once per
//! service and cached until it is invalidated.

use std::env;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use super::{SubmitError, SubmitResult};

/// Token endpoint used when `COMPUTE_TOKEN_URL` is not set.
pub const DEFAULT_TOKEN_URL: &str = "https://a-ci.ncats.io/_api/auth/polus-ci/oidc/token";

/// OAuth client credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Reads `COMPUTE_CLIENT_ID` and `COMPUTE_CLIENT_SECRET`; both must be set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let client_id = lookup("COMPUTE_CLIENT_ID")?;
        let client_secret = lookup("COMPUTE_CLIENT_SECRET")?;
        Some(Self::new(client_id, client_secret))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Issues and caches access tokens.
#[derive(Debug)]
pub struct TokenService {
    http: reqwest::Client,
    token_url: String,
    credentials: Option<Credentials>,
    cached: Mutex<Option<String>>,
}

impl TokenService {
    pub fn new(token_url: impl Into<String>, credentials: Option<Credentials>) -> SubmitResult<Self> {
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            http,
            token_url: token_url.into(),
            credentials,
            cached: Mutex::new(None),
        })
    }

    /// Seeds the cache with an existing token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.cached = Mutex::new(Some(token.into()));
        self
    }

    /// Builds a service from `ACCESS_TOKEN`, `COMPUTE_TOKEN_URL` and the client credentials.
    pub fn from_env() -> SubmitResult<Self> {
        let token_url =
            env::var("COMPUTE_TOKEN_URL").unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string());
        let service = Self::new(token_url, Credentials::from_lookup(|key| env::var(key).ok()))?;

        Ok(match env::var("ACCESS_TOKEN") {
            Ok(token) => service.with_token(token),
            Err(_) => service,
        })
    }

    /// Returns the cached token, requesting a new one if there is none.
    pub async fn token(&self) -> SubmitResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            debug!("Use existing access token");
            return Ok(token.clone());
        }

        debug!("No access token cached, requesting a new one");
        let token = self.fetch().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Requests a new token from the token endpoint, bypassing the cache.
    pub async fn fetch(&self) -> SubmitResult<String> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(SubmitError::MissingCredentials)?;

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SubmitError::TokenRequest {
                status: status.as_u16(),
                body,
            });
        }

        let TokenResponse { access_token } = response.json().await?;
        match decode_claims(&access_token) {
            Ok(claims) => {
                debug!("Decoded access token: {:?}", claims);
                if let Some(expiry) = claims.expires_at() {
                    info!("Obtained a new access token, valid until {}", expiry);
                }
            }
            Err(e) => warn!("Obtained an access token that is not a JWT: {}", e),
        }
        Ok(access_token)
    }

    /// Discards the cached token so the next request re-authenticates.
    pub async fn invalidate(&self) {
        if self.cached.lock().await.take().is_some() {
            warn!("Discarded cached access token");
        }
    }

    pub async fn has_token(&self) -> bool {
        self.cached.lock().await.is_some()
    }
}

/// Unverified JWT payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenClaims(Map<String, Value>);

impl TokenClaims {
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.0.get(claim)
    }

    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }

    /// Expiry from the `exp` claim.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.0
            .get("exp")
            .and_then(Value::as_i64)
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expiry| expiry <= now)
    }
}

/// Decodes the payload of a JWT without verifying its signature.
///
/// # Example
///
/// ```
/// use cwl2compute::submit::decode_claims;
///
/// // {"sub":"svc"}
/// let claims = decode_claims("e30.eyJzdWIiOiJzdmMifQ.sig").unwrap();
/// assert_eq!(claims.subject(), Some("svc"));
/// ```
pub fn decode_claims(token: &str) -> SubmitResult<TokenClaims> {
    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(SubmitError::MalformedToken(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| SubmitError::MalformedToken(e.to_string()))?;
    let claims = serde_json::from_slice(&bytes)
        .map_err(|e| SubmitError::MalformedToken(e.to_string()))?;

    Ok(TokenClaims(claims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use mockito::Server;

    fn jwt(payload: &str) -> String {
        format!("e30.{}.signature", URL_SAFE_NO_PAD.encode(payload))
    }

    #[test]
    fn test_decode_claims() {
        let claims = decode_claims(&jwt(r#"{"sub":"polus-ci","exp":1893456000}"#)).unwrap();

        assert_eq!(claims.subject(), Some("polus-ci"));
        assert_eq!(claims.expires_at(), DateTime::from_timestamp(1_893_456_000, 0));
        assert!(!claims.is_expired(DateTime::from_timestamp(1_700_000_000, 0).unwrap()));
        assert!(claims.is_expired(DateTime::from_timestamp(1_900_000_000, 0).unwrap()));
    }

    #[test]
    fn test_decode_malformed_token() {
        assert!(matches!(
            decode_claims("opaque-token"),
            Err(SubmitError::MalformedToken(_))
        ));
        assert!(decode_claims("a.!!!.c").is_err());
    }

    #[test]
    fn test_credentials_require_both_values() {
        let only_id = |key: &str| (key == "COMPUTE_CLIENT_ID").then(|| "svc".to_string());
        assert!(Credentials::from_lookup(only_id).is_none());

        let both = |key: &str| Some(format!("{}-value", key));
        let credentials = Credentials::from_lookup(both).unwrap();
        assert_eq!(credentials.client_id, "COMPUTE_CLIENT_ID-value");
    }

    #[tokio::test]
    async fn test_seeded_token_skips_exchange() {
        let service = TokenService::new("http://127.0.0.1:9/token", None)
            .unwrap()
            .with_token("seeded");

        assert_eq!(service.token().await.unwrap(), "seeded");
    }

    #[tokio::test]
    async fn test_token_fetched_once_and_cached() {
        let mut server = Server::new_async().await;
        let token = jwt(r#"{"sub":"polus-ci","exp":1893456000}"#);
        let basic = format!("Basic {}", STANDARD.encode("svc-client:s3cret"));

        let mock = server
            .mock("POST", "/token")
            .match_header("authorization", basic.as_str())
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body("grant_type=client_credentials")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"access_token": "{}", "token_type": "Bearer"}}"#, token))
            .expect(1)
            .create_async()
            .await;

        let service = TokenService::new(
            format!("{}/token", server.url()),
            Some(Credentials::new("svc-client", "s3cret")),
        )
        .unwrap();

        assert_eq!(service.token().await.unwrap(), token);
        assert_eq!(service.token().await.unwrap(), token);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_token_request_rejected() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(401)
            .with_body("invalid_client")
            .create_async()
            .await;

        let service = TokenService::new(
            format!("{}/token", server.url()),
            Some(Credentials::new("svc-client", "wrong")),
        )
        .unwrap();

        match service.token().await {
            Err(SubmitError::TokenRequest { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid_client");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!service.has_token().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let service = TokenService::new("http://127.0.0.1:9/token", None).unwrap();
        assert!(matches!(
            service.token().await,
            Err(SubmitError::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let service = TokenService::new(DEFAULT_TOKEN_URL, None)
            .unwrap()
            .with_token("stale");
        assert!(service.has_token().await);

        service.invalidate().await;
        assert!(!service.has_token().await);
    }
}
