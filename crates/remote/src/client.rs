//! HTTP client for a form-encoded billing API.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use toolbridge_core::{FaultKind, RemoteClient, RemoteFault};

use crate::form::flatten;
use crate::routes::{route, Method};

pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com";
pub const DEFAULT_API_KEY_ENV: &str = "STRIPE_API_KEY";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable holding the secret key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Environment variable {0} is not set")]
    MissingApiKey(String),
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Shared, stateless client. One instance serves every call.
#[derive(Clone)]
pub struct HttpRemoteClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpRemoteClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Client(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Build from config, reading the key from the configured environment variable.
    pub fn from_config(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RemoteError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(
            config.base_url.clone(),
            api_key,
            Duration::from_millis(config.timeout_ms),
        )
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn call(&self, operation: &str, params: &Value) -> Result<Value, RemoteFault> {
        let route = route(operation).ok_or_else(|| {
            RemoteFault::new(
                FaultKind::Other,
                format!("unsupported remote operation '{}'", operation),
            )
        })?;
        let (path, rest) = route
            .resolve(params)
            .map_err(|e| RemoteFault::new(FaultKind::InvalidRequest, e))?;
        let url = format!("{}{}", self.base_url, path);
        let pairs = flatten(&rest);

        debug!(operation, url = %url, params = pairs.len(), "Sending remote request");

        let request = match route.method {
            Method::Get => self.client.get(&url).query(&pairs),
            Method::Post => self.client.post(&url).form(&pairs),
        };

        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_fault)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_fault)?;

        if !status.is_success() {
            let fault = RemoteFault::new(classify(status.as_u16()), error_message(status.as_u16(), &body));
            warn!(operation, status = status.as_u16(), "Remote request rejected");
            return Err(fault);
        }

        serde_json::from_str(&body).map_err(|e| {
            RemoteFault::new(
                FaultKind::Other,
                format!("response for '{}' is not JSON: {}", operation, e),
            )
        })
    }
}

/// Fault category for a non-success HTTP status.
pub fn classify(status: u16) -> FaultKind {
    match status {
        401 | 403 => FaultKind::Authentication,
        429 => FaultKind::RateLimited,
        400 | 402 | 409 | 422 => FaultKind::InvalidRequest,
        404 => FaultKind::NotFound,
        500..=599 => FaultKind::Server,
        _ => FaultKind::Other,
    }
}

fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: ErrorDetail {
                message: Some(message),
                ..
            },
        }) => message,
        Ok(ErrorBody {
            error: ErrorDetail { kind: Some(kind), .. },
        }) => format!("HTTP {} ({})", status, kind),
        _ if body.trim().is_empty() => format!("HTTP {}", status),
        _ => format!("HTTP {}: {}", status, body.trim()),
    }
}

fn transport_fault(e: reqwest::Error) -> RemoteFault {
    let message = if e.is_timeout() {
        format!("request timed out: {}", e)
    } else {
        format!("request failed: {}", e)
    };
    RemoteFault::new(FaultKind::Network, message)
}
