use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use toolbridge_catalog::{build_registry, Family};
use toolbridge_core::{DispatchEngine, FaultKind, RemoteClient, RemoteFault};
use toolbridge_executor::ProcessInvoker;
use toolbridge_remote::{HttpRemoteClient, RemoteError};

use crate::config::AppConfig;

/// Stands in for the HTTP client when remote access cannot be used.
/// Every call fails with the reason it is unavailable.
pub struct UnavailableRemote {
    kind: FaultKind,
    reason: String,
}

impl UnavailableRemote {
    pub fn new(kind: FaultKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RemoteClient for UnavailableRemote {
    async fn call(&self, _operation: &str, _params: &Value) -> Result<Value, RemoteFault> {
        Err(RemoteFault::new(self.kind, self.reason.clone()))
    }
}

fn remote_client(config: &AppConfig) -> Result<Arc<dyn RemoteClient>> {
    if !config.uses(Family::Billing) {
        return Ok(Arc::new(UnavailableRemote::new(
            FaultKind::Other,
            "no remote tool family is enabled",
        )));
    }

    match HttpRemoteClient::from_config(&config.remote.client) {
        Ok(client) => Ok(Arc::new(client)),
        Err(RemoteError::MissingApiKey(var)) => {
            warn!(
                env = %var,
                "Billing API key not set; billing tools will fail until it is provided"
            );
            Ok(Arc::new(UnavailableRemote::new(
                FaultKind::Authentication,
                format!("{} is not set", var),
            )))
        }
        Err(e) => Err(e).context("Failed to create billing API client"),
    }
}

/// Wire the catalog, the process invoker and the remote client into an engine.
pub fn build_engine(config: &AppConfig) -> Result<DispatchEngine> {
    let registry = build_registry(&config.families, &config.catalog_options())
        .context("Failed to build tool registry")?;
    let subprocess = Arc::new(ProcessInvoker::new(config.subprocess.executor.clone()));
    let remote = remote_client(config)?;

    let families: Vec<&str> = config.families.iter().map(Family::as_str).collect();
    info!(
        tools = registry.count(),
        families = ?families,
        timeout_ms = config.subprocess.timeout_ms,
        "Tool registry ready"
    );

    Ok(DispatchEngine::new(Arc::new(registry), subprocess, remote)
        .with_timeout(config.call_timeout()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_github_only_engine() {
        let config = AppConfig {
            families: vec![Family::Github],
            ..AppConfig::default()
        };
        let engine = build_engine(&config).unwrap();
        assert_eq!(engine.registry().count(), 26);
        assert!(engine.registry().get("billing_get_balance").is_none());
    }

    #[tokio::test]
    async fn test_unavailable_remote_reports_reason() {
        let remote = UnavailableRemote::new(FaultKind::Authentication, "KEY is not set");
        let fault = remote
            .call("balance.retrieve", &Value::Null)
            .await
            .unwrap_err();
        assert_eq!(fault.kind, FaultKind::Authentication);
        assert_eq!(fault.message, "KEY is not set");
    }
}
