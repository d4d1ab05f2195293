use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use toolbridge_catalog::{github, CatalogOptions, Family};
use toolbridge_executor::ExecutorConfig;
use toolbridge_remote::RemoteConfig;

pub const CONFIG_ENV: &str = "TOOLBRIDGE_CONFIG";
const DEFAULT_CALL_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub families: Vec<Family>,
    pub subprocess: SubprocessSection,
    pub remote: RemoteSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubprocessSection {
    #[serde(default = "default_call_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(flatten)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteSection {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(flatten)]
    pub client: RemoteConfig,
}

fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

fn default_currency() -> String {
    CatalogOptions::default().currency
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            families: Family::ALL.to_vec(),
            subprocess: SubprocessSection::default(),
            remote: RemoteSection::default(),
        }
    }
}

impl Default for SubprocessSection {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            executor: ExecutorConfig {
                allowed_programs: vec![github::PROGRAM.to_string()],
                env_passthrough: ["HOME", "PATH", "GH_TOKEN", "GH_HOST", "XDG_CONFIG_HOME"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                ..ExecutorConfig::default()
            },
        }
    }
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            client: RemoteConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, else from `$TOOLBRIDGE_CONFIG`, else use defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.families.is_empty() {
            bail!("families must name at least one tool family");
        }
        if self.subprocess.timeout_ms == 0 {
            bail!("subprocess.timeout_ms must be positive");
        }
        if self.subprocess.executor.max_output_bytes == 0 {
            bail!("subprocess.max_output_bytes must be positive");
        }
        if self.families.contains(&Family::Github) {
            let allowed = &self.subprocess.executor.allowed_programs;
            if allowed.is_empty() {
                bail!("subprocess.allowed_programs must not be empty");
            }
            if !allowed.iter().any(|p| p == github::PROGRAM) {
                bail!(
                    "subprocess.allowed_programs must include '{}' for the github family",
                    github::PROGRAM
                );
            }
        }
        if self.remote.client.timeout_ms == 0 {
            bail!("remote.timeout_ms must be positive");
        }
        if self.remote.currency.len() != 3
            || !self.remote.currency.chars().all(|c| c.is_ascii_alphabetic())
        {
            bail!(
                "remote.currency must be a three-letter code (got {:?})",
                self.remote.currency
            );
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.subprocess.timeout_ms)
    }

    pub fn catalog_options(&self) -> CatalogOptions {
        CatalogOptions {
            currency: self.remote.currency.to_ascii_lowercase(),
        }
    }

    pub fn uses(&self, family: Family) -> bool {
        self.families.contains(&family)
    }
}
