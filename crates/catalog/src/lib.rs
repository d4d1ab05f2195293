//! The static tool catalog: one family per external subsystem.

pub mod billing;
mod common;
pub mod github;

use serde::Deserialize;
use std::fmt;
use toolbridge_core::{RegisteredTool, RegistryError, ToolRegistry};

/// A group of tools backed by the same subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Wraps the `gh` command-line program.
    Github,
    /// Calls the billing API through the remote client.
    Billing,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::Github, Family::Billing];

    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Github => "github",
            Family::Billing => "billing",
        }
    }

    pub fn tools(&self, options: &CatalogOptions) -> Vec<RegisteredTool> {
        match self {
            Family::Github => github::tools(),
            Family::Billing => billing::tools(&options.currency),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogOptions {
    /// Currency for amounts the caller supplies in minor units.
    pub currency: String,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
        }
    }
}

/// Build the registry for the given families.
pub fn build_registry(
    families: &[Family],
    options: &CatalogOptions,
) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    for family in families {
        for tool in family.tools(options) {
            registry.register(tool)?;
        }
    }
    Ok(registry)
}
