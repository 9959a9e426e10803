//! Engine configuration.

use crate::error::Result;
use datascope_proto::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Default placeholder for unresolved variables and empty id sets.
pub const DEFAULT_PLACEHOLDER: &str = "-1";

/// Capabilities that skip filtering unless configured otherwise.
pub const DEFAULT_PRIVILEGED_CAPABILITIES: [&str; 2] = ["super-admin", "tenant-admin"];

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.to_string()
}

fn default_privileged_capabilities() -> BTreeSet<String> {
    DEFAULT_PRIVILEGED_CAPABILITIES
        .iter()
        .map(|c| c.to_string())
        .collect()
}

/// Data-scope engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Text substituted for unbound variables and empty id sets.
    #[serde(default = "default_placeholder")]
    pub default_placeholder: String,

    /// Capabilities whose holders see every row.
    #[serde(default = "default_privileged_capabilities")]
    pub privileged_capabilities: BTreeSet<String>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self {
            default_placeholder: default_placeholder(),
            privileged_capabilities: default_privileged_capabilities(),
        }
    }

    /// Set the placeholder.
    pub fn with_default_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.default_placeholder = placeholder.into();
        self
    }

    /// Add a privileged capability.
    pub fn with_privileged_capability(mut self, capability: impl Into<String>) -> Self {
        self.privileged_capabilities.insert(capability.into());
        self
    }

    /// Replace the privileged capability set.
    pub fn with_privileged_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.privileged_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `capability` marks a privileged user.
    pub fn is_privileged(&self, capability: &str) -> bool {
        self.privileged_capabilities.contains(capability)
    }

    /// The placeholder as a value, for resolvers returning sentinel ids.
    pub fn sentinel_value(&self) -> Value {
        match self.default_placeholder.trim().parse::<i64>() {
            Ok(id) => Value::Int64(id),
            Err(_) => Value::String(self.default_placeholder.clone()),
        }
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
