//! ---
//! vigil_section: "07-resilience-fault-tolerance"
//! vigil_subsection: "module"
//! vigil_type: "source"
//! vigil_scope: "code"
//! vigil_description: "Circuit breaking and degraded-mode orchestration."
//! vigil_version: "v0.0.0-prealpha"
//! vigil_owner: "tbd"
//! ---
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use vigil_common::config::load_table;

/// Launch/connection parameters for one external enrichment service.
///
/// The control plane never interprets `command`, `args` or `env`; they are
/// carried for the layer that actually talks to the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
    #[serde(default)]
    pub disabled: bool,
}

impl ServiceDefinition {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Default::default()
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }
}

/// Static registry of external services, in declaration order.
///
/// Serialized as `{"mcpServers": {"<name>": {...}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRegistry {
    #[serde(rename = "mcpServers", default)]
    services: IndexMap<String, ServiceDefinition>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the registry from a JSON, YAML or TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        load_table(path).with_context(|| format!("unable to load service registry {}", path.display()))
    }

    pub fn with_service(mut self, name: impl Into<String>, definition: ServiceDefinition) -> Self {
        self.insert(name, definition);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, definition: ServiceDefinition) {
        self.services.insert(name.into(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ServiceDefinition)> {
        self.services.iter().map(|(name, def)| (name.as_str(), def))
    }

    /// Services that are not flagged `disabled`.
    pub fn enabled(&self) -> impl Iterator<Item = (&str, &ServiceDefinition)> {
        self.iter().filter(|(_, def)| !def.disabled)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mcp_server_layout() {
        let raw = r#"{
            "mcpServers": {
                "ocr": {"command": "node", "args": ["ocr.js"], "env": {"LANG": "en"}},
                "recall_lookup": {"command": "python", "args": ["-m", "recall"], "disabled": true}
            }
        }"#;
        let registry: ServiceRegistry = serde_json::from_str(raw).unwrap();
        assert_eq!(registry.len(), 2);
        let ocr = registry.get("ocr").unwrap();
        assert_eq!(ocr.command.as_deref(), Some("node"));
        assert_eq!(ocr.env.get("LANG").map(String::as_str), Some("en"));
        let enabled: Vec<_> = registry.enabled().map(|(name, _)| name).collect();
        assert_eq!(enabled, vec!["ocr"]);
    }

    #[test]
    fn from_path_reports_missing_file() {
        let err = ServiceRegistry::from_path("/nonexistent/mcp.json").unwrap_err();
        assert!(err.to_string().contains("unable to load service registry"));
    }
}
