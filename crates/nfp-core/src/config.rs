use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine settings loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: Limits,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_rule_expressions: usize,
    pub max_name_len: usize,
    pub max_userdata_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_rule_expressions: 128,
            max_name_len: 255,
            max_userdata_len: 256,
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse engine config YAML")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read engine config from {:?}", path))?;
        Self::from_yaml(&content)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            log_filter: "info".to_string(),
        }
    }
}
