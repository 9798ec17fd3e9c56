//! Corpus-level settings, read from an optional `vellum.yml` at the corpus root

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "vellum.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VellumConfig {
    /// Upper bound for a single document read
    pub load_timeout_ms: u64,

    /// Advisory maximum lengths of multilingual fields, by field name
    pub max_lengths: BTreeMap<String, usize>,

    /// File extensions treated as corpus documents
    pub extensions: Vec<String>,
}

impl Default for VellumConfig {
    fn default() -> Self {
        Self {
            load_timeout_ms: 5_000,
            max_lengths: BTreeMap::from([("name".to_string(), 500)]),
            extensions: vec!["yml".to_string(), "yaml".to_string(), "json".to_string()],
        }
    }
}

impl VellumConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse vellum configuration")
    }

    /// Read `vellum.yml` from `root`, falling back to defaults when it is absent
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid {}", config_path.display()))
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn max_length(&self, field: &str) -> Option<usize> {
        self.max_lengths.get(field).copied()
    }
}
