//! `adless` configuration file.
//!
//! Every field has a default, so `{}` is a complete configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use adless_rewrite::RewriteOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rules: RulesConfig,
    pub fetch: FetchConfig,
    pub rewrite: RewriteOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Block-list sources: file paths or http(s) URLs
    pub sources: Vec<String>,
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub document_timeout_ms: u64,
    pub rule_list_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            sources: vec!["https://easylist.to/easylist/easylist.txt".to_string()],
            refresh_interval_secs: 3600,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            document_timeout_ms: 5000,
            rule_list_timeout_ms: 5000,
            user_agent: format!("adless/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RulesConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

impl FetchConfig {
    pub fn document_timeout(&self) -> Duration {
        Duration::from_millis(self.document_timeout_ms)
    }

    pub fn rule_list_timeout(&self) -> Duration {
        Duration::from_millis(self.rule_list_timeout_ms)
    }
}

impl Config {
    /// Load from a JSON file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
        Self::from_json(&text).map_err(|e| format!("Invalid config '{}': {}", path.display(), e))
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
