//! covgap configuration
//!
//! Handles loading of the optional `covgap.yaml` file and merging it with
//! command-line overrides into the options an analysis run uses.

use crate::coverage::CoverageMetricKind;
use crate::error::{Error, Result};
use crate::gaps::ThresholdPolicy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default configuration file name looked up in the working directory
pub const CONFIG_FILE: &str = "covgap.yaml";

/// Project configuration (`covgap.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CovgapConfig {
    /// Schema version for migrations
    pub version: u32,

    /// Per-metric threshold overrides in percent
    #[serde(default)]
    pub thresholds: BTreeMap<CoverageMetricKind, u32>,

    /// Also enforce INSTRUCTION and CLASS thresholds
    #[serde(default)]
    pub full_threshold_table: bool,

    /// Continue with the remaining sources when one is malformed
    #[serde(default)]
    pub allow_partial: bool,

    /// Scenario suggestion settings
    #[serde(default)]
    pub suggestions: SuggestionConfig,
}

impl Default for CovgapConfig {
    fn default() -> Self {
        Self {
            version: 1,
            thresholds: BTreeMap::new(),
            full_threshold_table: false,
            allow_partial: false,
            suggestions: SuggestionConfig::default(),
        }
    }
}

/// What to do when the external suggestion program fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionFallback {
    /// Use the deterministic synthesizer
    #[default]
    Deterministic,
    /// Return no suggestions
    None,
}

/// Scenario suggestion configuration
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SuggestionConfig {
    /// External program that turns gaps into scenarios (stdin/stdout JSON)
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments passed to the program
    #[serde(default)]
    pub args: Vec<String>,

    /// Seconds before the program is killed
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub fallback: SuggestionFallback,
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
            fallback: SuggestionFallback::default(),
        }
    }
}

impl SuggestionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CovgapConfig {
    /// Load a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        Self::from_yaml(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Load `covgap.yaml` from a directory if present
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let file = dir.join(CONFIG_FILE);
        if !file.exists() {
            return Ok(None);
        }
        Self::load(&file).map(Some)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: CovgapConfig = serde_norway::from_str(yaml)?;

        // Validate version
        if config.version != 1 {
            return Err(Error::Config(format!(
                "Unsupported config version: {}",
                config.version
            )));
        }
        Ok(config)
    }

    /// Threshold table after applying the full-table flag and overrides
    pub fn threshold_policy(&self) -> ThresholdPolicy {
        let base = if self.full_threshold_table {
            ThresholdPolicy::full()
        } else {
            ThresholdPolicy::default()
        };
        base.with_overrides(&self.thresholds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_minimal_yaml() {
        let config = CovgapConfig::from_yaml("version: 1\n").unwrap();
        assert!(!config.allow_partial);
        assert_eq!(config.suggestions.timeout_secs, 120);
        assert_eq!(config.suggestions.fallback, SuggestionFallback::Deterministic);
        assert_eq!(config.threshold_policy(), ThresholdPolicy::default());
    }

    #[test]
    fn test_threshold_overrides() {
        let config = CovgapConfig::from_yaml(
            "version: 1\nfull_threshold_table: true\nthresholds:\n  LINE: 60\n  BRANCH: 150\n",
        )
        .unwrap();
        let policy = config.threshold_policy();
        assert_eq!(policy.threshold(CoverageMetricKind::Line), Some(60));
        assert_eq!(policy.threshold(CoverageMetricKind::Branch), Some(100));
        assert_eq!(policy.threshold(CoverageMetricKind::Class), Some(90));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let err = CovgapConfig::from_yaml("version: 2\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_dir() {
        let temp = TempDir::new().unwrap();
        assert!(CovgapConfig::load_from_dir(temp.path()).unwrap().is_none());

        fs::write(
            temp.path().join(CONFIG_FILE),
            "version: 1\nallow_partial: true\nsuggestions:\n  command: suggest-bot\n  fallback: none\n",
        )
        .unwrap();
        let config = CovgapConfig::load_from_dir(temp.path()).unwrap().unwrap();
        assert!(config.allow_partial);
        assert_eq!(config.suggestions.command.as_deref(), Some("suggest-bot"));
        assert_eq!(config.suggestions.fallback, SuggestionFallback::None);
    }
}
