//! Configuration management for Studypal CLI
//!
//! Handles loading configuration from ~/.studypal/config.toml

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use studypal::{ExecutorConfig, LLMConfig, WorkflowConfig};

/// Configuration for Studypal CLI
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LLMConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".studypal")
            .join("config.toml")
    }

    /// Load configuration from the default location, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<Config>(&content)?
        } else {
            Config::default()
        };

        config.workflow.validate()?;
        config.executor.validate()?;
        Ok(config)
    }

    /// Effective configuration rendered as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.workflow, WorkflowConfig::default());
        assert_eq!(config.llm.api_key_env, "NEMOTRON_70B_KEY");
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[workflow]\nmaxAttempts = 5\n\n[executor]\nparallelismLimit = 2\n\n[llm]\nmodel = \"local\""
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();

        assert_eq!(config.workflow.max_attempts, 5);
        assert_eq!(config.workflow.recursion_limit, WorkflowConfig::default().recursion_limit);
        assert_eq!(config.executor.parallelism_limit, 2);
        assert_eq!(config.llm.model, "local");
    }

    #[test]
    fn test_invalid_rate_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[workflow]\nminCompletionRate = 1.5").unwrap();

        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[workflow]\nmaxAttempts = -1").unwrap();

        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn test_round_trips_through_toml() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[workflow]"));
        assert!(rendered.contains("maxCoordinationRounds"));
    }
}
