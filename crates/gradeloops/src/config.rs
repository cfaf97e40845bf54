//! Project configuration file support for gradeloops.
//!
//! Loads configuration from `gradeloops.toml` at the project root.

use anyhow::{Context, Result};
use gradeloops_model::{
    OpenAiConfig, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project-level configuration loaded from `gradeloops.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Output root, relative to the project root unless absolute
    pub output_dir: Option<PathBuf>,
    /// Model endpoint settings
    #[serde(default)]
    pub model: ModelConfig,
    /// Run mirror settings
    #[serde(default)]
    pub mirror: MirrorConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub name: Option<String>,
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MirrorConfig {
    pub enabled: Option<bool>,
    pub database: Option<PathBuf>,
}

/// The config file name
pub const CONFIG_FILE_NAME: &str = "gradeloops.toml";

impl ProjectConfig {
    /// Load configuration from the project root.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(project_root: &Path) -> Result<Option<Self>> {
        let config_path = project_root.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }

    /// Resolve model endpoint settings.
    /// Priority per field: CLI flag > environment > config file > default
    pub fn model_config(
        &self,
        cli_model: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> OpenAiConfig {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let model = cli_model
            .map(String::from)
            .or_else(|| lookup("OPENAI_MODEL"))
            .or_else(|| self.model.name.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = lookup("OPENAI_BASE_URL")
            .or_else(|| self.model.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let api_key_env = self
            .model
            .api_key_env
            .clone()
            .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
        let api_key = lookup(&api_key_env);
        let timeout = Duration::from_secs(self.model.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

        OpenAiConfig {
            model,
            base_url,
            api_key_env,
            api_key,
            ..OpenAiConfig::default()
        }
        .with_timeout(timeout)
    }

    /// Whether run records should be mirrored.
    /// `--no-mirror` wins; otherwise the file decides, defaulting to on.
    pub fn mirror_enabled(&self, no_mirror: bool) -> bool {
        !no_mirror && self.mirror.enabled.unwrap_or(true)
    }

    /// Mirror database path. Priority: CLI flag > config file > None (default location)
    pub fn mirror_database(&self, cli_path: Option<&Path>, project_root: &Path) -> Option<PathBuf> {
        cli_path
            .map(Path::to_path_buf)
            .or_else(|| self.mirror.database.clone())
            .map(|p| if p.is_absolute() { p } else { project_root.join(p) })
    }
}
