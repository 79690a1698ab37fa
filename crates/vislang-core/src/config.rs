//! Pipeline configuration
//!
//! Layered: defaults, then an optional TOML file, then environment.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model identifier passed to the text oracle
    pub model: String,
    /// OpenAI-compatible endpoint
    pub api_base: String,
    /// Bearer token
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Field selection attempts
    pub selection_attempts: usize,
    /// Spec generation attempts per path
    pub generation_attempts: usize,
    /// Judgment attempts
    pub judgment_attempts: usize,
    /// Ranked models requested from the design oracle
    pub design_models: usize,
    /// Rows shown to the oracle
    pub sample_rows: usize,
    /// Root for run directories
    pub log_root: PathBuf,
    /// Write run artifacts
    pub log_enabled: bool,
    /// Search roots for relative data paths
    pub data_roots: Vec<PathBuf>,
    /// Per-call timeout for the text oracle
    pub request_timeout_secs: u64,
    /// Design oracle command line
    pub design_command: String,
    /// `vl-convert` binary
    pub vl_convert: PathBuf,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With model
    #[inline]
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// With API base URL
    #[inline]
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// With logging toggled
    #[inline]
    #[must_use]
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.log_enabled = enabled;
        self
    }

    /// With log root
    #[inline]
    #[must_use]
    pub fn with_log_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.log_root = root.into();
        self
    }

    /// With the same attempt budget for every retry loop
    #[inline]
    #[must_use]
    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.selection_attempts = attempts;
        self.generation_attempts = attempts;
        self.judgment_attempts = attempts;
        self
    }

    /// With data search roots
    #[inline]
    #[must_use]
    pub fn with_data_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.data_roots = roots;
        self
    }

    /// Load defaults, overlay `path` if given, then the environment
    ///
    /// # Errors
    /// `ConfigError` if the file cannot be read or parsed, or a value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; missing keys keep their defaults
    ///
    /// # Errors
    /// `ConfigError::Read` or `ConfigError::Parse`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse`.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay environment variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = non_empty("VISLANG_MODEL") {
            self.model = model;
        }
        if let Some(base) = non_empty("VISLANG_API_BASE") {
            self.api_base = base;
        }
        if let Some(key) = non_empty("VISLANG_API_KEY").or_else(|| non_empty("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(dir) = non_empty("VISLANG_LOG_DIR") {
            self.log_root = PathBuf::from(dir);
        }
        if let Some(cmd) = non_empty("VISLANG_DRACO_CMD") {
            self.design_command = cmd;
        }
        if let Some(bin) = non_empty("VISLANG_VL_CONVERT") {
            self.vl_convert = PathBuf::from(bin);
        }
    }

    /// Reject out-of-range values
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("selection_attempts", self.selection_attempts),
            ("generation_attempts", self.generation_attempts),
            ("judgment_attempts", self.judgment_attempts),
            ("design_models", self.design_models),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least 1".into(),
                });
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "request_timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "model",
                reason: "must not be empty".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid {
                field: "temperature",
                reason: format!("{} is outside 0.0..=2.0", self.temperature),
            });
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-opus-4-6".into(),
            api_base: "http://localhost:4000/v1".into(),
            api_key: None,
            temperature: 0.2,
            selection_attempts: 3,
            generation_attempts: 3,
            judgment_attempts: 3,
            design_models: 1,
            sample_rows: 3,
            log_root: PathBuf::from("logs"),
            log_enabled: true,
            data_roots: vec![PathBuf::from("vega-datasets/data"), PathBuf::from(".")],
            request_timeout_secs: 120,
            design_command: "python -m draco_bridge".into(),
            vl_convert: PathBuf::from("vl-convert"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.generation_attempts, 3);
        assert_eq!(config.data_roots.len(), 2);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            model = "openai/gpt-4o"
            generation_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.model, "openai/gpt-4o");
        assert_eq!(config.generation_attempts, 5);
        assert_eq!(config.selection_attempts, 3);
        assert!(config.log_enabled);
    }

    #[test]
    fn bad_toml_is_parse_error() {
        let err = PipelineConfig::from_toml("generation_attempts = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_and_key_fallback() {
        let env: HashMap<&str, &str> = [
            ("VISLANG_MODEL", "anthropic/claude-sonnet-4-5"),
            ("OPENAI_API_KEY", "sk-test"),
            ("VISLANG_LOG_DIR", "/tmp/vislang"),
            ("VISLANG_API_BASE", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = PipelineConfig::default();
        config.apply_env(|k| env.get(k).map(ToString::to_string));

        assert_eq!(config.model, "anthropic/claude-sonnet-4-5");
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.log_root, PathBuf::from("/tmp/vislang"));
        assert_eq!(config.api_base, "http://localhost:4000/v1");
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = PipelineConfig::default().with_attempts(0).validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "selection_attempts",
                ..
            }
        ));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = PipelineConfig::from_file(Path::new("/nonexistent/vislang.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
