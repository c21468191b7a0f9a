//! 运行时配置：YAML 文件叠加环境变量
//!
//! Runtime configuration. Values come from an optional YAML file and are then
//! overridden by environment variables:
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `ASSIST_CONFIG` | path of the YAML file | none |
//! | `ASSIST_TURN_TIMEOUT_MS` | `turn_timeout_ms` | 30000 |
//! | `ASSIST_MAX_MODEL_STEPS` | `max_model_steps` | 5 |
//! | `ASSIST_ALLOWED_TOOLS` | `allowed_tools` (comma separated) | `weather,qrcode,customer` |
//! | `DEEPSEEK_API_BASE_URL` | `model.base_url` | `https://api.deepseek.com/v1` |
//! | `ASSIST_MODEL` | `model.model` | `deepseek-chat` |
//!
//! The API key itself is never stored; it is read from the variable named by
//! `model.api_key_env` when the model is built.

use crate::error::ErrorContext;
use crate::orchestrator::TurnConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "ASSIST_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com/v1".to_string(),
            model: "deepseek-chat".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            temperature: None,
        }
    }
}

impl ModelConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub turn_timeout_ms: u64,
    pub max_model_steps: usize,
    /// Capacity of each turn's outbound event channel.
    pub event_buffer: usize,
    pub allowed_tools: Vec<String>,
    pub model: ModelConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            turn_timeout_ms: 30_000,
            max_model_steps: 5,
            event_buffer: 64,
            allowed_tools: vec!["weather".into(), "qrcode".into(), "customer".into()],
            model: ModelConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config file: {}", e),
                ErrorContext::new().with_source(path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    /// File named by `ASSIST_CONFIG` (or defaults), overlaid with the process
    /// environment, then validated.
    pub fn load() -> Result<Self> {
        let base = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        let config = base.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay variables resolved through `lookup`.
    pub fn apply_env_with<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ASSIST_TURN_TIMEOUT_MS") {
            self.turn_timeout_ms = parse_env("ASSIST_TURN_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("ASSIST_MAX_MODEL_STEPS") {
            self.max_model_steps = parse_env("ASSIST_MAX_MODEL_STEPS", &v)?;
        }
        if let Some(v) = lookup("ASSIST_ALLOWED_TOOLS") {
            self.allowed_tools = split_list(&v);
        }
        if let Some(v) = lookup("DEEPSEEK_API_BASE_URL") {
            self.model.base_url = v;
        }
        if let Some(v) = lookup("ASSIST_MODEL") {
            self.model.model = v;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, msg: &str| {
            Error::configuration_with_context(msg, ErrorContext::new().with_field_path(field))
        };
        if self.turn_timeout_ms == 0 {
            return Err(invalid("turn_timeout_ms", "turn timeout must be positive"));
        }
        if self.max_model_steps == 0 {
            return Err(invalid("max_model_steps", "at least one model step is required"));
        }
        if self.event_buffer == 0 {
            return Err(invalid("event_buffer", "event buffer must be positive"));
        }
        if self.allowed_tools.is_empty() {
            return Err(invalid("allowed_tools", "allow-list is empty"));
        }
        url::Url::parse(&self.model.base_url).map_err(|e| {
            Error::configuration_with_context(
                "invalid model base URL",
                ErrorContext::new()
                    .with_field_path("model.base_url")
                    .with_details(e.to_string()),
            )
        })?;
        Ok(())
    }

    pub fn turn_config(&self) -> TurnConfig {
        TurnConfig {
            turn_timeout: Duration::from_millis(self.turn_timeout_ms),
            max_model_steps: self.max_model_steps,
            event_buffer: self.event_buffer,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| {
        Error::configuration_with_context(
            format!("cannot parse {}", key),
            ErrorContext::new()
                .with_source(key)
                .with_details(format!("{:?}: {}", value, e)),
        )
    })
}

pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
