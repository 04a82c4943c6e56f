//! Configuration for the detection engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{DetectionError, Result, CLARIFICATION_THRESHOLD};

/// Configuration for a [`DetectionEngine`](crate::DetectionEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Knowledge base file (JSON or YAML); `None` uses the built-in catalog
    pub knowledge_base_path: Option<String>,
    /// LLM classification settings
    pub llm: LlmConfig,
    /// Confidence below which a detected principle needs a clarifying question
    pub clarification_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            knowledge_base_path: None,
            llm: LlmConfig::default(),
            clarification_threshold: CLARIFICATION_THRESHOLD,
        }
    }
}

impl DetectionConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.clarification_threshold) {
            return Err(DetectionError::Config(format!(
                "clarification_threshold {} outside [0, 1]",
                self.clarification_threshold
            )));
        }
        if self.llm.enabled {
            if self.llm.model.trim().is_empty() {
                return Err(DetectionError::Config(
                    "llm.model must be set when llm.enabled".to_string(),
                ));
            }
            if self.llm.timeout_ms == 0 {
                return Err(DetectionError::Config(
                    "llm.timeout_ms must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// LLM classification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Use the LLM path before keyword matching
    pub enabled: bool,
    /// OpenAI-compatible API base URL
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token cap
    pub max_tokens: Option<u32>,
    /// Time allowed for the single classification call (milliseconds)
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: Some("OPENAI_API_KEY".to_string()),
            temperature: 0.3,
            max_tokens: Some(1024),
            timeout_ms: 15_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
    }

    /// Classification timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
