//! Agent configuration

use matchreport_error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::length::{DEFAULT_MAX_WORDS, DEFAULT_MIN_WORDS};

/// Configuration for the report agent.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// max_retries = 5
/// language = "English"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Inclusive lower bound of the report length, in words
    pub min_words: usize,
    /// Inclusive upper bound of the report length, in words
    pub max_words: usize,
    /// Regenerations allowed after the first draft is rejected
    pub max_retries: usize,
    /// Language the report is written in
    pub language: String,
    /// Model override; the provider default is used when unset
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            min_words: DEFAULT_MIN_WORDS,
            max_words: DEFAULT_MAX_WORDS,
            max_retries: 3,
            language: "Czech".to_string(),
            model: None,
            temperature: None,
            max_tokens: 2048,
        }
    }
}

impl AgentConfig {
    /// Parse a config from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| {
            Error::config_invalid("failed to parse config")
                .with_operation("config::from_toml_str")
                .set_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::from(e).with_context("path", path.display().to_string()))?;
        Self::from_toml_str(&text).map_err(|e| e.with_context("path", path.display().to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_words == 0 {
            return Err(Error::config_invalid("min_words must be positive")
                .with_operation("config::validate"));
        }
        if self.min_words > self.max_words {
            return Err(Error::config_invalid(format!(
                "min_words ({}) exceeds max_words ({})",
                self.min_words, self.max_words
            ))
            .with_operation("config::validate"));
        }
        if self.language.trim().is_empty() {
            return Err(Error::config_invalid("language must not be empty")
                .with_operation("config::validate"));
        }
        Ok(())
    }

    /// Word count the generator should aim for (midpoint of the range)
    pub fn target_words(&self) -> usize {
        (self.min_words + self.max_words) / 2
    }
}
