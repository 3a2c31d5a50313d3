// core/src/config.rs
//!
//! Pipeline configuration.
//!
//! Everything the pipeline needs to know about its environment (which model to
//! call, how long to wait, how large an upload may be) lives in
//! [`PipelineConfig`] and is passed to [`crate::Pipeline::new`]. Nothing is read
//! from process-wide state. API keys are not part of this struct;
//! the caller supplies them to the client constructor.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// LLM providers with a built-in adapter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    OpenAI,
}

impl Provider {
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Google => "Google (Gemini)",
            Provider::OpenAI => "OpenAI-compatible",
        }
    }

    /// Environment variables consulted for this provider's API key, in order
    pub fn api_key_vars(&self) -> &'static [&'static str] {
        match self {
            Provider::Google => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Provider::OpenAI => &["OPENAI_API_KEY"],
        }
    }

    pub fn default_api_base(&self) -> &'static str {
        match self {
            Provider::Google => "https://generativelanguage.googleapis.com/v1beta",
            Provider::OpenAI => "https://api.openai.com/v1",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub provider: Provider,
    pub model: String,

    /// Overrides the provider's public endpoint (proxies, local gateways)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// Upper bound for a single AI call
    pub timeout_secs: u64,

    pub temperature: f32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,

    /// Where uploads are staged while a request runs. Defaults to the system
    /// temp directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Google,
            model: DEFAULT_MODEL.to_string(),
            api_base: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            upload_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::Config("model must not be empty".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be at least 1".to_string()));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be positive".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::Config(format!(
                "temperature {} is outside 0.0..=2.0",
                self.temperature
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_base())
            .trim_end_matches('/')
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
