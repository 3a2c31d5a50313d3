// core/src/ai_client.rs
//!
//! AI client adapters: one interface in front of the LLM providers.
//!
//! The pipeline only sees [`AiClient`]. Provider adapters translate an
//! [`InstructionPayload`] into that provider's HTTP request and map every
//! failure onto the pipeline's error taxonomy:
//!
//! - no answer within the configured timeout → [`Error::AiServiceTimeout`]
//! - connection failure or non-2xx status → [`Error::AiServiceUnavailable`]
//! - 2xx answer without generated text → [`Error::MalformedAiResponse`]
//!
//! Adapters never retry.

use crate::config::{PipelineConfig, Provider};
use crate::document_processing::InstructionPayload;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// LLM generation result
#[derive(Debug, Clone)]
pub struct LlmGeneration {
    pub response: String,
    pub usage: TokenUsage,
}

/// Capability the pipeline needs from a model provider
pub trait AiClient: Send + Sync {
    /// Send the instruction and return the raw generated text
    fn invoke(&self, payload: &InstructionPayload) -> Result<LlmGeneration>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}

/// Build the adapter selected by `config.provider`
pub fn build_client(config: &PipelineConfig, api_key: impl Into<String>) -> Result<Box<dyn AiClient>> {
    let api_key = api_key.into();
    if api_key.trim().is_empty() {
        return Err(Error::Config(format!(
            "{} API key not configured (set {})",
            config.provider.display_name(),
            config.provider.api_key_vars().join(" or ")
        )));
    }

    Ok(match config.provider {
        Provider::Google => Box::new(GeminiClient::new(config, api_key)),
        Provider::OpenAI => Box::new(OpenAiCompatibleClient::new(config, api_key)),
    })
}

fn agent(config: &PipelineConfig) -> ureq::Agent {
    ureq::builder().timeout(config.timeout()).build()
}

// ============================================================================
// Google Gemini Adapter
// ============================================================================

pub struct GeminiClient {
    agent: ureq::Agent,
    api_base: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: Option<u32>,
    timeout_secs: u64,
}

impl GeminiClient {
    pub fn new(config: &PipelineConfig, api_key: impl Into<String>) -> Self {
        Self {
            agent: agent(config),
            api_base: config.api_base().to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            timeout_secs: config.timeout_secs,
        }
    }
}

impl AiClient for GeminiClient {
    fn invoke(&self, payload: &InstructionPayload) -> Result<LlmGeneration> {
        let mut generation_config = serde_json::json!({
            "temperature": self.temperature,
            "responseMimeType": payload.response_mime_type,
        });
        if let Some(max) = self.max_output_tokens {
            generation_config["maxOutputTokens"] = max.into();
        }

        let body = serde_json::json!({
            "contents": [{
                "parts": [{
                    "text": payload.prompt
                }]
            }],
            "generationConfig": generation_config
        });

        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        let request = self
            .agent
            .post(&url)
            .set("x-goog-api-key", &self.api_key)
            .set("Content-Type", "application/json");

        let response_json = send(request, &body, self.provider_name(), self.timeout_secs)?;

        if let Some(reason) = response_json["promptFeedback"]["blockReason"].as_str() {
            return Err(Error::MalformedAiResponse(format!(
                "Gemini blocked the prompt ({})",
                reason
            )));
        }

        // Gemini may split one answer over several parts
        let text = response_json["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part["text"].as_str())
                    .collect::<String>()
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| Error::MalformedAiResponse("no text in Gemini response".to_string()))?;

        let usage = TokenUsage {
            prompt_tokens: response_json["usageMetadata"]["promptTokenCount"]
                .as_u64()
                .unwrap_or(0),
            completion_tokens: response_json["usageMetadata"]["candidatesTokenCount"]
                .as_u64()
                .unwrap_or(0),
        };

        Ok(LlmGeneration {
            response: text,
            usage,
        })
    }

    fn provider_name(&self) -> &'static str {
        "Google Gemini"
    }
}

// ============================================================================
// OpenAI-Compatible Adapter (OpenAI, Groq, xAI, local gateways)
// ============================================================================

pub struct OpenAiCompatibleClient {
    agent: ureq::Agent,
    api_base: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: Option<u32>,
    timeout_secs: u64,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &PipelineConfig, api_key: impl Into<String>) -> Self {
        Self {
            agent: agent(config),
            api_base: config.api_base().to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            timeout_secs: config.timeout_secs,
        }
    }
}

impl AiClient for OpenAiCompatibleClient {
    fn invoke(&self, payload: &InstructionPayload) -> Result<LlmGeneration> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": payload.prompt
            }],
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
        });
        if let Some(max) = self.max_output_tokens {
            body["max_tokens"] = max.into();
        }

        let url = format!("{}/chat/completions", self.api_base);
        let request = self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json");

        let response_json = send(request, &body, self.provider_name(), self.timeout_secs)?;

        let text = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                Error::MalformedAiResponse(format!("no content in {} response", self.provider_name()))
            })?
            .to_string();

        let usage = TokenUsage {
            prompt_tokens: response_json["usage"]["prompt_tokens"]
                .as_u64()
                .unwrap_or(0),
            completion_tokens: response_json["usage"]["completion_tokens"]
                .as_u64()
                .unwrap_or(0),
        };

        Ok(LlmGeneration {
            response: text,
            usage,
        })
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI-compatible"
    }
}

// ============================================================================
// Transport
// ============================================================================

fn send(request: ureq::Request, body: &Value, provider: &str, timeout_secs: u64) -> Result<Value> {
    tracing::debug!(provider, url = request.url(), "calling ai service");

    let response = match request.send_json(body) {
        Ok(resp) => resp,
        Err(ureq::Error::Status(code, resp)) => {
            // Try to extract error message from response body
            let error_body: std::result::Result<Value, _> = resp.into_json();
            let error_msg = if let Ok(json) = error_body {
                json["error"]["message"]
                    .as_str()
                    .unwrap_or("Unknown API error")
                    .to_string()
            } else {
                format!("HTTP {} error", code)
            };
            return Err(Error::AiServiceUnavailable(format!(
                "{} API error (HTTP {}): {}",
                provider, code, error_msg
            )));
        }
        Err(ureq::Error::Transport(transport)) => {
            if is_timeout(&transport) {
                return Err(Error::AiServiceTimeout { seconds: timeout_secs });
            }
            return Err(Error::AiServiceUnavailable(format!(
                "failed to connect to {} API: {}",
                provider, transport
            )));
        }
    };

    response.into_json::<Value>().map_err(|e| {
        if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) {
            Error::AiServiceTimeout { seconds: timeout_secs }
        } else {
            Error::MalformedAiResponse(format!("{} API answered with invalid JSON: {}", provider, e))
        }
    })
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    let mut source = std::error::Error::source(transport);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if matches!(io.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) {
                return true;
            }
        }
        source = err.source();
    }
    transport.to_string().contains("timed out")
}
