//! LLM capability seam: classification and free-text generation.
//!
//! The synthesis stages only see the `LlmProvider` trait. A concrete
//! OpenAI-compatible HTTP provider (OpenRouter and friends) is included;
//! tests substitute their own implementations.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SynthesisError;

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Default deadline for a single capability call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for a classification call
#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    /// Allowed categories; the provider must pick one or return none
    pub categories: Vec<String>,
    /// Optional hint about what is being classified
    pub context: Option<String>,
}

/// Result of a classification call.
///
/// `category` is `None` when the model could not decide; providers must
/// return that rather than erroring on an undecidable prompt.
#[derive(Debug, Clone)]
pub struct Classification {
    pub category: Option<String>,
    pub confidence: f32,
    pub reasoning: Option<String>,
}

/// Result of a free-text generation call
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
}

/// Classification/generation capability consumed by the synthesis stages
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Classify a prompt into one of the given categories
    async fn classify(
        &self,
        prompt: &str,
        options: &ClassifyOptions,
    ) -> Result<Classification, SynthesisError>;

    /// Generate free text for a prompt. May fail on transport errors;
    /// callers are expected to fall back deterministically.
    async fn generate(&self, prompt: &str) -> Result<Generation, SynthesisError>;
}

/// Configuration for an OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Extra headers to include in requests (e.g. X-Title, HTTP-Referer)
    pub extra_headers: Vec<(String, String)>,
    /// Per-call deadline
    pub timeout: Duration,
}

impl ProviderConfig {
    /// OpenRouter provider configuration
    pub fn openrouter(api_key: String, model: String) -> Self {
        Self {
            base_url: OPENROUTER_BASE_URL.to_string(),
            api_key,
            model,
            extra_headers: vec![
                (
                    "HTTP-Referer".to_string(),
                    "https://github.com/soul-synth".to_string(),
                ),
                ("X-Title".to_string(), "soul-synth".to_string()),
            ],
            timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// HTTP client for OpenAI-compatible chat completion APIs
#[derive(Clone)]
pub struct OpenRouterProvider {
    client: Client,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenRouterProvider {
    pub fn new(config: ProviderConfig) -> AnyResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Single chat completion round-trip with the configured deadline.
    async fn chat(&self, prompt: &str) -> Result<String, SynthesisError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: Some(512),
        };

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key);
        for (key, value) in &self.config.extra_headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let send = req.json(&request).send();
        let response = tokio::time::timeout(self.config.timeout, send)
            .await
            .map_err(|_| SynthesisError::Timeout(self.config.timeout))?
            .map_err(|e| {
                if e.is_timeout() {
                    SynthesisError::Timeout(self.config.timeout)
                } else {
                    SynthesisError::CapabilityUnavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::CapabilityUnavailable(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::CapabilityUnavailable(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| {
                SynthesisError::CapabilityUnavailable("empty completion response".to_string())
            })
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    async fn classify(
        &self,
        prompt: &str,
        options: &ClassifyOptions,
    ) -> Result<Classification, SynthesisError> {
        let raw = self.chat(prompt).await?;
        let answer = raw.trim().to_lowercase();

        // Accept only an exact category name; anything else is undecided
        // and reported back as reasoning for the retry loop.
        let category = options
            .categories
            .iter()
            .find(|c| c.to_lowercase() == answer)
            .cloned();

        let confidence = if category.is_some() { 0.9 } else { 0.0 };
        let reasoning = if category.is_none() {
            Some(raw.trim().to_string())
        } else {
            None
        };

        Ok(Classification {
            category,
            confidence,
            reasoning,
        })
    }

    async fn generate(&self, prompt: &str) -> Result<Generation, SynthesisError> {
        let text = self.chat(prompt).await?;
        Ok(Generation { text })
    }
}

/// Escape angle brackets so user text cannot break out of prompt tags.
pub fn sanitize_for_prompt(text: &str) -> String {
    text.replace('<', "&lt;").replace('>', "&gt;")
}
