use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::llm::GenerativeModel;

/// Configuration for the Gemini generative client
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key (from GEMINI_API_KEY env var)
    pub api_key: String,
    /// Model to use (e.g., "gemini-2.5-pro")
    pub model: String,
    /// Temperature (0-1, lower = more deterministic)
    pub temperature: f64,
    /// Maximum tokens in response
    pub max_output_tokens: u32,
    /// Base URL, overridable for tests
    pub base_url: String,
}

impl GeminiConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .context("GEMINI_API_KEY environment variable not set")?;

        Ok(Self {
            api_key,
            model: "gemini-2.5-pro".to_string(),
            temperature: 0.2,
            max_output_tokens: 2048,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        })
    }

    /// Create with custom settings
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            temperature: 0.2,
            max_output_tokens: 2048,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }
}

/// Gemini API client for SOAP note generation
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::Transient(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ServiceError::Auth("Gemini API rejected the key".into()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))?;

        // Extract text from the first candidate's first part
        response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| ServiceError::Malformed("no candidate text in response".into()))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}
