use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::ServiceError;
use crate::llm::{IntentModel, IntentScore, NerEntity, NerModel, QaAnswer, QaModel};
use crate::llm::{SentimentModel, SentimentScore};
use crate::models::Sentiment;

/// Model IDs for the hosted inference backends.
pub const MEDICAL_NER_MODEL: &str = "d4data/biomedical-ner-all";
pub const GENERAL_NER_MODEL: &str = "dbmdz/bert-large-cased-finetuned-conll03-english";
pub const QA_MODEL: &str = "deepset/roberta-large-squad2";
pub const SENTIMENT_MODEL: &str = "distilbert-base-uncased-finetuned-sst-2-english";
pub const INTENT_MODEL: &str = "facebook/bart-large-mnli";

/// Configuration for the Hugging Face Inference API client
#[derive(Debug, Clone)]
pub struct HfConfig {
    /// API token (from HF_API_TOKEN env var)
    pub api_token: String,
    /// Base URL, overridable for tests
    pub base_url: String,
}

impl HfConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self> {
        let api_token =
            std::env::var("HF_API_TOKEN").context("HF_API_TOKEN environment variable not set")?;

        Ok(Self {
            api_token,
            base_url: "https://api-inference.huggingface.co/models".to_string(),
        })
    }

    pub fn new(api_token: String, base_url: String) -> Self {
        Self {
            api_token,
            base_url,
        }
    }
}

/// Hugging Face Inference API client shared by all hosted classifier
/// collaborators.
pub struct HfClient {
    client: Client,
    config: HfConfig,
}

impl HfClient {
    pub fn new(config: HfConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// POST a task payload to a model endpoint and decode the response.
    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        model: &str,
        body: &B,
    ) -> Result<R, ServiceError> {
        let url = format!("{}/{}", self.config.base_url, model);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_token)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::Transient(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ServiceError::Auth(format!(
                "inference API rejected token for {}",
                model
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ServiceError::Malformed(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Serialize)]
struct QaRequest<'a> {
    inputs: QaInputs<'a>,
}

#[derive(Debug, Serialize)]
struct QaInputs<'a> {
    question: &'a str,
    context: &'a str,
}

#[derive(Debug, Serialize)]
struct ZeroShotRequest<'a> {
    inputs: &'a str,
    parameters: ZeroShotParameters<'a>,
}

#[derive(Debug, Serialize)]
struct ZeroShotParameters<'a> {
    candidate_labels: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct NerResponseEntity {
    entity_group: String,
    word: String,
    score: f64,
    #[serde(default)]
    start: usize,
    #[serde(default)]
    end: usize,
}

#[derive(Debug, Deserialize)]
struct QaResponse {
    score: f64,
    answer: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ClassificationLabel {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct ZeroShotResponse {
    labels: Vec<String>,
    scores: Vec<f64>,
}

/// NER collaborator backed by a hosted token-classification model.
pub struct HfNer {
    client: Arc<HfClient>,
    model: String,
}

impl HfNer {
    pub fn new(client: Arc<HfClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl NerModel for HfNer {
    async fn extract(&self, text: &str) -> Result<Vec<NerEntity>, ServiceError> {
        let entities: Vec<NerResponseEntity> = self
            .client
            .post(&self.model, &TextRequest { inputs: text })
            .await?;

        Ok(entities
            .into_iter()
            .map(|e| NerEntity {
                // Strip wordpiece continuation markers some taggers leak
                text: e.word.replace("##", ""),
                label: e.entity_group,
                start: e.start,
                end: e.end,
                confidence: e.score,
            })
            .collect())
    }
}

/// Extractive QA collaborator.
pub struct HfQa {
    client: Arc<HfClient>,
    model: String,
}

impl HfQa {
    pub fn new(client: Arc<HfClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl QaModel for HfQa {
    async fn answer(&self, context: &str, question: &str) -> Result<QaAnswer, ServiceError> {
        let response: QaResponse = self
            .client
            .post(
                &self.model,
                &QaRequest {
                    inputs: QaInputs { question, context },
                },
            )
            .await?;

        Ok(QaAnswer {
            text: response.answer,
            confidence: response.score,
        })
    }
}

/// Sentiment collaborator.
///
/// The hosted model is binary (POSITIVE/NEGATIVE); the pipeline's three-way
/// label is derived by mapping POSITIVE to Reassured, NEGATIVE to Anxious,
/// and anything below the margin to Neutral.
pub struct HfSentiment {
    client: Arc<HfClient>,
    model: String,
    /// Scores below this are treated as Neutral.
    pub neutral_margin: f64,
}

impl HfSentiment {
    pub fn new(client: Arc<HfClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            neutral_margin: 0.7,
        }
    }
}

#[async_trait]
impl SentimentModel for HfSentiment {
    async fn classify(&self, text: &str) -> Result<SentimentScore, ServiceError> {
        // The text-classification task wraps results in an outer array
        let response: Vec<Vec<ClassificationLabel>> = self
            .client
            .post(&self.model, &TextRequest { inputs: text })
            .await?;

        let best = response
            .first()
            .and_then(|labels| {
                labels
                    .iter()
                    .max_by(|a, b| a.score.total_cmp(&b.score))
                    .cloned()
            })
            .ok_or_else(|| ServiceError::Malformed("empty classification response".into()))?;

        let sentiment = if best.score < self.neutral_margin {
            Sentiment::Neutral
        } else if best.label.eq_ignore_ascii_case("positive") {
            Sentiment::Reassured
        } else {
            Sentiment::Anxious
        };

        Ok(SentimentScore {
            sentiment,
            confidence: best.score,
        })
    }
}

/// Zero-shot intent collaborator.
pub struct HfIntent {
    client: Arc<HfClient>,
    model: String,
}

impl HfIntent {
    pub fn new(client: Arc<HfClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl IntentModel for HfIntent {
    async fn classify(&self, text: &str, labels: &[&str]) -> Result<IntentScore, ServiceError> {
        let response: ZeroShotResponse = self
            .client
            .post(
                &self.model,
                &ZeroShotRequest {
                    inputs: text,
                    parameters: ZeroShotParameters {
                        candidate_labels: labels.to_vec(),
                    },
                },
            )
            .await?;

        // Zero-shot results come back sorted by score, best first
        match (response.labels.first(), response.scores.first()) {
            (Some(label), Some(&score)) => Ok(IntentScore {
                label: label.clone(),
                confidence: score,
            }),
            _ => Err(ServiceError::Malformed(
                "zero-shot response had no labels".into(),
            )),
        }
    }
}
