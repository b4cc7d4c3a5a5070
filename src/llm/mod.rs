pub mod backoff;
pub mod client;
pub mod gemini;
pub mod prompts;
pub mod validation;

pub use backoff::{with_backoff, BackoffConfig};
pub use client::{HfClient, HfConfig, HfIntent, HfNer, HfQa, HfSentiment};
pub use gemini::{GeminiClient, GeminiConfig};
pub use prompts::{build_correction_prompt, build_soap_prompt, SOAP_INSTRUCTIONS};
pub use validation::{missing_facts, parse_sections, SoapSections};

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::models::Sentiment;

/// One entity from an NER collaborator.
#[derive(Debug, Clone)]
pub struct NerEntity {
    pub text: String,
    /// Raw label group as the model reports it (e.g. "Sign_symptom", "PER").
    pub label: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
}

/// Answer from the extractive QA collaborator. An empty or low-confidence
/// answer is a normal result, never an error.
#[derive(Debug, Clone)]
pub struct QaAnswer {
    pub text: String,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct SentimentScore {
    pub sentiment: Sentiment,
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct IntentScore {
    pub label: String,
    pub confidence: f64,
}

/// Named-entity recognition collaborator.
#[async_trait]
pub trait NerModel: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<NerEntity>, ServiceError>;
}

/// Extractive question-answering collaborator.
#[async_trait]
pub trait QaModel: Send + Sync {
    async fn answer(&self, context: &str, question: &str) -> Result<QaAnswer, ServiceError>;
}

/// Three-way sentiment collaborator.
#[async_trait]
pub trait SentimentModel: Send + Sync {
    async fn classify(&self, text: &str) -> Result<SentimentScore, ServiceError>;
}

/// Zero-shot intent collaborator over a caller-supplied label set.
#[async_trait]
pub trait IntentModel: Send + Sync {
    async fn classify(&self, text: &str, labels: &[&str]) -> Result<IntentScore, ServiceError>;
}

/// Generative note-writing collaborator.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// The full set of black-box collaborators a pipeline run needs. Arc'd so
/// per-utterance fan-out tasks can hold their own handles.
#[derive(Clone)]
pub struct Collaborators {
    pub medical_ner: Arc<dyn NerModel>,
    pub general_ner: Arc<dyn NerModel>,
    pub qa: Arc<dyn QaModel>,
    pub sentiment: Arc<dyn SentimentModel>,
    pub intent: Arc<dyn IntentModel>,
    pub generative: Arc<dyn GenerativeModel>,
}
