use serde::{Deserialize, Serialize};

/// Three-way patient sentiment label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentiment {
    Anxious,
    Neutral,
    Reassured,
}

/// Candidate labels for the zero-shot intent collaborator.
pub const INTENT_LABELS: [&str; 5] = [
    "Seeking reassurance",
    "Reporting symptoms",
    "Expressing concern",
    "Expressing gratitude",
    "Reporting outcome",
];

/// Sentiment and intent attached to one patient utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtteranceSentiment {
    pub utterance_index: usize,
    pub text: String,
    pub sentiment: Sentiment,
    pub sentiment_score: f64,
    pub intent: String,
    pub intent_score: f64,
}

/// Transcript-level sentiment/intent profile.
///
/// Dominant labels are the mode over all patient utterances, tie-broken by
/// most-recent occurrence: the patient's final emotional state outweighs an
/// early one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentIntentProfile {
    pub utterances: Vec<UtteranceSentiment>,
    pub dominant_sentiment: Sentiment,
    pub dominant_intent: String,
}

impl SentimentIntentProfile {
    /// Profile for a transcript with no classifiable patient utterances.
    pub fn empty() -> Self {
        Self {
            utterances: Vec::new(),
            dominant_sentiment: Sentiment::Neutral,
            dominant_intent: crate::models::record::UNKNOWN.to_string(),
        }
    }
}
