use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::llm::{with_backoff, BackoffConfig, Collaborators};
use crate::models::{SentimentIntentProfile, Transcript, UtteranceSentiment, INTENT_LABELS};

#[derive(Debug, Clone)]
pub struct SentimentConfig {
    /// Bound on in-flight collaborator calls.
    pub max_concurrency: usize,
    pub backoff: BackoffConfig,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Classify sentiment and intent for every patient utterance and aggregate
/// to a transcript-level profile. Physician utterances are not classified.
///
/// A collaborator failure for one utterance drops that utterance from the
/// profile with a warning; it never aborts the branch.
pub async fn classify_sentiment(
    transcript: &Transcript,
    collab: &Collaborators,
    config: &SentimentConfig,
) -> SentimentIntentProfile {
    let patient: Vec<(usize, String)> = transcript
        .patient_utterances()
        .map(|u| (u.index, u.text.clone()))
        .collect();

    if patient.is_empty() {
        info!("no patient utterances to classify");
        return SentimentIntentProfile::empty();
    }

    let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let mut tasks: JoinSet<Option<UtteranceSentiment>> = JoinSet::new();

    for (index, text) in patient {
        let sentiment_model = Arc::clone(&collab.sentiment);
        let intent_model = Arc::clone(&collab.intent);
        let sem = Arc::clone(&semaphore);
        let backoff = config.backoff.clone();

        tasks.spawn(async move {
            let _permit = sem.acquire_owned().await.ok();

            let sentiment = with_backoff(&backoff, || {
                let model = Arc::clone(&sentiment_model);
                let text = text.clone();
                async move { model.classify(&text).await }
            })
            .await;

            let intent = with_backoff(&backoff, || {
                let model = Arc::clone(&intent_model);
                let text = text.clone();
                async move { model.classify(&text, &INTENT_LABELS).await }
            })
            .await;

            match (sentiment, intent) {
                (Ok(s), Ok(i)) => Some(UtteranceSentiment {
                    utterance_index: index,
                    text,
                    sentiment: s.sentiment,
                    sentiment_score: s.confidence,
                    intent: i.label,
                    intent_score: i.confidence,
                }),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("classification failed for utterance {}: {}", index, e);
                    None
                }
            }
        });
    }

    let mut utterances: Vec<UtteranceSentiment> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(result)) => utterances.push(result),
            Ok(None) => {}
            Err(err) => warn!("classification task panicked: {}", err),
        }
    }
    utterances.sort_by_key(|u| u.utterance_index);

    if utterances.is_empty() {
        return SentimentIntentProfile::empty();
    }

    let dominant_sentiment =
        dominant_label(utterances.iter().map(|u| (u.utterance_index, u.sentiment)))
            .unwrap_or(crate::models::Sentiment::Neutral);
    let dominant_intent = dominant_label(
        utterances
            .iter()
            .map(|u| (u.utterance_index, u.intent.clone())),
    )
    .unwrap_or_else(|| crate::models::UNKNOWN.to_string());

    SentimentIntentProfile {
        utterances,
        dominant_sentiment,
        dominant_intent,
    }
}

/// Mode over labels, tie-broken by most-recent occurrence: the patient's
/// final state matters more than an early one.
fn dominant_label<T: Clone + Eq + Hash>(items: impl Iterator<Item = (usize, T)>) -> Option<T> {
    let mut tally: HashMap<T, (usize, usize)> = HashMap::new();
    for (index, label) in items {
        let entry = tally.entry(label).or_insert((0, 0));
        entry.0 += 1;
        entry.1 = entry.1.max(index);
    }
    tally
        .into_iter()
        .max_by_key(|(_, stats)| *stats)
        .map(|(label, _)| label)
}
