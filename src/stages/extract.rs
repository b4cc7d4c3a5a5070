use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::llm::{with_backoff, BackoffConfig, Collaborators, NerModel};
use crate::models::{CandidateSpan, SpanLabel, SourceModel, Transcript};

/// Fixed clinical questions driving the extractive QA collaborator. Each
/// answer becomes a candidate span for the named label.
pub const CLINICAL_QUESTIONS: [(SpanLabel, &str); 5] = [
    (SpanLabel::Diagnosis, "What was the patient diagnosed with?"),
    (
        SpanLabel::CurrentStatus,
        "What pain or symptoms is the patient still experiencing?",
    ),
    (SpanLabel::Prognosis, "What is the doctor's prognosis?"),
    (SpanLabel::SignSymptom, "What symptoms does the patient have?"),
    (
        SpanLabel::TherapeuticProcedure,
        "What treatment did the patient receive?",
    ),
];

#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Bound on in-flight collaborator calls.
    pub max_concurrency: usize,
    /// QA answers below this score are discarded as "no answer found".
    pub qa_min_confidence: f64,
    pub backoff: BackoffConfig,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            qa_min_confidence: 0.1,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Map a raw NER label group to the closed span label set. Unmapped groups
/// (dates, locations, lab values) are dropped here, not in the aggregator.
fn map_ner_label(group: &str) -> Option<SpanLabel> {
    match group {
        "Sign_symptom" => Some(SpanLabel::SignSymptom),
        "Medication" => Some(SpanLabel::Medication),
        "Therapeutic_procedure" => Some(SpanLabel::TherapeuticProcedure),
        "Diagnostic_procedure" => Some(SpanLabel::DiagnosticProcedure),
        "PER" => Some(SpanLabel::Person),
        _ => None,
    }
}

/// Invoke the NER and QA collaborators and return every raw observation,
/// unfiltered and unmerged. Pure mapping from utterances to candidate spans;
/// all conflict resolution belongs to the aggregator.
///
/// Per-utterance calls run concurrently under a semaphore; a collaborator
/// that fails after bounded retries contributes no spans (degraded, not
/// fatal). Output is sorted so it never depends on call completion order.
pub async fn extract_entities(
    transcript: &Transcript,
    collab: &Collaborators,
    config: &ExtractConfig,
) -> Vec<CandidateSpan> {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
    let mut tasks: JoinSet<Vec<CandidateSpan>> = JoinSet::new();

    // NER runs per utterance, for both taggers.
    for utterance in &transcript.utterances {
        let taggers: [(Arc<dyn NerModel>, SourceModel); 2] = [
            (Arc::clone(&collab.medical_ner), SourceModel::MedicalNer),
            (Arc::clone(&collab.general_ner), SourceModel::GeneralNer),
        ];
        for (tagger, source) in taggers {
            let text = utterance.text.clone();
            let index = utterance.index;
            let sem = Arc::clone(&semaphore);
            let backoff = config.backoff.clone();

            tasks.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let result = with_backoff(&backoff, || {
                    let tagger = Arc::clone(&tagger);
                    let text = text.clone();
                    async move { tagger.extract(&text).await }
                })
                .await;

                match result {
                    Ok(entities) => entities
                        .into_iter()
                        .filter_map(|e| {
                            map_ner_label(&e.label).map(|label| CandidateSpan {
                                text: e.text,
                                label,
                                source,
                                utterance_index: index,
                                offset: e.start,
                                confidence: e.confidence.clamp(0.0, 1.0),
                            })
                        })
                        .collect(),
                    Err(err) => {
                        warn!("{:?} failed for utterance {}: {}", source, index, err);
                        Vec::new()
                    }
                }
            });
        }
    }

    // QA runs once over the whole transcript per question.
    let context = transcript.render();
    let utterance_texts: Vec<String> = transcript
        .utterances
        .iter()
        .map(|u| u.text.to_lowercase())
        .collect();

    for (label, question) in CLINICAL_QUESTIONS {
        let qa = Arc::clone(&collab.qa);
        let context = context.clone();
        let texts = utterance_texts.clone();
        let sem = Arc::clone(&semaphore);
        let backoff = config.backoff.clone();
        let min_confidence = config.qa_min_confidence;

        tasks.spawn(async move {
            let _permit = sem.acquire_owned().await.ok();
            let result = with_backoff(&backoff, || {
                let qa = Arc::clone(&qa);
                let context = context.clone();
                async move { qa.answer(&context, question).await }
            })
            .await;

            match result {
                Ok(answer) => {
                    let text = answer.text.trim().to_string();
                    if text.is_empty() || answer.confidence < min_confidence {
                        debug!("QA found no answer for '{}'", question);
                        return Vec::new();
                    }
                    let (index, offset) = locate_answer(&texts, &text);
                    vec![CandidateSpan {
                        text,
                        label,
                        source: SourceModel::Qa,
                        utterance_index: index,
                        offset,
                        confidence: answer.confidence.clamp(0.0, 1.0),
                    }]
                }
                Err(err) => {
                    warn!("QA failed for '{}': {}", question, err);
                    Vec::new()
                }
            }
        });
    }

    let mut spans: Vec<CandidateSpan> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(batch) => spans.extend(batch),
            Err(err) => warn!("extraction task panicked: {}", err),
        }
    }

    // Title-prefixed name fallback needs no collaborator at all.
    spans.extend(scan_title_names(transcript));

    spans.sort_by(|a, b| {
        a.sort_key()
            .cmp(&b.sort_key())
            .then(a.confidence.total_cmp(&b.confidence))
    });
    spans
}

/// Attribute a whole-transcript QA answer to the last utterance whose text
/// contains it, so status-style answers point at the statement that made
/// them true.
fn locate_answer(utterance_texts: &[String], answer: &str) -> (usize, usize) {
    let needle = answer.to_lowercase();
    utterance_texts
        .iter()
        .enumerate()
        .rev()
        .find_map(|(index, text)| text.find(&needle).map(|offset| (index, offset)))
        .unwrap_or((0, 0))
}

const NAME_TITLES: [&str; 3] = ["Mr", "Ms", "Mrs"];

/// Low-confidence fallback when the general NER misses the patient name:
/// a title ("Mr./Ms./Mrs.") followed by a capitalized word.
fn scan_title_names(transcript: &Transcript) -> Vec<CandidateSpan> {
    let mut spans = Vec::new();

    for utterance in &transcript.utterances {
        let words: Vec<&str> = utterance.text.split_whitespace().collect();
        for pair in words.windows(2) {
            let title = pair[0].trim_end_matches('.');
            if !NAME_TITLES.contains(&title) {
                continue;
            }
            let name = pair[1].trim_end_matches([',', '.', '?', '!', ';']);
            if name.chars().next().is_some_and(|c| c.is_uppercase())
                && name.chars().all(|c| c.is_alphabetic())
            {
                spans.push(CandidateSpan {
                    text: format!("{}. {}", title, name),
                    label: SpanLabel::Person,
                    source: SourceModel::GeneralNer,
                    utterance_index: utterance.index,
                    offset: utterance.text.find(pair[0]).unwrap_or(0),
                    confidence: 0.4,
                });
            }
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::ServiceError;
    use crate::llm::{
        GenerativeModel, IntentModel, IntentScore, NerEntity, QaAnswer, QaModel, SentimentModel,
        SentimentScore,
    };
    use crate::models::{Sentiment, Speaker, Utterance};

    struct FixedNer(Vec<(&'static str, &'static str, f64)>);

    #[async_trait]
    impl NerModel for FixedNer {
        async fn extract(&self, text: &str) -> Result<Vec<NerEntity>, ServiceError> {
            Ok(self
                .0
                .iter()
                .filter(|(span, _, _)| text.to_lowercase().contains(&span.to_lowercase()))
                .map(|(span, label, conf)| NerEntity {
                    text: span.to_string(),
                    label: label.to_string(),
                    start: 0,
                    end: span.len(),
                    confidence: *conf,
                })
                .collect())
        }
    }

    struct FixedQa;

    #[async_trait]
    impl QaModel for FixedQa {
        async fn answer(&self, _context: &str, question: &str) -> Result<QaAnswer, ServiceError> {
            if question.contains("still experiencing") {
                Ok(QaAnswer {
                    text: "occasional back pain".into(),
                    confidence: 0.8,
                })
            } else {
                // Low confidence means "no answer found", never an error.
                Ok(QaAnswer {
                    text: String::new(),
                    confidence: 0.01,
                })
            }
        }
    }

    struct FailingNer;

    #[async_trait]
    impl NerModel for FailingNer {
        async fn extract(&self, _text: &str) -> Result<Vec<NerEntity>, ServiceError> {
            Err(ServiceError::Auth("no token".into()))
        }
    }

    struct UnusedSentiment;

    #[async_trait]
    impl SentimentModel for UnusedSentiment {
        async fn classify(&self, _text: &str) -> Result<SentimentScore, ServiceError> {
            Ok(SentimentScore {
                sentiment: Sentiment::Neutral,
                confidence: 1.0,
            })
        }
    }

    struct UnusedIntent;

    #[async_trait]
    impl IntentModel for UnusedIntent {
        async fn classify(
            &self,
            _text: &str,
            labels: &[&str],
        ) -> Result<IntentScore, ServiceError> {
            Ok(IntentScore {
                label: labels.first().unwrap_or(&"").to_string(),
                confidence: 1.0,
            })
        }
    }

    struct UnusedGenerative;

    #[async_trait]
    impl GenerativeModel for UnusedGenerative {
        async fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
            Ok(String::new())
        }
    }

    fn collaborators(medical: Arc<dyn NerModel>, general: Arc<dyn NerModel>) -> Collaborators {
        Collaborators {
            medical_ner: medical,
            general_ner: general,
            qa: Arc::new(FixedQa),
            sentiment: Arc::new(UnusedSentiment),
            intent: Arc::new(UnusedIntent),
            generative: Arc::new(UnusedGenerative),
        }
    }

    fn transcript() -> Transcript {
        Transcript {
            utterances: vec![
                Utterance {
                    speaker: Speaker::Physician,
                    text: "How are you feeling, Ms. Jones?".into(),
                    index: 0,
                },
                Utterance {
                    speaker: Speaker::Patient,
                    text: "My neck hurts, and I still get occasional back pain.".into(),
                    index: 1,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_extract_collects_unmerged_spans() {
        let medical = Arc::new(FixedNer(vec![("neck", "Sign_symptom", 0.9)]));
        let general = Arc::new(FixedNer(vec![("Jones", "PER", 0.85)]));
        let collab = collaborators(medical, general);

        let spans = extract_entities(&transcript(), &collab, &ExtractConfig::default()).await;

        assert!(spans
            .iter()
            .any(|s| s.label == SpanLabel::SignSymptom && s.source == SourceModel::MedicalNer));
        assert!(spans
            .iter()
            .any(|s| s.label == SpanLabel::Person && s.source == SourceModel::GeneralNer));
        // QA status answer attributed to the utterance that contains it
        let status = spans
            .iter()
            .find(|s| s.label == SpanLabel::CurrentStatus)
            .unwrap();
        assert_eq!(status.utterance_index, 1);
        // Low-confidence QA answers were dropped
        assert!(!spans.iter().any(|s| s.label == SpanLabel::Prognosis));
    }

    #[tokio::test]
    async fn test_extract_output_is_sorted() {
        let medical = Arc::new(FixedNer(vec![("neck", "Sign_symptom", 0.9)]));
        let general = Arc::new(FixedNer(vec![("Jones", "PER", 0.85)]));
        let collab = collaborators(medical, general);

        let spans = extract_entities(&transcript(), &collab, &ExtractConfig::default()).await;
        let mut sorted = spans.clone();
        sorted.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let keys: Vec<_> = spans.iter().map(|s| s.sort_key()).collect();
        let sorted_keys: Vec<_> = sorted.iter().map(|s| s.sort_key()).collect();
        assert_eq!(keys, sorted_keys);
    }

    #[tokio::test]
    async fn test_failed_collaborator_degrades_to_no_spans() {
        let collab = collaborators(Arc::new(FailingNer), Arc::new(FailingNer));
        let spans = extract_entities(&transcript(), &collab, &ExtractConfig::default()).await;

        // NER produced nothing, but QA and the title fallback still ran.
        assert!(!spans.iter().any(|s| s.source == SourceModel::MedicalNer));
        assert!(spans.iter().any(|s| s.label == SpanLabel::CurrentStatus));
        assert!(spans.iter().any(|s| s.label == SpanLabel::Person));
    }

    #[test]
    fn test_scan_title_names() {
        let spans = scan_title_names(&transcript());
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Ms. Jones");
        assert_eq!(spans[0].utterance_index, 0);
    }

    #[test]
    fn test_map_ner_label_drops_unknown_groups() {
        assert_eq!(map_ner_label("Sign_symptom"), Some(SpanLabel::SignSymptom));
        assert_eq!(map_ner_label("Lab_value"), None);
        assert_eq!(map_ner_label("LOC"), None);
    }
}
