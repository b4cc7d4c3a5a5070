use std::time::Duration;

use tracing::{info, warn};

use crate::error::PipelineError;
use crate::io::parse_transcript_text;
use crate::llm::Collaborators;
use crate::models::{MedicalRecord, SentimentIntentProfile, SoapNote};
use crate::stages::{
    aggregate, classify_sentiment, extract_entities, synthesize_soap, AggregatorConfig,
    ExtractConfig, SentimentConfig, SoapConfig,
};

/// Configuration for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub aggregator: AggregatorConfig,
    pub extract: ExtractConfig,
    pub sentiment: SentimentConfig,
    pub soap: SoapConfig,
    /// Skip SOAP synthesis entirely (no generative collaborator calls).
    pub skip_soap: bool,
    /// Overall deadline; `Timeout` aborts pending collaborator calls.
    pub timeout: Option<Duration>,
}

/// The durable outputs of one run. `soap` is `None` when synthesis was
/// skipped or failed; the structured outputs are returned regardless.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub record: MedicalRecord,
    pub profile: SentimentIntentProfile,
    pub soap: Option<SoapNote>,
    /// Human-readable degradation notices (consistency warnings, SOAP
    /// failures) accumulated without aborting the run.
    pub warnings: Vec<String>,
}

/// Run the full pipeline over raw transcript text.
///
/// Stage order: parse, then entity extraction and sentiment classification
/// concurrently (both only read the transcript), then aggregation, then
/// SOAP synthesis. Lower-stage failures never abort later stages that do
/// not depend on the failed field.
pub async fn run_pipeline(
    transcript_text: &str,
    collab: &Collaborators,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    match config.timeout {
        Some(limit) => tokio::time::timeout(limit, run_stages(transcript_text, collab, config))
            .await
            .map_err(|_| PipelineError::Timeout(limit))?,
        None => run_stages(transcript_text, collab, config).await,
    }
}

async fn run_stages(
    transcript_text: &str,
    collab: &Collaborators,
    config: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    let transcript = parse_transcript_text(transcript_text)?;
    info!("parsed {} utterances", transcript.len());

    // Independent branches over the same immutable transcript.
    let (spans, profile) = tokio::join!(
        extract_entities(&transcript, collab, &config.extract),
        classify_sentiment(&transcript, collab, &config.sentiment),
    );
    info!(
        "collected {} candidate spans, {} classified utterances",
        spans.len(),
        profile.utterances.len()
    );

    let record = aggregate(&spans, &config.aggregator);

    let mut warnings = Vec::new();
    let soap = if config.skip_soap {
        None
    } else {
        match synthesize_soap(
            &transcript,
            &record,
            collab.generative.as_ref(),
            &config.aggregator,
            &config.soap,
        )
        .await
        {
            Ok((note, warning)) => {
                if let Some(w) = warning {
                    warnings.push(w.to_string());
                }
                Some(note)
            }
            // Structured outputs are still worth returning.
            Err(err) => {
                warn!("SOAP synthesis failed: {}", err);
                warnings.push(format!("SOAP synthesis failed: {}", err));
                None
            }
        }
    };

    Ok(PipelineOutput {
        record,
        profile,
        soap,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::error::ServiceError;
    use crate::llm::{
        GenerativeModel, IntentModel, IntentScore, NerEntity, NerModel, QaAnswer, QaModel,
        SentimentModel, SentimentScore,
    };
    use crate::models::Sentiment;

    /// NER stub emitting the example case's symptom and treatment spans.
    struct StubMedicalNer;

    #[async_trait]
    impl NerModel for StubMedicalNer {
        async fn extract(&self, text: &str) -> Result<Vec<NerEntity>, ServiceError> {
            let lowered = text.to_lowercase();
            let mut entities = Vec::new();
            let mut emit = |trigger: &str, span: &str, label: &str, confidence: f64| {
                if let Some(start) = lowered.find(trigger) {
                    entities.push(NerEntity {
                        text: span.to_string(),
                        label: label.to_string(),
                        start,
                        end: start + span.len(),
                        confidence,
                    });
                }
            };
            emit("neck", "neck pain", "Sign_symptom", 0.92);
            emit("back", "back pain", "Sign_symptom", 0.88);
            emit("physiotherapy", "physiotherapy", "Therapeutic_procedure", 0.9);
            Ok(entities)
        }
    }

    struct StubGeneralNer;

    #[async_trait]
    impl NerModel for StubGeneralNer {
        async fn extract(&self, _text: &str) -> Result<Vec<NerEntity>, ServiceError> {
            Ok(Vec::new())
        }
    }

    struct StubQa;

    #[async_trait]
    impl QaModel for StubQa {
        async fn answer(&self, _context: &str, question: &str) -> Result<QaAnswer, ServiceError> {
            if question.contains("still experiencing") {
                Ok(QaAnswer {
                    text: "occasional back pain".into(),
                    confidence: 0.75,
                })
            } else {
                Ok(QaAnswer {
                    text: String::new(),
                    confidence: 0.02,
                })
            }
        }
    }

    struct StubSentiment;

    #[async_trait]
    impl SentimentModel for StubSentiment {
        async fn classify(&self, _text: &str) -> Result<SentimentScore, ServiceError> {
            Ok(SentimentScore {
                sentiment: Sentiment::Neutral,
                confidence: 0.8,
            })
        }
    }

    struct StubIntent;

    #[async_trait]
    impl IntentModel for StubIntent {
        async fn classify(&self, _text: &str, _labels: &[&str]) -> Result<IntentScore, ServiceError> {
            Ok(IntentScore {
                label: "Reporting symptoms".into(),
                confidence: 0.7,
            })
        }
    }

    struct StubGenerative {
        note: String,
    }

    #[async_trait]
    impl GenerativeModel for StubGenerative {
        async fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
            Ok(self.note.clone())
        }
    }

    struct SlowNer;

    #[async_trait]
    impl NerModel for SlowNer {
        async fn extract(&self, _text: &str) -> Result<Vec<NerEntity>, ServiceError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Vec::new())
        }
    }

    const EXAMPLE_TRANSCRIPT: &str = "Physician: How are you feeling today?\nPatient: I had a car accident. My neck and back hurt for four weeks.\nPhysician: Did you receive treatment?\nPatient: Yes, I had ten physiotherapy sessions and now I only have occasional back pain.";

    fn stub_collaborators(note: &str) -> Collaborators {
        Collaborators {
            medical_ner: Arc::new(StubMedicalNer),
            general_ner: Arc::new(StubGeneralNer),
            qa: Arc::new(StubQa),
            sentiment: Arc::new(StubSentiment),
            intent: Arc::new(StubIntent),
            generative: Arc::new(StubGenerative {
                note: note.to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_example_transcript() {
        let note = "Subjective: Neck pain and back pain after a car accident.\nObjective: Ten physiotherapy sessions completed.\nAssessment: Improving; occasional back pain remains.\nPlan: Continue physiotherapy as needed.";
        let output = run_pipeline(
            EXAMPLE_TRANSCRIPT,
            &stub_collaborators(note),
            &PipelineConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(output.record.symptoms, vec!["Neck pain", "Back pain"]);
        assert_eq!(output.record.treatment, vec!["Physiotherapy"]);
        assert_eq!(output.record.current_status, "Occasional back pain");

        let soap = output.soap.unwrap();
        assert!(soap.grounded);
        assert!(output.warnings.is_empty());

        // Both patient utterances classified, physician ones skipped.
        assert_eq!(output.profile.utterances.len(), 2);
        assert_eq!(output.profile.dominant_intent, "Reporting symptoms");
    }

    #[tokio::test]
    async fn test_ungrounded_note_degrades_with_warning() {
        // The stub note never mentions physiotherapy, on first try or retry.
        let note = "Subjective: Neck pain and back pain.\nObjective: None.\nAssessment: Strain.\nPlan: Rest.";
        let output = run_pipeline(
            EXAMPLE_TRANSCRIPT,
            &stub_collaborators(note),
            &PipelineConfig::default(),
        )
        .await
        .unwrap();

        let soap = output.soap.unwrap();
        assert!(!soap.grounded);
        assert_eq!(soap.ungrounded_facts, vec!["Physiotherapy".to_string()]);
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].contains("Physiotherapy"));
    }

    #[tokio::test]
    async fn test_skip_soap_returns_structured_outputs_only() {
        let config = PipelineConfig {
            skip_soap: true,
            ..Default::default()
        };
        let output = run_pipeline(EXAMPLE_TRANSCRIPT, &stub_collaborators(""), &config)
            .await
            .unwrap();

        assert!(output.soap.is_none());
        assert!(output.warnings.is_empty());
        assert_eq!(output.record.treatment, vec!["Physiotherapy"]);
    }

    #[tokio::test]
    async fn test_empty_transcript_is_fatal() {
        let result = run_pipeline(
            "no speaker prefixes anywhere",
            &stub_collaborators(""),
            &PipelineConfig::default(),
        )
        .await;
        assert!(matches!(result, Err(PipelineError::Parse(_))));
    }

    #[tokio::test]
    async fn test_timeout_surfaces() {
        let mut collab = stub_collaborators("");
        collab.medical_ner = Arc::new(SlowNer);
        collab.general_ner = Arc::new(SlowNer);

        let config = PipelineConfig {
            skip_soap: true,
            timeout: Some(Duration::from_millis(10)),
            ..Default::default()
        };
        let result = run_pipeline(EXAMPLE_TRANSCRIPT, &collab, &config).await;
        assert!(matches!(result, Err(PipelineError::Timeout(_))));
    }
}
