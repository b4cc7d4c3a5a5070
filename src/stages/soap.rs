use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::llm::{
    build_correction_prompt, build_soap_prompt, missing_facts, parse_sections, with_backoff,
    BackoffConfig, GenerativeModel, SoapSections,
};
use crate::models::{MedicalRecord, SoapConsistencyWarning, SoapNote, SoapState, Transcript};
use crate::stages::aggregate::AggregatorConfig;

#[derive(Debug, Clone, Default)]
pub struct SoapConfig {
    /// Backoff for transient generative failures, separate from the single
    /// content-correction retry.
    pub backoff: BackoffConfig,
}

/// Generate a SOAP note grounded in the medical record.
///
/// The note is always returned when generation succeeds, even if grounding
/// validation fails; `grounded` and `ungrounded_facts` let callers decide
/// how to surface the discrepancy. Content correction is bounded to one
/// retry, and an unparsable draft gets one format retry before
/// `SoapFormat` is surfaced.
pub async fn synthesize_soap(
    transcript: &Transcript,
    record: &MedicalRecord,
    generative: &dyn GenerativeModel,
    aggregator: &AggregatorConfig,
    config: &SoapConfig,
) -> Result<(SoapNote, Option<SoapConsistencyWarning>), PipelineError> {
    let base_prompt = build_soap_prompt(transcript, record);

    let draft = with_backoff(&config.backoff, || generative.generate(&base_prompt)).await?;
    let mut state = SoapState::Drafted;
    debug!(?state, "generative collaborator produced a draft");

    let mut sections = match parse_sections(&draft) {
        Ok(sections) => sections,
        Err(err) => {
            warn!("draft did not parse ({}), retrying with format reminder", err);
            let reminder = format!(
                "{}\n\nYour previous answer was rejected: {}. Output exactly four sections \
                 headed Subjective: Objective: Assessment: Plan: in that order.",
                base_prompt, err
            );
            let retry = with_backoff(&config.backoff, || generative.generate(&reminder)).await?;
            parse_sections(&retry)?
        }
    };

    let mut missing = missing_facts(record, &sections.full_text(), &aggregator.synonyms);

    if missing.is_empty() {
        state = SoapState::Validated;
        debug!(?state, "draft contains every record fact");
    } else {
        state = SoapState::Corrected;
        info!(
            ?state,
            "draft is missing {} fact(s), retrying with correction: {:?}",
            missing.len(),
            missing
        );
        let correction = build_correction_prompt(&base_prompt, &missing);
        match regenerate(generative, &correction, config).await {
            Some(corrected) => {
                let corrected_missing =
                    missing_facts(record, &corrected.full_text(), &aggregator.synonyms);
                sections = corrected;
                missing = corrected_missing;
            }
            // Keep the first draft; degrade rather than fail the pipeline.
            None => warn!("correction attempt failed, keeping original draft"),
        }
    }

    state = SoapState::Final;
    let grounded = missing.is_empty();
    debug!(?state, grounded, "SOAP synthesis finished");

    let note = SoapNote {
        subjective: sections.subjective,
        objective: sections.objective,
        assessment: sections.assessment,
        plan: sections.plan,
        grounded,
        ungrounded_facts: missing.clone(),
    };
    let warning = (!grounded).then(|| SoapConsistencyWarning {
        missing_facts: missing,
    });

    Ok((note, warning))
}

/// One correction attempt; transient failures and format errors here only
/// forfeit the correction, never the note.
async fn regenerate(
    generative: &dyn GenerativeModel,
    prompt: &str,
    config: &SoapConfig,
) -> Option<SoapSections> {
    match with_backoff(&config.backoff, || generative.generate(prompt)).await {
        Ok(text) => match parse_sections(&text) {
            Ok(sections) => Some(sections),
            Err(err) => {
                warn!("corrected draft did not parse: {}", err);
                None
            }
        },
        Err(err) => {
            warn!("corrected generation failed: {}", err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::ServiceError;
    use crate::models::{Speaker, Utterance};

    /// Returns each scripted response in turn, then repeats the last.
    struct ScriptedGenerative {
        responses: Vec<String>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerative {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: responses.into_iter().map(String::from).collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedGenerative {
        async fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let idx = n.min(self.responses.len() - 1);
            Ok(self.responses[idx].clone())
        }
    }

    struct FailingGenerative;

    #[async_trait]
    impl GenerativeModel for FailingGenerative {
        async fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
            Err(ServiceError::Auth("no key".into()))
        }
    }

    fn transcript() -> Transcript {
        Transcript {
            utterances: vec![Utterance {
                speaker: Speaker::Patient,
                text: "My neck and back hurt.".into(),
                index: 0,
            }],
        }
    }

    fn record() -> MedicalRecord {
        let mut record = MedicalRecord::unknown();
        record.symptoms = vec!["Neck pain".into(), "Back pain".into()];
        record.treatment = vec!["Physiotherapy".into()];
        record
    }

    const GROUNDED_NOTE: &str = "Subjective: Patient reports neck pain and back pain.\nObjective: Mild tenderness.\nAssessment: Musculoskeletal strain.\nPlan: Continue physiotherapy.";
    const PARTIAL_NOTE: &str = "Subjective: Patient reports neck pain.\nObjective: Mild tenderness.\nAssessment: Strain.\nPlan: Rest.";

    #[tokio::test]
    async fn test_grounded_first_draft_needs_one_call() {
        let generative = ScriptedGenerative::new(vec![GROUNDED_NOTE]);
        let (note, warning) = synthesize_soap(
            &transcript(),
            &record(),
            &generative,
            &AggregatorConfig::default(),
            &SoapConfig::default(),
        )
        .await
        .unwrap();

        assert!(note.grounded);
        assert!(note.ungrounded_facts.is_empty());
        assert!(warning.is_none());
        assert_eq!(generative.call_count(), 1);
    }

    #[tokio::test]
    async fn test_single_correction_retry_fixes_grounding() {
        let generative = ScriptedGenerative::new(vec![PARTIAL_NOTE, GROUNDED_NOTE]);
        let (note, warning) = synthesize_soap(
            &transcript(),
            &record(),
            &generative,
            &AggregatorConfig::default(),
            &SoapConfig::default(),
        )
        .await
        .unwrap();

        assert!(note.grounded);
        assert!(warning.is_none());
        assert_eq!(generative.call_count(), 2);
    }

    #[tokio::test]
    async fn test_persistent_gap_degrades_with_warning() {
        // The correction retry also omits the facts; bounded to one retry.
        let generative = ScriptedGenerative::new(vec![PARTIAL_NOTE, PARTIAL_NOTE]);
        let (note, warning) = synthesize_soap(
            &transcript(),
            &record(),
            &generative,
            &AggregatorConfig::default(),
            &SoapConfig::default(),
        )
        .await
        .unwrap();

        assert!(!note.grounded);
        assert_eq!(
            note.ungrounded_facts,
            vec!["Back pain".to_string(), "Physiotherapy".to_string()]
        );
        assert_eq!(
            warning.unwrap().missing_facts,
            vec!["Back pain".to_string(), "Physiotherapy".to_string()]
        );
        assert_eq!(generative.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unparsable_after_format_retry_is_fatal() {
        let generative = ScriptedGenerative::new(vec!["no sections here", "still no sections"]);
        let result = synthesize_soap(
            &transcript(),
            &record(),
            &generative,
            &AggregatorConfig::default(),
            &SoapConfig::default(),
        )
        .await;

        assert!(matches!(result, Err(PipelineError::SoapFormat(_))));
        assert_eq!(generative.call_count(), 2);
    }

    #[tokio::test]
    async fn test_format_retry_recovers() {
        let generative = ScriptedGenerative::new(vec!["garbage preamble only", GROUNDED_NOTE]);
        let (note, _) = synthesize_soap(
            &transcript(),
            &record(),
            &generative,
            &AggregatorConfig::default(),
            &SoapConfig::default(),
        )
        .await
        .unwrap();

        assert!(note.grounded);
        assert_eq!(generative.call_count(), 2);
    }

    #[tokio::test]
    async fn test_generative_failure_surfaces_service_error() {
        let result = synthesize_soap(
            &transcript(),
            &record(),
            &FailingGenerative,
            &AggregatorConfig::default(),
            &SoapConfig::default(),
        )
        .await;

        assert!(matches!(result, Err(PipelineError::Service(_))));
    }
}
