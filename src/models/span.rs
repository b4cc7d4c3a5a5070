use serde::{Deserialize, Serialize};

/// Closed label set emitted by the collaborator models.
///
/// The NER labels follow the biomedical/general tagger label groups; the QA
/// labels name the clinical question that produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanLabel {
    SignSymptom,
    Medication,
    TherapeuticProcedure,
    DiagnosticProcedure,
    Person,
    Diagnosis,
    CurrentStatus,
    Prognosis,
}

/// Which collaborator produced an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceModel {
    MedicalNer,
    GeneralNer,
    Qa,
}

/// One named slot in the structured medical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalField {
    PatientName,
    Symptoms,
    Diagnosis,
    Treatment,
    CurrentStatus,
    Prognosis,
}

impl CanonicalField {
    /// Set-valued fields accept every candidate above threshold; the rest
    /// resolve to a single winner.
    pub fn is_set_valued(&self) -> bool {
        matches!(self, CanonicalField::Symptoms | CanonicalField::Treatment)
    }

    pub const ALL: [CanonicalField; 6] = [
        CanonicalField::PatientName,
        CanonicalField::Symptoms,
        CanonicalField::Diagnosis,
        CanonicalField::Treatment,
        CanonicalField::CurrentStatus,
        CanonicalField::Prognosis,
    ];
}

impl SpanLabel {
    /// Static label-to-field mapping used by the aggregator.
    pub fn field(&self) -> CanonicalField {
        match self {
            SpanLabel::SignSymptom => CanonicalField::Symptoms,
            SpanLabel::Medication
            | SpanLabel::TherapeuticProcedure
            | SpanLabel::DiagnosticProcedure => CanonicalField::Treatment,
            SpanLabel::Person => CanonicalField::PatientName,
            SpanLabel::Diagnosis => CanonicalField::Diagnosis,
            SpanLabel::CurrentStatus => CanonicalField::CurrentStatus,
            SpanLabel::Prognosis => CanonicalField::Prognosis,
        }
    }
}

/// One raw model observation, before any merging.
///
/// Many spans may refer to the same real-world fact; reconciling them is the
/// aggregator's job, never the extractor's.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpan {
    pub text: String,
    pub label: SpanLabel,
    pub source: SourceModel,
    pub utterance_index: usize,
    /// Character offset within the utterance, so facts mentioned in the same
    /// utterance keep their spoken order (0 when the source has no offsets).
    pub offset: usize,
    /// Confidence in [0, 1] as reported by the collaborator.
    pub confidence: f64,
}

impl CandidateSpan {
    /// Position of this observation in the transcript.
    pub fn position(&self) -> (usize, usize) {
        (self.utterance_index, self.offset)
    }

    /// Deterministic ordering key so extractor output never depends on
    /// collaborator call completion order.
    pub fn sort_key(&self) -> (usize, usize, SourceModel, SpanLabel, &str) {
        (
            self.utterance_index,
            self.offset,
            self.source,
            self.label,
            &self.text,
        )
    }
}
