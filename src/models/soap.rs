use serde::{Deserialize, Serialize};

/// Four-section SOAP note, generated last and validated against the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoapNote {
    #[serde(rename = "Subjective")]
    pub subjective: String,
    #[serde(rename = "Objective")]
    pub objective: String,
    #[serde(rename = "Assessment")]
    pub assessment: String,
    #[serde(rename = "Plan")]
    pub plan: String,
    /// Whether every record fact appears in the note after normalization.
    pub grounded: bool,
    /// Record facts missing from the note, empty when `grounded` is true.
    pub ungrounded_facts: Vec<String>,
}

impl SoapNote {
    /// All section text concatenated, used for grounding checks.
    pub fn full_text(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            self.subjective, self.objective, self.assessment, self.plan
        )
    }
}

/// Synthesis state machine. The correction path is bounded recursion, not an
/// open-ended loop: at most one content retry before the note is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoapState {
    /// The generative collaborator produced a draft.
    Drafted,
    /// The draft parsed into four sections and passed the grounding check.
    Validated,
    /// The draft was regenerated once with the missing facts listed.
    Corrected,
    /// Terminal; the note is returned as-is, grounded or not.
    Final,
}

/// Non-fatal: the note is still returned, callers decide how to surface it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoapConsistencyWarning {
    pub missing_facts: Vec<String>,
}

impl std::fmt::Display for SoapConsistencyWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SOAP note is missing record facts: {}",
            self.missing_facts.join(", ")
        )
    }
}
