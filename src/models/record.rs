use serde::{Deserialize, Serialize};

/// Sentinel for single-valued fields no candidate cleared the threshold for.
pub const UNKNOWN: &str = "Unknown";

/// The canonical structured medical record for one transcript.
///
/// Single source of truth for downstream consumers; every value traces back
/// to at least one candidate span above its field's acceptance threshold, or
/// is the `Unknown` sentinel. Field names in the serialized form are stable
/// and match the published artifact schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalRecord {
    #[serde(rename = "Patient_Name")]
    pub patient_name: String,
    /// First-appearance order, not confidence order.
    #[serde(rename = "Symptoms")]
    pub symptoms: Vec<String>,
    #[serde(rename = "Diagnosis")]
    pub diagnosis: String,
    #[serde(rename = "Treatment")]
    pub treatment: Vec<String>,
    #[serde(rename = "Current_Status")]
    pub current_status: String,
    #[serde(rename = "Prognosis")]
    pub prognosis: String,
}

impl MedicalRecord {
    /// A record with every field degraded to its unknown/empty form.
    pub fn unknown() -> Self {
        Self {
            patient_name: UNKNOWN.to_string(),
            symptoms: Vec::new(),
            diagnosis: UNKNOWN.to_string(),
            treatment: Vec::new(),
            current_status: UNKNOWN.to_string(),
            prognosis: UNKNOWN.to_string(),
        }
    }

    /// The facts a generated SOAP note must contain to count as grounded:
    /// every symptom, every treatment, and the diagnosis when known.
    pub fn grounding_facts(&self) -> Vec<String> {
        let mut facts: Vec<String> = Vec::new();
        facts.extend(self.symptoms.iter().cloned());
        facts.extend(self.treatment.iter().cloned());
        if self.diagnosis != UNKNOWN {
            facts.push(self.diagnosis.clone());
        }
        facts
    }
}
