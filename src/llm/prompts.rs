use crate::models::{MedicalRecord, Transcript, UNKNOWN};

/// Non-negotiable format instructions for the note-writing model.
pub const SOAP_INSTRUCTIONS: &str = r#"You are writing a clinical SOAP note from a physician-patient conversation. You MUST follow these rules:

1. Produce exactly four sections, in this order, each starting on its own line with these headers: Subjective: Objective: Assessment: Plan:
2. Do not add any other sections, preamble, or closing remarks.
3. Every fact listed under GROUNDING FACTS must appear somewhere in the note, using the same wording.
4. Do not invent symptoms, treatments, or diagnoses that are not in the transcript or the grounding facts.
5. Plain text only. No markdown code fences."#;

/// Build the grounding prompt: instructions, the structured facts the note
/// must contain, and the full transcript.
pub fn build_soap_prompt(transcript: &Transcript, record: &MedicalRecord) -> String {
    let mut prompt = String::new();

    prompt.push_str(SOAP_INSTRUCTIONS);
    prompt.push_str("\n\n## GROUNDING FACTS\n");

    if record.patient_name != UNKNOWN {
        prompt.push_str(&format!("- Patient name: {}\n", record.patient_name));
    }
    if !record.symptoms.is_empty() {
        prompt.push_str(&format!("- Symptoms: {}\n", record.symptoms.join(", ")));
    }
    if record.diagnosis != UNKNOWN {
        prompt.push_str(&format!("- Diagnosis: {}\n", record.diagnosis));
    }
    if !record.treatment.is_empty() {
        prompt.push_str(&format!("- Treatment: {}\n", record.treatment.join(", ")));
    }
    if record.current_status != UNKNOWN {
        prompt.push_str(&format!("- Current status: {}\n", record.current_status));
    }
    if record.prognosis != UNKNOWN {
        prompt.push_str(&format!("- Prognosis: {}\n", record.prognosis));
    }

    prompt.push_str("\n## TRANSCRIPT\n");
    prompt.push_str(&transcript.render());
    prompt.push_str("\nWrite the SOAP note now.\n");

    prompt
}

/// Amend the prompt for the single retry-with-correction pass, listing the
/// facts the previous draft left out.
pub fn build_correction_prompt(base_prompt: &str, missing: &[String]) -> String {
    let mut prompt = String::new();

    prompt.push_str(base_prompt);
    prompt.push_str("\n## CORRECTION\n");
    prompt.push_str("Your previous note omitted these required facts. ");
    prompt.push_str("Rewrite the full note and include each of them verbatim:\n");
    for fact in missing {
        prompt.push_str(&format!("- {}\n", fact));
    }

    prompt
}
