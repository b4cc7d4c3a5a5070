use std::collections::HashMap;

use crate::error::PipelineError;
use crate::models::MedicalRecord;
use crate::stages::aggregate::normalize_text;

/// The four SOAP section headers, in required order.
pub const SECTION_HEADERS: [&str; 4] = ["Subjective", "Objective", "Assessment", "Plan"];

/// Parsed SOAP sections, prior to grounding validation.
#[derive(Debug, Clone, Default)]
pub struct SoapSections {
    pub subjective: String,
    pub objective: String,
    pub assessment: String,
    pub plan: String,
}

impl SoapSections {
    pub fn full_text(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            self.subjective, self.objective, self.assessment, self.plan
        )
    }
}

/// Recognize a section header line; returns the header index and any inline
/// content after the colon. Tolerates markdown decoration ("## Subjective:",
/// "**Plan**:") since generative models drift despite instructions.
fn match_header(line: &str) -> Option<(usize, &str)> {
    let stripped = line
        .trim()
        .trim_start_matches(['#', '*', '-', ' '])
        .trim_end();

    for (idx, header) in SECTION_HEADERS.iter().enumerate() {
        let matches = stripped
            .get(..header.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(header));
        if matches {
            let rest = stripped[header.len()..].trim_start_matches('*');
            let rest = rest.trim_start();
            // Require a colon or nothing after the header word, so e.g.
            // "Subjectively speaking" is not a header.
            if rest.is_empty() {
                return Some((idx, ""));
            }
            if let Some(content) = rest.strip_prefix(':') {
                return Some((idx, content.trim()));
            }
        }
    }
    None
}

/// Split generated text into the four SOAP sections.
///
/// All four headers must be present and in order; anything else is a
/// `SoapFormat` error for the synthesizer's retry path to handle.
pub fn parse_sections(text: &str) -> Result<SoapSections, PipelineError> {
    let mut bodies: [Vec<&str>; 4] = Default::default();
    let mut seen = 0usize;
    let mut current: Option<usize> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            continue;
        }

        if let Some((idx, inline)) = match_header(trimmed) {
            if idx != seen {
                return Err(PipelineError::SoapFormat(format!(
                    "section '{}' out of order (expected '{}')",
                    SECTION_HEADERS[idx],
                    SECTION_HEADERS.get(seen).copied().unwrap_or("nothing")
                )));
            }
            seen += 1;
            current = Some(idx);
            if !inline.is_empty() {
                bodies[idx].push(inline);
            }
        } else if let Some(idx) = current {
            if !trimmed.is_empty() {
                bodies[idx].push(trimmed);
            }
        }
        // Text before the first header is ignored rather than fatal.
    }

    if seen < 4 {
        return Err(PipelineError::SoapFormat(format!(
            "missing section header '{}'",
            SECTION_HEADERS[seen]
        )));
    }

    let mut joined = bodies.iter().map(|b| b.join("\n"));
    Ok(SoapSections {
        subjective: joined.next().unwrap_or_default(),
        objective: joined.next().unwrap_or_default(),
        assessment: joined.next().unwrap_or_default(),
        plan: joined.next().unwrap_or_default(),
    })
}

/// Grounding check: every record fact must appear in the note after the same
/// normalization the aggregator uses. A fact also counts as present when a
/// synonym of it appears (the note may say "physical therapy" for a record
/// value of "Physiotherapy").
pub fn missing_facts(
    record: &MedicalRecord,
    note_text: &str,
    synonyms: &HashMap<String, String>,
) -> Vec<String> {
    let empty = HashMap::new();
    let note_norm = normalize_text(note_text, &empty);

    record
        .grounding_facts()
        .into_iter()
        .filter(|fact| {
            let fact_norm = normalize_text(fact, synonyms);
            if note_norm.contains(fact_norm.as_str()) {
                return false;
            }
            // Check synonym keys that canonicalize to this fact.
            !synonyms
                .iter()
                .any(|(k, v)| *v == fact_norm && note_norm.contains(k.as_str()))
        })
        .collect()
}
