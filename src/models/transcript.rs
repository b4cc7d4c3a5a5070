use serde::{Deserialize, Serialize};

/// Who is speaking in a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Speaker {
    Physician,
    Patient,
    /// Fallback for unrecognized speaker prefixes; kept rather than dropped
    /// so the pipeline tolerates malformed transcripts.
    Unknown,
}

impl Speaker {
    /// Map a speaker prefix (the text before the colon) to a speaker.
    ///
    /// "Doctor" and "Dr" are accepted as physician aliases. Anything else
    /// that looks like a speaker tag falls back to `Unknown`.
    pub fn from_prefix(prefix: &str) -> Speaker {
        let p = prefix.trim().trim_end_matches('.').to_lowercase();
        match p.as_str() {
            "physician" | "doctor" | "dr" => Speaker::Physician,
            "patient" => Speaker::Patient,
            _ => Speaker::Unknown,
        }
    }

    pub fn display(&self) -> &'static str {
        match self {
            Speaker::Physician => "Physician",
            Speaker::Patient => "Patient",
            Speaker::Unknown => "Unknown",
        }
    }
}

/// One speaker-attributed line of the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker: Speaker,
    /// The spoken text - immutable, never changed by the pipeline
    pub text: String,
    /// Position in the transcript (0-based)
    pub index: usize,
}

/// Ordered sequence of utterances. Immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub utterances: Vec<Utterance>,
}

impl Transcript {
    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Utterance> {
        self.utterances.get(index)
    }

    /// Iterate over patient utterances only (the sentiment branch never
    /// classifies physician speech).
    pub fn patient_utterances(&self) -> impl Iterator<Item = &Utterance> {
        self.utterances
            .iter()
            .filter(|u| u.speaker == Speaker::Patient)
    }

    /// Render the transcript back to speaker-prefixed text, used as the QA
    /// context and as the grounding prompt body.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for u in &self.utterances {
            out.push_str(u.speaker.display());
            out.push_str(": ");
            out.push_str(&u.text);
            out.push('\n');
        }
        out
    }
}
