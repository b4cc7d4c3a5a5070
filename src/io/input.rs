use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::error::PipelineError;
use crate::models::{Speaker, Transcript, Utterance};

/// Parse a speaker-prefixed transcript file into a Transcript
pub fn parse_transcript_file(path: &Path) -> Result<Transcript> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    Ok(parse_transcript_text(&content)?)
}

/// Parse raw transcript text into an ordered sequence of utterances.
///
/// Lines look like `"Physician: ..."` or `"Patient: ..."`. Unrecognized
/// speaker prefixes become `Speaker::Unknown` rather than failing, and a
/// line with no prefix continues the previous utterance (wrapped dialogue).
/// Only a transcript with no attributable lines at all is a `Parse` error.
pub fn parse_transcript_text(text: &str) -> Result<Transcript, PipelineError> {
    let mut utterances: Vec<Utterance> = Vec::new();
    let mut orphan_lines = 0usize;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        match split_speaker_line(line) {
            Some((speaker, spoken)) => {
                if spoken.is_empty() {
                    continue;
                }
                utterances.push(Utterance {
                    speaker,
                    text: spoken.to_string(),
                    index: utterances.len(),
                });
            }
            None => match utterances.last_mut() {
                Some(previous) => {
                    previous.text.push(' ');
                    previous.text.push_str(line);
                }
                None => orphan_lines += 1,
            },
        }
    }

    if utterances.is_empty() {
        return Err(PipelineError::Parse(
            "no speaker-attributed lines found".to_string(),
        ));
    }
    if orphan_lines > 0 {
        warn!(
            "ignored {} line(s) before the first speaker prefix",
            orphan_lines
        );
    }

    Ok(Transcript { utterances })
}

/// Split a line into its speaker prefix and spoken text, when the text
/// before the first colon plausibly names a speaker (a few alphabetic
/// words). Timestamps and clock times never qualify.
fn split_speaker_line(line: &str) -> Option<(Speaker, &str)> {
    let (prefix, rest) = line.split_once(':')?;
    let prefix = prefix.trim();
    if prefix.is_empty() || prefix.split_whitespace().count() > 3 {
        return None;
    }
    if !prefix
        .chars()
        .all(|c| c.is_alphabetic() || c == '.' || c == ' ')
    {
        return None;
    }
    Some((Speaker::from_prefix(prefix), rest.trim()))
}
