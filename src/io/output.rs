use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::MedicalRecord;
use crate::pipeline::PipelineOutput;

/// The published summary artifact: the medical record plus an extraction
/// timestamp. The timestamp is stamped at write time so record construction
/// itself stays deterministic.
#[derive(Debug, Serialize)]
pub struct SummaryDocument<'a> {
    #[serde(flatten)]
    pub record: &'a MedicalRecord,
    #[serde(rename = "Extracted_On")]
    pub extracted_on: DateTime<Utc>,
}

impl<'a> SummaryDocument<'a> {
    pub fn new(record: &'a MedicalRecord) -> Self {
        Self {
            record,
            extracted_on: Utc::now(),
        }
    }
}

/// Paths of the files a run produced.
#[derive(Debug, Clone)]
pub struct WrittenPaths {
    pub summary: PathBuf,
    pub sentiment: PathBuf,
    pub soap: Option<PathBuf>,
}

/// Write the three output artifacts (summary, sentiment profile, SOAP note)
/// into a directory. The SOAP file is only written when synthesis produced
/// a note.
pub fn write_outputs(dir: &Path, output: &PipelineOutput) -> Result<WrittenPaths> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {:?}", dir))?;

    let summary = dir.join("summary.json");
    write_json(&summary, &SummaryDocument::new(&output.record))?;

    let sentiment = dir.join("sentiment.json");
    write_json(&sentiment, &output.profile)?;

    let soap = match &output.soap {
        Some(note) => {
            let path = dir.join("soap_note.json");
            write_json(&path, note)?;
            Some(path)
        }
        None => None,
    };

    Ok(WrittenPaths {
        summary,
        sentiment,
        soap,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create file: {:?}", path))?;
    serde_json::to_writer_pretty(file, value)
        .with_context(|| format!("Failed to write JSON: {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SentimentIntentProfile, SoapNote};

    fn sample_output(with_soap: bool) -> PipelineOutput {
        let mut record = MedicalRecord::unknown();
        record.symptoms = vec!["Neck pain".into()];
        PipelineOutput {
            record,
            profile: SentimentIntentProfile::empty(),
            soap: with_soap.then(|| SoapNote {
                subjective: "s".into(),
                objective: "o".into(),
                assessment: "a".into(),
                plan: "p".into(),
                grounded: true,
                ungrounded_facts: vec![],
            }),
            warnings: vec![],
        }
    }

    #[test]
    fn test_write_outputs_with_soap() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_outputs(dir.path(), &sample_output(true)).unwrap();

        let summary = std::fs::read_to_string(&paths.summary).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&summary).unwrap();
        assert_eq!(parsed["Symptoms"][0], "Neck pain");
        assert!(parsed["Extracted_On"].is_string());

        assert!(paths.sentiment.exists());
        assert!(paths.soap.as_ref().unwrap().exists());
    }

    #[test]
    fn test_write_outputs_without_soap() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_outputs(dir.path(), &sample_output(false)).unwrap();
        assert!(paths.soap.is_none());
        assert!(!dir.path().join("soap_note.json").exists());
    }
}
