use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{CandidateSpan, CanonicalField, MedicalRecord, SourceModel, UNKNOWN};

/// Aggregation policy: thresholds, agreement bonus, and the synonym table.
///
/// These are configuration data supplied alongside the pipeline, not
/// hard-coded constants; `from_file` loads a JSON override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Acceptance threshold for fields without an override.
    pub default_threshold: f64,
    /// Per-field threshold overrides.
    pub field_thresholds: HashMap<CanonicalField, f64>,
    /// Added to the best confidence when two or more models agree on the
    /// same normalized fact; the result is capped at 1.0.
    pub agreement_bonus: f64,
    /// Normalized text -> canonical lexical form.
    pub synonyms: HashMap<String, String>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.5,
            field_thresholds: HashMap::new(),
            agreement_bonus: 0.1,
            synonyms: default_synonyms(),
        }
    }
}

impl AggregatorConfig {
    pub fn threshold(&self, field: CanonicalField) -> f64 {
        self.field_thresholds
            .get(&field)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    /// Load a config from a JSON file; absent keys keep their defaults.
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        serde_json::from_str(&content).context("Failed to parse aggregator config")
    }
}

/// Small built-in synonym table; real deployments extend it via config.
pub fn default_synonyms() -> HashMap<String, String> {
    [
        ("backache", "back pain"),
        ("back ache", "back pain"),
        ("neckache", "neck pain"),
        ("neck ache", "neck pain"),
        ("physio", "physiotherapy"),
        ("physical therapy", "physiotherapy"),
        ("physiotherapy sessions", "physiotherapy"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Normalize span text: case-fold, strip punctuation, collapse whitespace,
/// then map the whole phrase through the synonym table.
pub fn normalize_text(text: &str, synonyms: &HashMap<String, String>) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;

    for ch in lowered.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            out.push(ch);
            pending_space = false;
        } else {
            pending_space = true;
        }
    }

    synonyms.get(&out).cloned().unwrap_or(out)
}

/// Canonical display form: normalized text with the first letter upper-cased.
pub fn display_form(normalized: &str) -> String {
    let mut chars = normalized.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// One deduplicated fact: all spans that normalized to the same text.
#[derive(Debug)]
struct FactCluster {
    normalized: String,
    /// Original text of the highest-confidence span, kept for fields where
    /// normalization would mangle the value (names).
    best_text: String,
    best_confidence: f64,
    /// Distinct models that produced this fact; two or more is agreement.
    sources: BTreeSet<SourceModel>,
    /// (utterance_index, offset) of the earliest and latest mention.
    first_pos: (usize, usize),
    last_pos: (usize, usize),
    /// Arrival order among clusters, for stable same-position ordering.
    arrival: usize,
}

impl FactCluster {
    fn effective_confidence(&self, agreement_bonus: f64) -> f64 {
        if self.sources.len() >= 2 {
            (self.best_confidence + agreement_bonus).min(1.0)
        } else {
            self.best_confidence
        }
    }
}

/// Group the spans of one field by normalized text.
fn cluster_spans(
    spans: &[CandidateSpan],
    field: CanonicalField,
    config: &AggregatorConfig,
) -> Vec<FactCluster> {
    let mut clusters: Vec<FactCluster> = Vec::new();
    let mut by_text: HashMap<String, usize> = HashMap::new();

    for span in spans.iter().filter(|s| s.label.field() == field) {
        let normalized = normalize_text(&span.text, &config.synonyms);
        if normalized.is_empty() {
            continue;
        }

        match by_text.get(&normalized) {
            Some(&idx) => {
                let cluster = &mut clusters[idx];
                if span.confidence > cluster.best_confidence {
                    cluster.best_confidence = span.confidence;
                    cluster.best_text = span.text.trim().to_string();
                }
                cluster.sources.insert(span.source);
                cluster.first_pos = cluster.first_pos.min(span.position());
                cluster.last_pos = cluster.last_pos.max(span.position());
            }
            None => {
                by_text.insert(normalized.clone(), clusters.len());
                clusters.push(FactCluster {
                    normalized,
                    best_text: span.text.trim().to_string(),
                    best_confidence: span.confidence,
                    sources: BTreeSet::from([span.source]),
                    first_pos: span.position(),
                    last_pos: span.position(),
                    arrival: clusters.len(),
                });
            }
        }
    }

    clusters
}

/// Resolve a set-valued field: accept every cluster above threshold, ordered
/// by first appearance in the transcript.
fn resolve_set(clusters: &[FactCluster], threshold: f64, bonus: f64) -> Vec<String> {
    let mut accepted: Vec<&FactCluster> = clusters
        .iter()
        .filter(|c| c.effective_confidence(bonus) >= threshold)
        .collect();
    accepted.sort_by_key(|c| (c.first_pos, c.arrival));
    accepted.iter().map(|c| display_form(&c.normalized)).collect()
}

/// Resolve a single-valued field: highest effective confidence wins; ties go
/// to the cluster last seen later in the transcript (status updates
/// supersede initial complaints).
fn resolve_single<'a>(
    clusters: &'a [FactCluster],
    threshold: f64,
    bonus: f64,
) -> Option<&'a FactCluster> {
    clusters
        .iter()
        .filter(|c| c.effective_confidence(bonus) >= threshold)
        .max_by(|a, b| {
            a.effective_confidence(bonus)
                .total_cmp(&b.effective_confidence(bonus))
                .then(a.last_pos.cmp(&b.last_pos))
                .then(a.arrival.cmp(&b.arrival))
        })
}

/// Reduce candidate spans into one canonical medical record.
///
/// Pure and deterministic: the same spans always produce the same record,
/// regardless of the order collaborator calls completed in (the extractor
/// sorts its output before handing it over).
pub fn aggregate(spans: &[CandidateSpan], config: &AggregatorConfig) -> MedicalRecord {
    let mut record = MedicalRecord::unknown();
    let bonus = config.agreement_bonus;
    let mut symptom_lexicon: Vec<String> = Vec::new();

    for field in CanonicalField::ALL {
        let clusters = cluster_spans(spans, field, config);
        let threshold = config.threshold(field);
        debug!(
            "field {:?}: {} clusters, threshold {}",
            field,
            clusters.len(),
            threshold
        );

        match field {
            CanonicalField::Symptoms => {
                record.symptoms = resolve_set(&clusters, threshold, bonus);
                // Every distinct symptom candidate, accepted or not, feeds
                // the status consistency pass.
                symptom_lexicon = clusters.iter().map(|c| c.normalized.clone()).collect();
            }
            CanonicalField::Treatment => {
                record.treatment = resolve_set(&clusters, threshold, bonus);
            }
            CanonicalField::PatientName => {
                if let Some(winner) = resolve_single(&clusters, threshold, bonus) {
                    record.patient_name = winner.best_text.clone();
                }
            }
            CanonicalField::Diagnosis => {
                if let Some(winner) = resolve_single(&clusters, threshold, bonus) {
                    record.diagnosis = display_form(&winner.normalized);
                }
            }
            CanonicalField::CurrentStatus => {
                if let Some(winner) = resolve_single(&clusters, threshold, bonus) {
                    record.current_status = display_form(&winner.normalized);
                }
            }
            CanonicalField::Prognosis => {
                if let Some(winner) = resolve_single(&clusters, threshold, bonus) {
                    record.prognosis = display_form(&winner.normalized);
                }
            }
        }
    }

    apply_status_consistency(&record, &symptom_lexicon, config)
}

/// Cross-field consistency pass: a symptom restated inside Current_Status
/// joins the Symptoms set. Idempotent; this is the only cross-field
/// coupling in the aggregator.
pub fn apply_status_consistency(
    record: &MedicalRecord,
    symptom_lexicon: &[String],
    config: &AggregatorConfig,
) -> MedicalRecord {
    let mut result = record.clone();
    if result.current_status == UNKNOWN {
        return result;
    }

    let status_norm = normalize_text(&result.current_status, &config.synonyms);
    let mut present: HashSet<String> = result
        .symptoms
        .iter()
        .map(|s| normalize_text(s, &config.synonyms))
        .collect();

    for entry in symptom_lexicon {
        if status_norm.contains(entry.as_str()) && !present.contains(entry) {
            debug!("status restates symptom '{}', adding to set", entry);
            result.symptoms.push(display_form(entry));
            present.insert(entry.clone());
        }
    }

    result
}
