//! Visit JSON to language-model context.
//!
//! A visit document goes through one adapter into [`VisitRecord`]; findings, the full-text
//! summary and the confidence-filtered anomaly report are pure functions of that record.

mod anomalies;
mod error;
mod findings;
mod summary;
mod visit;

pub use anomalies::{
    compress_ranges, transform_anomalies_for_llm, AnomalyGroup, AnomalyReport, SuspectedAnomaly,
    ToothAnomalies, ToothAnomaly, DEFAULT_CONFIDENCE_THRESHOLD,
};
pub use error::{ContextError, Result};
pub use findings::extract_findings;
pub use summary::{json_to_full_text, NO_FINDINGS_PLACEHOLDER};
pub use visit::{Anomaly, ImageInfo, ParsedVisit, ToothRecord, VisitRecord, VisitShape};

use dental_protocol::Finding;

/// Everything derived from one visit document.
#[derive(Debug, Clone, PartialEq)]
pub struct VisitContext {
    pub visit: ParsedVisit,
    pub findings: Vec<Finding>,
    pub full_text: String,
    pub anomalies: AnomalyReport,
}

impl VisitContext {
    pub fn from_json_str(raw: &str, confidence_threshold: f64) -> Result<Self> {
        Ok(Self::from_parsed(
            ParsedVisit::from_json_str(raw)?,
            confidence_threshold,
        ))
    }

    #[must_use]
    pub fn from_parsed(visit: ParsedVisit, confidence_threshold: f64) -> Self {
        let findings = extract_findings(&visit.record);
        let full_text = json_to_full_text(&visit);
        let anomalies = transform_anomalies_for_llm(&visit.record, confidence_threshold);
        Self {
            visit,
            findings,
            full_text,
            anomalies,
        }
    }
}
