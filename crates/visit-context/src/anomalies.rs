use crate::visit::{Anomaly, VisitRecord};
use dental_protocol::ToothId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

const UNKNOWN_LOCATION: &str = "Unknown Location";
const BY_TOOTH_EXCLUDED: &str = "bone loss";

/// Above-threshold anomalies sharing one description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyGroup {
    /// `"{description} [{ranges}]"`, e.g. `Bone loss [3–5, 8]`.
    pub label: String,
    pub description: String,
    /// Highest confidence among the merged anomalies.
    pub confidence: f64,
    /// Number of merged anomalies, not distinct teeth.
    pub count: usize,
    pub teeth: BTreeSet<ToothId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspectedAnomaly {
    pub description: String,
    pub tooth: ToothId,
    pub confidence: f64,
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToothAnomaly {
    pub description: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToothAnomalies {
    pub tooth: ToothId,
    pub anomalies: Vec<ToothAnomaly>,
}

/// Confidence-filtered view of a visit's anomalies.
///
/// `total_anomalies == filtered_anomalies + suspected_anomalies.len()` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub anomalies_grouped: Vec<AnomalyGroup>,
    pub suspected_anomalies: Vec<SuspectedAnomaly>,
    pub anomalies_by_tooth: Vec<ToothAnomalies>,
    pub confidence_threshold: f64,
    pub total_anomalies: usize,
    pub filtered_anomalies: usize,
}

/// Group anomalies at or above `confidence_threshold` by exact description; keep the rest as
/// suspected. Groups keep first-seen order.
#[must_use]
pub fn transform_anomalies_for_llm(record: &VisitRecord, confidence_threshold: f64) -> AnomalyReport {
    let mut groups: Vec<AnomalyGroup> = Vec::new();
    let mut suspected = Vec::new();
    let mut by_tooth: BTreeMap<ToothId, Vec<ToothAnomaly>> = BTreeMap::new();
    let mut total = 0usize;
    let mut filtered = 0usize;

    for (tooth, anomaly) in record.anomalies() {
        total += 1;
        let confidence = anomaly.confidence();
        if confidence < confidence_threshold {
            suspected.push(suspect(tooth, anomaly, confidence));
            continue;
        }

        filtered += 1;
        match groups
            .iter_mut()
            .find(|g| g.description == anomaly.description)
        {
            Some(group) => {
                group.confidence = group.confidence.max(confidence);
                group.count += 1;
                group.teeth.insert(tooth.clone());
            }
            None => groups.push(AnomalyGroup {
                label: String::new(),
                description: anomaly.description.clone(),
                confidence,
                count: 1,
                teeth: BTreeSet::from([tooth.clone()]),
            }),
        }

        if !anomaly.description.to_lowercase().contains(BY_TOOTH_EXCLUDED) {
            by_tooth.entry(tooth.clone()).or_default().push(ToothAnomaly {
                description: anomaly.description.clone(),
                confidence,
            });
        }
    }

    for group in &mut groups {
        group.label = group_label(&group.description, &group.teeth);
    }

    log::debug!(
        "Anomaly grouping at threshold {confidence_threshold}: {total} total, {filtered} kept, {} groups",
        groups.len()
    );

    AnomalyReport {
        anomalies_grouped: groups,
        suspected_anomalies: suspected,
        anomalies_by_tooth: by_tooth
            .into_iter()
            .map(|(tooth, anomalies)| ToothAnomalies { tooth, anomalies })
            .collect(),
        confidence_threshold,
        total_anomalies: total,
        filtered_anomalies: filtered,
    }
}

fn suspect(tooth: &ToothId, anomaly: &Anomaly, confidence: f64) -> SuspectedAnomaly {
    SuspectedAnomaly {
        description: anomaly.description.clone(),
        tooth: tooth.clone(),
        confidence,
        metadata: anomaly.metadata.clone(),
    }
}

fn group_label(description: &str, teeth: &BTreeSet<ToothId>) -> String {
    let numbers: Vec<u32> = teeth.iter().filter_map(ToothId::as_number).collect();
    let mut parts = compress_ranges(&numbers);
    if teeth.iter().any(|t| !t.is_numeric()) {
        parts.push(UNKNOWN_LOCATION.to_string());
    }
    format!("{description} [{}]", parts.join(", "))
}

/// Collapse tooth numbers into ranges: `[3, 4, 5, 8]` becomes `["3–5", "8"]`.
#[must_use]
pub fn compress_ranges(ids: &[u32]) -> Vec<String> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut out = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return out;
    };
    let (mut start, mut end) = (first, first);
    for id in iter {
        if id == end + 1 {
            end = id;
        } else {
            out.push(render_range(start, end));
            start = id;
            end = id;
        }
    }
    out.push(render_range(start, end));
    out
}

fn render_range(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}\u{2013}{end}")
    }
}

impl AnomalyReport {
    /// Plain-text rendering used inside prompts.
    #[must_use]
    pub fn to_llm_text(&self) -> String {
        let threshold = self.confidence_threshold;
        let mut out = String::new();

        let _ = writeln!(out, "Anomalies (confidence >= {threshold:.2}):");
        if self.anomalies_grouped.is_empty() {
            out.push_str("- None\n");
        }
        for group in &self.anomalies_grouped {
            let _ = writeln!(
                out,
                "- {} (confidence {:.2}, count {})",
                group.label, group.confidence, group.count
            );
        }

        let _ = writeln!(out, "Suspected anomalies (confidence < {threshold:.2}):");
        if self.suspected_anomalies.is_empty() {
            out.push_str("- None\n");
        }
        for anomaly in &self.suspected_anomalies {
            let _ = writeln!(
                out,
                "- Tooth {}: {} (confidence {:.2})",
                anomaly.tooth, anomaly.description, anomaly.confidence
            );
        }

        if !self.anomalies_by_tooth.is_empty() {
            out.push_str("Anomalies by tooth:\n");
            for tooth in &self.anomalies_by_tooth {
                let items: Vec<String> = tooth
                    .anomalies
                    .iter()
                    .map(|a| format!("{} ({:.2})", a.description, a.confidence))
                    .collect();
                let _ = writeln!(out, "- Tooth {}: {}", tooth.tooth, items.join(", "));
            }
        }

        let _ = write!(
            out,
            "Total anomalies: {}, above threshold: {}",
            self.total_anomalies, self.filtered_anomalies
        );
        out
    }
}
