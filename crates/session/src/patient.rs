use dental_protocol::{Finding, PatientVisit, ToothId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const NO_PATIENT_FOR_COMPARISON: &str = "No patient selected for comparison.";
pub const NOT_ENOUGH_VISITS: &str = "Need at least 2 visits for comparison.";

const UNKNOWN_DATE: &str = "Unknown date";
const DEFAULT_COMPARISON_VISITS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitSummary {
    pub date: String,
    pub visit_id: String,
    pub findings: Vec<Finding>,
    pub findings_count: usize,
    pub teeth_affected: Vec<ToothId>,
    pub cdt_matches: String,
}

impl VisitSummary {
    fn from_visit(visit: &PatientVisit) -> Self {
        let teeth: BTreeSet<ToothId> = visit.findings.iter().map(|f| f.tooth.clone()).collect();
        Self {
            date: visit
                .timestamp
                .clone()
                .unwrap_or_else(|| UNKNOWN_DATE.to_string()),
            visit_id: visit
                .visit_id
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            findings: visit.findings.clone(),
            findings_count: visit.findings.len(),
            teeth_affected: teeth.into_iter().collect(),
            cdt_matches: visit.cdt_matches.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonData {
    pub patient_name: String,
    pub visits: Vec<VisitSummary>,
}

/// Either the visits to compare or the reason they cannot be compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum VisitComparison {
    Unavailable(String),
    Available(ComparisonData),
}

pub(crate) fn patient_context(
    patient_id: Option<&str>,
    patient_name: &str,
    history: &[PatientVisit],
) -> String {
    if patient_id.is_none() {
        return String::new();
    }
    if history.is_empty() {
        return format!("New patient: {patient_name} - No previous visits.");
    }

    let mut parts = vec![format!(
        "Patient: {patient_name} - {} previous visits",
        history.len()
    )];
    for (i, visit) in history.iter().enumerate() {
        let date = visit.timestamp.as_deref().unwrap_or(UNKNOWN_DATE);
        parts.push(format!("\n--- Visit {} ({date}) ---", i + 1));
        if !visit.findings.is_empty() {
            let findings =
                serde_json::to_string(&visit.findings).unwrap_or_else(|_| "[]".to_string());
            parts.push(format!("Findings: {findings}"));
        }
        if let Some(matches) = visit.cdt_matches.as_deref().filter(|m| !m.is_empty()) {
            parts.push(format!("CDT Matches: {matches}"));
        }
    }
    parts.join("\n")
}

pub(crate) fn visit_comparison(
    patient_id: Option<&str>,
    patient_name: &str,
    history: &[PatientVisit],
    visit_ids: Option<&[String]>,
) -> VisitComparison {
    if patient_id.is_none() {
        return VisitComparison::Unavailable(NO_PATIENT_FOR_COMPARISON.to_string());
    }
    if history.len() < 2 {
        return VisitComparison::Unavailable(NOT_ENOUGH_VISITS.to_string());
    }

    let visits = match visit_ids.filter(|ids| !ids.is_empty()) {
        None => history
            .iter()
            .take(DEFAULT_COMPARISON_VISITS)
            .map(VisitSummary::from_visit)
            .collect(),
        Some(ids) => history
            .iter()
            .filter(|v| v.visit_id.as_ref().is_some_and(|id| ids.contains(id)))
            .map(VisitSummary::from_visit)
            .collect(),
    };

    VisitComparison::Available(ComparisonData {
        patient_name: patient_name.to_string(),
        visits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn visit(id: &str, date: &str, teeth: &[u32]) -> PatientVisit {
        PatientVisit {
            visit_id: Some(id.to_string()),
            timestamp: Some(date.to_string()),
            findings: teeth
                .iter()
                .map(|t| Finding {
                    tooth: ToothId::Number(*t),
                    description: "Caries".into(),
                    metadata: BTreeMap::from([("confidence".to_string(), json!(0.9))]),
                })
                .collect(),
            cdt_matches: Some("D2140".into()),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn context_without_patient_is_empty() {
        assert_eq!(patient_context(None, "", &[]), "");
    }

    #[test]
    fn context_for_new_patient() {
        assert_eq!(
            patient_context(Some("jane_doe"), "Jane Doe", &[]),
            "New patient: Jane Doe - No previous visits."
        );
    }

    #[test]
    fn context_enumerates_visits() {
        let history = vec![visit("v1", "2024-01-02", &[14]), PatientVisit::default()];
        let text = patient_context(Some("jane_doe"), "Jane Doe", &history);
        assert_eq!(
            text,
            "Patient: Jane Doe - 2 previous visits\n\
             \n--- Visit 1 (2024-01-02) ---\n\
             Findings: [{\"tooth\":14,\"description\":\"Caries\",\"metadata\":{\"confidence\":0.9}}]\n\
             CDT Matches: D2140\n\
             \n--- Visit 2 (Unknown date) ---"
        );
    }

    #[test]
    fn comparison_requires_patient_and_two_visits() {
        assert_eq!(
            visit_comparison(None, "", &[], None),
            VisitComparison::Unavailable(NO_PATIENT_FOR_COMPARISON.into())
        );
        assert_eq!(
            visit_comparison(Some("p"), "P", &[visit("v1", "d", &[1])], None),
            VisitComparison::Unavailable(NOT_ENOUGH_VISITS.into())
        );
    }

    #[test]
    fn comparison_defaults_to_first_three_visits() {
        let history: Vec<_> = (1..=4)
            .map(|i| visit(&format!("v{i}"), &format!("2024-0{i}-01"), &[3, 1, 3]))
            .collect();
        let VisitComparison::Available(data) = visit_comparison(Some("p"), "P", &history, None)
        else {
            panic!("expected comparison data");
        };
        assert_eq!(data.visits.len(), 3);
        assert_eq!(data.visits[0].findings_count, 3);
        assert_eq!(
            data.visits[0].teeth_affected,
            vec![ToothId::Number(1), ToothId::Number(3)]
        );

        let ids = vec!["v2".to_string(), "v4".to_string()];
        let VisitComparison::Available(data) =
            visit_comparison(Some("p"), "P", &history, Some(&ids))
        else {
            panic!("expected comparison data");
        };
        let selected: Vec<&str> = data.visits.iter().map(|v| v.visit_id.as_str()).collect();
        assert_eq!(selected, vec!["v2", "v4"]);
    }
}
