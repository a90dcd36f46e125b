use crate::error::Result;
use crate::retriever::Retriever;
use dental_protocol::{CodeMatch, Finding, ToothId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const NO_FINDINGS_MESSAGE: &str = "No anomalies with metadata found.";
pub const NO_CODE_MESSAGE: &str = "No matching CDT code found.";

/// Codes retrieved for one finding, in export-friendly form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingCodeRecord {
    pub tooth: ToothId,
    pub description: String,
    pub metadata: BTreeMap<String, Value>,
    pub codes: Vec<CodeMatch>,
}

impl FindingCodeRecord {
    /// Comma-separated codes, or the no-match message.
    #[must_use]
    pub fn codes_summary(&self) -> String {
        if self.codes.is_empty() {
            return NO_CODE_MESSAGE.to_string();
        }
        self.codes
            .iter()
            .map(|m| m.code.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingMatchReport {
    /// Text block handed to the language model.
    pub text: String,
    pub records: Vec<FindingCodeRecord>,
}

/// Retrieve codes for every finding. One failed retrieval fails the whole report.
pub async fn match_findings(
    retriever: &Retriever,
    findings: &[Finding],
    k: usize,
) -> Result<FindingMatchReport> {
    if findings.is_empty() {
        return Ok(FindingMatchReport {
            text: NO_FINDINGS_MESSAGE.to_string(),
            records: Vec::new(),
        });
    }

    let mut blocks = Vec::with_capacity(findings.len());
    let mut records = Vec::with_capacity(findings.len());
    for finding in findings {
        let query = finding.query_text();
        let codes = retriever.retrieve_best_match(&query, k).await?;
        blocks.push(render_block(&query, &finding.metadata, &codes));
        records.push(FindingCodeRecord {
            tooth: finding.tooth.clone(),
            description: finding.description.clone(),
            metadata: finding.metadata.clone(),
            codes,
        });
    }

    log::debug!("Matched codes for {} findings", records.len());
    Ok(FindingMatchReport {
        text: blocks.join("\n\n"),
        records,
    })
}

fn render_block(query: &str, metadata: &BTreeMap<String, Value>, codes: &[CodeMatch]) -> String {
    let metadata = serde_json::to_string_pretty(metadata).unwrap_or_else(|_| "{}".to_string());
    let mut lines = vec![
        format!("Finding: {query}"),
        format!("Metadata: {metadata}"),
        "Relevant CDT Codes:".to_string(),
    ];
    if codes.is_empty() {
        lines.push(NO_CODE_MESSAGE.to_string());
    } else {
        lines.extend(codes.iter().map(|m| format!("- {}: {}", m.code, m.description)));
    }
    lines.join("\n")
}
