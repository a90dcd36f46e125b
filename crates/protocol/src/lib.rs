//! Data types shared across the dental RAG crates.
//!
//! Everything here is plain data: the retrieval result record, findings extracted from visit
//! JSON, patient visit history and chat turns. Behaviour lives in the crates that own it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

mod tooth;

pub use tooth::ToothId;

/// Default number of codes returned by a retrieval call.
pub const DEFAULT_TOP_K: usize = 10;

/// One re-ranked billing code returned by the retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CodeMatch {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Cosine")]
    pub cosine: f32,
    #[serde(rename = "Jaccard")]
    pub jaccard: f32,
    #[serde(rename = "Score")]
    pub score: f32,
}

/// An anomaly that carries structured metadata and is therefore eligible for code matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Finding {
    #[serde(default)]
    #[schemars(with = "Value")]
    pub tooth: ToothId,
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Finding {
    /// Query text used for code retrieval, e.g. `Tooth 14: Caries distal`.
    #[must_use]
    pub fn query_text(&self) -> String {
        format!("Tooth {}: {}", self.tooth, self.description)
    }
}

/// A prior visit supplied by the caller as patient history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct PatientVisit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdt_matches: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
    System,
    Error,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::System => "System",
            Self::Error => "Error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub message: String,
}

impl ChatTurn {
    pub fn new(speaker: Speaker, message: impl Into<String>) -> Self {
        Self {
            speaker,
            message: message.into(),
        }
    }
}

/// JSON Schemas of the records exchanged with callers, keyed by type name.
#[must_use]
pub fn wire_schemas() -> Value {
    serde_json::json!({
        "CodeMatch": schemars::schema_for!(CodeMatch),
        "Finding": schemars::schema_for!(Finding),
        "PatientVisit": schemars::schema_for!(PatientVisit),
    })
}
