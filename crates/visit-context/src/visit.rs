//! Visit JSON adapters.
//!
//! Two document shapes are accepted and each has its own adapter into [`VisitRecord`]:
//!
//! ```text
//! legacy:  {"teeth": [{"number": 3, "anomalies": [..], "procedures": [..], "foreign_objects": [..]}]}
//! current: {"current_visit": {"anomalies":       {"teeth": [{"number": 3, "anomalies": [..]}]},
//!                             "procedures":      {"teeth": [{"number": 3, "procedures": [..]}]},
//!                             "foreign_objects": {"teeth": [{"number": 3, "foreign_objects": [..]}]}}}
//! ```
//!
//! The shape is decided by the top-level key alone; `current_visit` wins when both are present.

use crate::error::{ContextError, Result};
use dental_protocol::ToothId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

const ANOMALIES: &str = "anomalies";
const PROCEDURES: &str = "procedures";
const FOREIGN_OBJECTS: &str = "foreign_objects";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitShape {
    Legacy,
    Current,
    Unrecognized,
}

impl fmt::Display for VisitShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Legacy => "legacy",
            Self::Current => "current",
            Self::Unrecognized => "unrecognized",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub path: String,
    pub width: Option<Value>,
    pub height: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub description: String,
    pub metadata: BTreeMap<String, Value>,
}

impl Anomaly {
    #[must_use]
    pub fn has_metadata(&self) -> bool {
        !self.metadata.is_empty()
    }

    /// `metadata.confidence` as a number; missing or non-numeric values count as 0.0.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        match self.metadata.get("confidence") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToothRecord {
    pub tooth: ToothId,
    pub anomalies: Vec<Anomaly>,
    pub procedures: Vec<String>,
    pub foreign_objects: Vec<String>,
}

impl ToothRecord {
    fn new(tooth: ToothId) -> Self {
        Self {
            tooth,
            anomalies: Vec::new(),
            procedures: Vec::new(),
            foreign_objects: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anomalies.is_empty() && self.procedures.is_empty() && self.foreign_objects.is_empty()
    }
}

/// Canonical visit record every downstream step works on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisitRecord {
    pub image: Option<ImageInfo>,
    pub teeth: Vec<ToothRecord>,
}

impl VisitRecord {
    pub fn anomalies(&self) -> impl Iterator<Item = (&ToothId, &Anomaly)> {
        self.teeth
            .iter()
            .flat_map(|tooth| tooth.anomalies.iter().map(move |a| (&tooth.tooth, a)))
    }
}

/// A visit document together with its canonical record.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVisit {
    pub document: Value,
    pub shape: VisitShape,
    pub record: VisitRecord,
}

impl ParsedVisit {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(raw)?;
        Self::from_value(document)
    }

    /// Adapt an already-parsed document. Anything but a JSON object is rejected.
    pub fn from_value(document: Value) -> Result<Self> {
        let Value::Object(obj) = &document else {
            return Err(ContextError::validation("visit document must be a JSON object"));
        };

        let (shape, record) = if let Some(current) = obj.get("current_visit") {
            (VisitShape::Current, adapt_current(obj, current)?)
        } else if obj.contains_key("teeth") {
            (VisitShape::Legacy, adapt_legacy(obj)?)
        } else {
            (VisitShape::Unrecognized, VisitRecord::default())
        };

        log::debug!(
            "Parsed {shape} visit document with {} teeth",
            record.teeth.len()
        );
        Ok(Self {
            document,
            shape,
            record,
        })
    }

    #[must_use]
    pub fn is_recognized(&self) -> bool {
        self.shape != VisitShape::Unrecognized
    }
}

fn adapt_legacy(obj: &Map<String, Value>) -> Result<VisitRecord> {
    let mut teeth = Vec::new();
    for (idx, raw) in list(obj, "teeth", "teeth")?.iter().enumerate() {
        let tooth = object(raw, &format!("teeth[{idx}]"))?;
        let mut record = ToothRecord::new(tooth_id(tooth));
        record.anomalies = anomalies(tooth, &format!("teeth[{idx}].anomalies"))?;
        record.procedures = descriptions(tooth, PROCEDURES, &format!("teeth[{idx}].procedures"))?;
        record.foreign_objects = descriptions(
            tooth,
            FOREIGN_OBJECTS,
            &format!("teeth[{idx}].foreign_objects"),
        )?;
        teeth.push(record);
    }
    Ok(VisitRecord {
        image: image(obj),
        teeth,
    })
}

fn adapt_current(root: &Map<String, Value>, current: &Value) -> Result<VisitRecord> {
    let visit = object(current, "current_visit")?;
    let mut teeth: Vec<ToothRecord> = Vec::new();

    for category in [ANOMALIES, PROCEDURES, FOREIGN_OBJECTS] {
        let Some(section) = visit.get(category).filter(|v| !v.is_null()) else {
            continue;
        };
        let path = format!("current_visit.{category}");
        let section = object(section, &path)?;
        for (idx, raw) in list(section, "teeth", &format!("{path}.teeth"))?.iter().enumerate() {
            let entry_path = format!("{path}.teeth[{idx}]");
            let entry = object(raw, &entry_path)?;
            let id = tooth_id(entry);
            let pos = match teeth.iter().position(|t| t.tooth == id) {
                Some(pos) => pos,
                None => {
                    teeth.push(ToothRecord::new(id));
                    teeth.len() - 1
                }
            };
            let record = &mut teeth[pos];
            let items_path = format!("{entry_path}.{category}");
            match category {
                ANOMALIES => record.anomalies.extend(anomalies(entry, &items_path)?),
                PROCEDURES => record
                    .procedures
                    .extend(descriptions(entry, category, &items_path)?),
                _ => record
                    .foreign_objects
                    .extend(descriptions(entry, category, &items_path)?),
            }
        }
    }

    Ok(VisitRecord {
        image: image(visit).or_else(|| image(root)),
        teeth,
    })
}

fn tooth_id(tooth: &Map<String, Value>) -> ToothId {
    ToothId::from_json(tooth.get("number").or_else(|| tooth.get("tooth")))
}

fn image(obj: &Map<String, Value>) -> Option<ImageInfo> {
    let path = obj.get("imagePath")?;
    let path = path.as_str().map_or_else(|| path.to_string(), ToString::to_string);
    Some(ImageInfo {
        path,
        width: obj.get("imageWidth").cloned(),
        height: obj.get("imageHeight").cloned(),
    })
}

fn anomalies(tooth: &Map<String, Value>, path: &str) -> Result<Vec<Anomaly>> {
    list(tooth, ANOMALIES, path)?
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let item_path = format!("{path}[{idx}]");
            let item = object(raw, &item_path)?;
            let metadata = match item.get("metadata") {
                None | Some(Value::Null) => BTreeMap::new(),
                Some(Value::Object(map)) => map.clone().into_iter().collect(),
                Some(_) => {
                    return Err(ContextError::validation(format!(
                        "{item_path}.metadata must be an object"
                    )))
                }
            };
            Ok(Anomaly {
                description: description(item),
                metadata,
            })
        })
        .collect()
}

/// Procedures and foreign objects are either `{"description": ..}` objects or bare strings.
fn descriptions(tooth: &Map<String, Value>, key: &str, path: &str) -> Result<Vec<String>> {
    list(tooth, key, path)?
        .iter()
        .enumerate()
        .map(|(idx, raw)| match raw {
            Value::String(s) => Ok(s.clone()),
            Value::Object(item) => Ok(description(item)),
            _ => Err(ContextError::validation(format!(
                "{path}[{idx}] must be an object or a string"
            ))),
        })
        .collect()
}

fn description(item: &Map<String, Value>) -> String {
    match item.get("description") {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    }
}

fn list<'a>(obj: &'a Map<String, Value>, key: &str, path: &str) -> Result<&'a [Value]> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ContextError::validation(format!("{path} must be an array"))),
    }
}

fn object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| ContextError::validation(format!("{path} must be an object")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn legacy_shape_is_adapted() {
        let parsed = ParsedVisit::from_value(json!({
            "imagePath": "xray.png", "imageWidth": 800, "imageHeight": 600,
            "teeth": [{
                "number": 14,
                "anomalies": [{"description": "Caries", "metadata": {"confidence": 0.9}}],
                "procedures": [{"description": "Filling"}],
                "foreign_objects": ["Implant"]
            }]
        }))
        .unwrap();
        assert_eq!(parsed.shape, VisitShape::Legacy);
        let tooth = &parsed.record.teeth[0];
        assert_eq!(tooth.tooth, ToothId::Number(14));
        assert_eq!(tooth.anomalies[0].confidence(), 0.9);
        assert_eq!(tooth.procedures, vec!["Filling"]);
        assert_eq!(tooth.foreign_objects, vec!["Implant"]);
        assert_eq!(parsed.record.image.unwrap().path, "xray.png");
    }

    #[test]
    fn current_shape_merges_categories_per_tooth() {
        let parsed = ParsedVisit::from_value(json!({
            "current_visit": {
                "anomalies": {"teeth": [
                    {"number": "3", "anomalies": [{"description": "Bone loss", "metadata": {"confidence": 0.6}}]},
                    {"number": 9, "anomalies": [{"description": "Caries"}]}
                ]},
                "procedures": {"teeth": [{"number": 3, "procedures": [{"description": "Crown"}]}]},
                "foreign_objects": {"teeth": []}
            }
        }))
        .unwrap();
        assert_eq!(parsed.shape, VisitShape::Current);
        let ids: Vec<_> = parsed.record.teeth.iter().map(|t| t.tooth.clone()).collect();
        assert_eq!(ids, vec![ToothId::Number(3), ToothId::Number(9)]);
        assert_eq!(parsed.record.teeth[0].procedures, vec!["Crown"]);
        assert!(!parsed.record.teeth[1].anomalies[0].has_metadata());
    }

    #[test]
    fn current_visit_wins_over_teeth() {
        let parsed = ParsedVisit::from_value(json!({
            "teeth": [{"number": 1, "anomalies": [{"description": "Legacy"}]}],
            "current_visit": {"anomalies": {"teeth": []}}
        }))
        .unwrap();
        assert_eq!(parsed.shape, VisitShape::Current);
        assert!(parsed.record.teeth.is_empty());
    }

    #[test]
    fn unknown_shape_is_unrecognized_not_an_error() {
        let parsed = ParsedVisit::from_value(json!({"patient": "x"})).unwrap();
        assert_eq!(parsed.shape, VisitShape::Unrecognized);
        assert!(!parsed.is_recognized());
    }

    #[test]
    fn malformed_documents_are_validation_errors() {
        for document in [
            json!([1, 2]),
            json!({"teeth": {"number": 1}}),
            json!({"teeth": [{"number": 1, "anomalies": "caries"}]}),
            json!({"teeth": [{"number": 1, "anomalies": [{"description": "x", "metadata": 3}]}]}),
            json!({"current_visit": []}),
            json!({"current_visit": {"anomalies": {"teeth": 5}}}),
        ] {
            let err = ParsedVisit::from_value(document.clone()).unwrap_err();
            assert!(matches!(err, ContextError::Validation(_)), "{document}");
        }
        assert!(matches!(
            ParsedVisit::from_json_str("{not json").unwrap_err(),
            ContextError::Parse(_)
        ));
    }

    #[test]
    fn confidence_defaults_to_zero() {
        let anomaly = Anomaly {
            description: "x".into(),
            metadata: BTreeMap::from([("confidence".to_string(), json!("high"))]),
        };
        assert_eq!(anomaly.confidence(), 0.0);
        let anomaly = Anomaly {
            description: "x".into(),
            metadata: BTreeMap::from([("confidence".to_string(), json!("0.75"))]),
        };
        assert_eq!(anomaly.confidence(), 0.75);
    }
}
