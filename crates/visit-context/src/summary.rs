use crate::visit::{ParsedVisit, VisitRecord};

pub const NO_FINDINGS_PLACEHOLDER: &str = "No findings detected.";

/// Render the whole visit as labelled plain text for the language model.
#[must_use]
pub fn json_to_full_text(visit: &ParsedVisit) -> String {
    if !visit.is_recognized() {
        return NO_FINDINGS_PLACEHOLDER.to_string();
    }
    let text = render_record(&visit.record);
    if text.is_empty() {
        NO_FINDINGS_PLACEHOLDER.to_string()
    } else {
        text
    }
}

fn render_record(record: &VisitRecord) -> String {
    let mut parts = Vec::new();
    if let Some(image) = &record.image {
        match (&image.width, &image.height) {
            (Some(w), Some(h)) => parts.push(format!(
                "Image: {} ({}x{})",
                image.path,
                plain(w),
                plain(h)
            )),
            _ => parts.push(format!("Image: {}", image.path)),
        }
    }

    for tooth in record.teeth.iter().filter(|t| !t.is_empty()) {
        let mut lines = vec![format!("Tooth {}:", tooth.tooth)];
        if !tooth.anomalies.is_empty() {
            let anomalies: Vec<String> = tooth
                .anomalies
                .iter()
                .map(|a| {
                    if a.has_metadata() {
                        format!("{} (with metadata)", a.description)
                    } else {
                        a.description.clone()
                    }
                })
                .collect();
            lines.push(format!("  Anomalies: {}", anomalies.join(", ")));
        }
        if !tooth.procedures.is_empty() {
            lines.push(format!("  Procedures: {}", tooth.procedures.join(", ")));
        }
        if !tooth.foreign_objects.is_empty() {
            lines.push(format!(
                "  Foreign Objects: {}",
                tooth.foreign_objects.join(", ")
            ));
        }
        parts.push(lines.join("\n"));
    }
    parts.join("\n\n")
}

fn plain(value: &serde_json::Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), ToString::to_string)
}
