use crate::visit::VisitRecord;
use dental_protocol::Finding;

/// One [`Finding`] per anomaly that carries metadata, in document order.
#[must_use]
pub fn extract_findings(record: &VisitRecord) -> Vec<Finding> {
    record
        .anomalies()
        .filter(|(_, anomaly)| anomaly.has_metadata())
        .map(|(tooth, anomaly)| Finding {
            tooth: tooth.clone(),
            description: anomaly.description.clone(),
            metadata: anomaly.metadata.clone(),
        })
        .collect()
}
