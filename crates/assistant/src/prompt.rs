//! Prompt assembly. Each builder returns plain text ending in the marker the model is
//! expected to answer after; [`crate::llm::strip_echo`] removes anything before it.

use dental_protocol::PatientVisit;
use dental_session::{ComparisonData, LoadedContext};
use std::fmt::Write;

const PERSONA: &str = "You are a dental clinical assistant.";
const NO_CASE: &str = "No case loaded.";
const NO_CODES: &str = "No teeth with metadata found.";

pub(crate) fn full_history(patient_name: &str, history: &[PatientVisit], question: &str) -> String {
    let visits = serde_json::to_string_pretty(history).unwrap_or_else(|_| "[]".to_string());
    format!(
        "{PERSONA} Give a structured overview of every visit below and highlight exact changes \
         in anomalies and procedures.\n\n\
         Patient: {patient_name}\nTotal visits: {}\n\nVisit data:\n{visits}\n\n\
         Question: {question}\n\nResponse:",
        history.len()
    )
}

pub(crate) fn comparison(data: &ComparisonData, question: &str) -> String {
    let visits = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    format!(
        "{PERSONA} Compare the visits below: new findings, resolved issues, progression of \
         existing conditions, treatment effectiveness and clinical recommendations.\n\n\
         Patient: {}\nVisits to compare: {}\n\nVisit data:\n{visits}\n\n\
         Question: {question}\n\nResponse:",
        data.patient_name,
        data.visits.len()
    )
}

pub(crate) fn general(patient_context: &str, question: &str) -> String {
    let mut prompt = format!(
        "{PERSONA} Answer accurately in plain language, mention relevant CDT codes and \
         treatment alternatives, and keep it under 200 words.\n\n"
    );
    if !patient_context.is_empty() {
        prompt.push_str(patient_context);
        prompt.push_str("\n\n");
    }
    let _ = write!(prompt, "Question: {question}\n\nResponse:");
    prompt
}

pub(crate) fn treatment_plan(context: Option<&LoadedContext>, question: &str) -> String {
    let (case, codes, anomalies) = context.map_or((NO_CASE, NO_CODES, ""), |c| {
        let codes = if c.findings.is_empty() {
            NO_CODES
        } else {
            c.cdt_matches.as_str()
        };
        (c.json_context.as_str(), codes, c.anomaly_summary.as_str())
    });
    format!(
        "{PERSONA} Create a treatment plan only for teeth whose anomalies carry metadata. For \
         each finding give the tooth, the finding and the most appropriate CDT code(s) from the \
         candidates below; write \"No matching CDT code found.\" when none fits. Format the \
         plan as a table with columns Tooth | Finding | Metadata | Recommended CDT Codes.\n\n\
         Current case:\n{case}\n\n\
         Anomaly overview:\n{anomalies}\n\n\
         Candidate CDT codes:\n{codes}\n\n\
         Request: {question}\n\nAnswer:"
    )
}

pub(crate) fn case_question(
    patient_context: &str,
    context: Option<&LoadedContext>,
    question: &str,
) -> String {
    let (case, codes) = context.map_or((NO_CASE, ""), |c| {
        (c.json_context.as_str(), c.cdt_matches.as_str())
    });
    format!(
        "{PERSONA} Use the patient history and the current visit to answer; reference earlier \
         visits and note changes over time where relevant.\n\n\
         Patient history:\n{patient_context}\n\n\
         Current visit:\n{case}\n\n\
         Available CDT codes:\n{codes}\n\n\
         Question: {question}\n\nResponse:"
    )
}
