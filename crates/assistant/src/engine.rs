use crate::config::AssistantConfig;
use crate::error::{AssistantError, ErrorKind, Result};
use crate::intent::{Intent, IntentClassifier};
use crate::llm::{strip_echo, LanguageModel, OllamaLanguageModel};
use crate::prompt;
use dental_protocol::{CodeMatch, Finding, PatientVisit, Speaker};
use dental_search::{match_findings, FindingMatchReport, Retriever};
use dental_session::{LoadedContext, Session, SessionStore, VisitComparison};
use dental_vector_store::{CodeIndex, Embedder};
use dental_visit_context::{ContextError, VisitContext};
use serde::Serialize;
use std::fmt::Write;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const NO_HISTORY_MESSAGE: &str = "No past visit data available.";
const NO_FINDINGS_CDT: &str = "No anomalies with metadata.";
const RECENT_VISITS_SHOWN: usize = 3;
const BLANK_PATIENT: &str = "Please enter a patient name or ID";
const BLANK_QUESTION: &str = "Please enter a question";

/// Result of a context load that did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    Loaded { thread_id: String, findings: usize },
    /// Input was rejected; the reason is also recorded as an `Error` turn.
    Rejected { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "kind", rename_all = "snake_case")]
pub enum ReplyStatus {
    Answered,
    /// The question was blank, or the model failed or timed out; the answer is a
    /// user-visible warning.
    Degraded(ErrorKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub answer: String,
    /// `None` when the question was rejected before routing.
    pub intent: Option<Intent>,
    pub status: ReplyStatus,
}

impl Reply {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, ReplyStatus::Degraded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PatientSelection {
    Selected {
        patient_id: String,
        visit_count: usize,
        message: String,
    },
    /// Input was rejected; the reason is also recorded as an `Error` turn.
    Rejected { reason: String },
}

/// What an intent needs before any turn is recorded.
enum Plan {
    Immediate(String),
    Prompt(String),
}

/// Dental assistant: wires retrieval, visit parsing, sessions and the language model.
///
/// `load_context` and `ask` hold the session's lock for their whole duration and mutate the
/// thread only after every slow step has produced its result, so a dropped future leaves the
/// session as it was.
pub struct DentalAssistant {
    config: AssistantConfig,
    retriever: Retriever,
    llm: Arc<dyn LanguageModel>,
    sessions: Arc<SessionStore>,
}

impl DentalAssistant {
    /// Open (or build) the code index and connect to the configured services.
    pub async fn start(config: AssistantConfig) -> Result<Self> {
        config.validate()?;
        let embedder = config.embedding.build()?;
        let llm: Arc<dyn LanguageModel> = Arc::new(OllamaLanguageModel::new(&config.llm)?);
        Self::start_with(config, embedder, llm).await
    }

    /// Like [`Self::start`] with caller-supplied collaborators.
    pub async fn start_with(
        config: AssistantConfig,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let index =
            CodeIndex::open(&config.table_path, &config.index_path, embedder.as_ref()).await?;
        log::info!(
            "Assistant ready: {} codes, embeddings {}, model {}",
            index.len(),
            index.model_id(),
            llm.model_id()
        );
        let retriever = Retriever::new(Arc::new(index), embedder);
        Ok(Self::new(
            config,
            retriever,
            llm,
            Arc::new(SessionStore::new()),
        ))
    }

    #[must_use]
    pub fn new(
        config: AssistantConfig,
        retriever: Retriever,
        llm: Arc<dyn LanguageModel>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            config,
            retriever,
            llm,
            sessions,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    #[must_use]
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Ranked codes for a free-text query, bounded by the retrieval timeout.
    pub async fn match_codes(&self, query: &str, k: usize) -> Result<Vec<CodeMatch>> {
        let matches = self
            .with_timeout(
                "retrieval",
                self.config.retrieval.timeout_secs,
                self.retriever.retrieve_best_match(query, k),
            )
            .await??;
        Ok(matches)
    }

    /// Bind `session_id` to a patient and record a summary of their recent visits.
    pub async fn select_patient(
        &self,
        session_id: &str,
        input: &str,
        history: Vec<PatientVisit>,
    ) -> Result<PatientSelection> {
        let mut session = self.sessions.lock(session_id).await;
        let name = input.trim();
        if name.is_empty() {
            let reason = AssistantError::validation(BLANK_PATIENT).to_string();
            session
                .current_thread_mut()
                .push_turn(Speaker::Error, format!("⚠️ {reason}"));
            return Ok(PatientSelection::Rejected { reason });
        }
        let patient_id = name.replace(' ', "_").to_lowercase();

        let message = selection_message(name, &patient_id, &history);
        let visit_count = session.set_current_patient(patient_id.as_str(), name, history);
        session
            .current_thread_mut()
            .push_turn(Speaker::System, message.clone());
        log::info!("Session {session_id}: selected patient {patient_id} ({visit_count} visits)");

        Ok(PatientSelection::Selected {
            patient_id,
            visit_count,
            message,
        })
    }

    /// Parse a visit document, retrieve codes for its findings and commit the result to the
    /// current thread.
    ///
    /// Malformed input is recorded and reported as [`LoadOutcome::Rejected`]. Retrieval
    /// failures and timeouts are recorded as an `Error` turn and returned as `Err`; the
    /// thread's context is left as it was.
    pub async fn load_context(&self, session_id: &str, json_text: &str) -> Result<LoadOutcome> {
        let mut session = self.sessions.lock(session_id).await;

        let visit = match parse_visit(json_text, self.config.confidence_threshold) {
            Ok(visit) => visit,
            Err(reason) => {
                log::warn!("Session {session_id}: rejected visit document: {reason}");
                session
                    .current_thread_mut()
                    .push_turn(Speaker::Error, format!("⚠️ {reason}"));
                return Ok(LoadOutcome::Rejected { reason });
            }
        };

        let report = match self.match_visit_findings(&visit.findings).await {
            Ok(report) => report,
            Err(e) => {
                log::warn!("Session {session_id}: code retrieval for visit failed: {e}");
                session
                    .current_thread_mut()
                    .push_turn(Speaker::Error, format!("⚠️ {e}"));
                return Err(e);
            }
        };

        let findings = visit.findings.len();
        let cdt_matches = if visit.findings.is_empty() {
            NO_FINDINGS_CDT.to_string()
        } else {
            report.text
        };
        let context = LoadedContext {
            json_context: visit.full_text,
            json_text: json_text.to_string(),
            anomaly_summary: visit.anomalies.to_llm_text(),
            findings: visit.findings,
            cdt_matches,
        };

        let thread = session.current_thread_mut();
        thread.load(context);
        let mut message = format!("✅ Patient data loaded in case '{}'", thread.name);
        if findings > 0 {
            let _ = write!(message, "\nFound {findings} anomalies with metadata.");
        } else {
            message.push_str("\nNo anomalies with metadata found.");
        }
        thread.push_turn(Speaker::System, message);
        let thread_id = thread.id.clone();
        log::info!("Session {session_id}: loaded {findings} findings into {thread_id}");

        Ok(LoadOutcome::Loaded {
            thread_id,
            findings,
        })
    }

    /// Answer a question against the current thread.
    ///
    /// Blank questions and model failures degrade to a visible warning instead of an error;
    /// the question and the answer are appended together once the answer is known.
    pub async fn ask(&self, session_id: &str, question: &str) -> Result<Reply> {
        let mut session = self.sessions.lock(session_id).await;
        let question = question.trim();
        if question.is_empty() {
            let err = AssistantError::validation(BLANK_QUESTION);
            let answer = format!("⚠️ {err}");
            session
                .current_thread_mut()
                .push_turn(Speaker::Error, answer.clone());
            return Ok(Reply {
                answer,
                intent: None,
                status: ReplyStatus::Degraded(err.kind()),
            });
        }

        let loaded = session.current_thread().is_some_and(|t| t.is_loaded());
        let intent = IntentClassifier::classify(question, loaded);
        log::debug!("Session {session_id}: routed question as {intent:?}");

        let (answer, status) = match plan(&session, intent, question) {
            Plan::Immediate(answer) => (answer, ReplyStatus::Answered),
            Plan::Prompt(prompt) => match self.generate(&prompt).await {
                Ok(raw) => (strip_echo(&raw), ReplyStatus::Answered),
                Err(e) => {
                    log::warn!("Session {session_id}: answer degraded: {e}");
                    (
                        format!("⚠️ Error processing your question: {e}"),
                        ReplyStatus::Degraded(e.kind()),
                    )
                }
            },
        };

        let thread = session.current_thread_mut();
        thread.push_turn(Speaker::User, question);
        thread.push_turn(Speaker::Assistant, answer.clone());

        Ok(Reply {
            answer,
            intent: Some(intent),
            status,
        })
    }

    async fn match_visit_findings(&self, findings: &[Finding]) -> Result<FindingMatchReport> {
        let report = self
            .with_timeout(
                "retrieval",
                self.config.retrieval.timeout_secs,
                match_findings(&self.retriever, findings, self.config.retrieval.top_k),
            )
            .await??;
        Ok(report)
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.with_timeout(
            "language model",
            self.config.llm.timeout_secs,
            self.llm.complete(prompt),
        )
        .await?
    }

    async fn with_timeout<F: Future>(
        &self,
        operation: &'static str,
        seconds: u64,
        fut: F,
    ) -> Result<F::Output> {
        tokio::time::timeout(Duration::from_secs(seconds), fut)
            .await
            .map_err(|_| AssistantError::Timeout { operation, seconds })
    }
}

fn parse_visit(json_text: &str, threshold: f64) -> std::result::Result<VisitContext, String> {
    if json_text.trim().is_empty() {
        return Err("No JSON content provided".to_string());
    }
    VisitContext::from_json_str(json_text, threshold).map_err(|e| match e {
        ContextError::Parse(_) => "Invalid JSON syntax.".to_string(),
        ContextError::Validation(_) => e.to_string(),
    })
}

fn plan(session: &Session, intent: Intent, question: &str) -> Plan {
    let context = session.current_thread().and_then(|t| t.context());
    let patient_name = session.patient_name.as_deref().unwrap_or("Unknown");
    match intent {
        Intent::FullHistory if session.patient_history.is_empty() => {
            Plan::Immediate(NO_HISTORY_MESSAGE.to_string())
        }
        Intent::FullHistory => Plan::Prompt(prompt::full_history(
            patient_name,
            &session.patient_history,
            question,
        )),
        Intent::VisitComparison => match session.visit_comparison(None) {
            VisitComparison::Unavailable(reason) => Plan::Immediate(format!("❌ {reason}")),
            VisitComparison::Available(data) => Plan::Prompt(prompt::comparison(&data, question)),
        },
        Intent::GeneralQuestion => {
            Plan::Prompt(prompt::general(&session.patient_context(), question))
        }
        Intent::TreatmentPlan => Plan::Prompt(prompt::treatment_plan(context, question)),
        Intent::CaseQuestion => Plan::Prompt(prompt::case_question(
            &session.patient_context(),
            context,
            question,
        )),
    }
}

fn selection_message(name: &str, patient_id: &str, history: &[PatientVisit]) -> String {
    let mut message = format!("✅ Selected patient: {name} (ID: {patient_id})");
    if history.is_empty() {
        message.push_str("\n📋 New patient - No previous visits");
        return message;
    }
    let _ = write!(
        message,
        "\n📋 Total visits: {}\n\n📋 Recent Visits:",
        history.len()
    );
    for (i, visit) in history.iter().take(RECENT_VISITS_SHOWN).enumerate() {
        let _ = write!(
            message,
            "\n• Visit {}: {} - {} findings",
            i + 1,
            visit.timestamp.as_deref().unwrap_or("Unknown date"),
            visit.findings.len()
        );
    }
    message
}
