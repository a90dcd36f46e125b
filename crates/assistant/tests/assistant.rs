use async_trait::async_trait;
use dental_assistant::{
    AssistantConfig, AssistantError, DentalAssistant, ErrorKind, Intent, LanguageModel,
    LoadOutcome, PatientSelection, ReplyStatus,
};
use dental_protocol::{Finding, PatientVisit, Speaker, ToothId};
use dental_search::Retriever;
use dental_session::{SessionStore, NOT_ENOUGH_VISITS};
use dental_vector_store::{
    CodeEntry, CodeIndex, Embedder, EmbeddingMode, ReferenceTable, StubEmbedder,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const TABLE: &str = "\
Code,Description,Keywords
D2140,\"Amalgam restoration, one surface\",\"caries, amalgam, restoration\"
D4341,Periodontal scaling and root planing,\"bone loss, periodontal, scaling\"
D7140,Extraction of erupted tooth,\"extraction, fracture\"
";

const LEGACY_VISIT: &str = r#"{
    "image": {"path": "pano.png", "width": 2048, "height": 1024},
    "teeth": [
        {"number": 14, "anomalies": [
            {"description": "Caries distal", "metadata": {"confidence": 0.91, "surface": "D"}}
        ], "procedures": ["Filling"]},
        {"number": 3, "anomalies": [{"description": "Bone loss", "metadata": {"confidence": 0.6}}]}
    ]
}"#;

/// Replies with a fixed text and counts calls.
struct ScriptedModel {
    reply: String,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> dental_assistant::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{prompt}\n{}", self.reply))
    }
}

struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    fn model_id(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _prompt: &str) -> dental_assistant::Result<String> {
        Err(AssistantError::generation("service unavailable"))
    }
}

struct HangingModel;

#[async_trait]
impl LanguageModel for HangingModel {
    fn model_id(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _prompt: &str) -> dental_assistant::Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

/// Same vectors as the stub embedder, but every query embedding hangs.
struct HangingEmbedder(StubEmbedder);

#[async_trait]
impl Embedder for HangingEmbedder {
    fn model_id(&self) -> &str {
        self.0.model_id()
    }

    async fn embed_batch(&self, texts: &[String]) -> dental_vector_store::Result<Vec<Vec<f32>>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        self.0.embed_batch(texts).await
    }
}

fn config(dir: &TempDir) -> AssistantConfig {
    let table_path = dir.path().join("cdt_codes.csv");
    std::fs::write(&table_path, TABLE).unwrap();
    let mut config = AssistantConfig {
        table_path,
        index_path: dir.path().join("cdt_index.bin"),
        ..AssistantConfig::default()
    };
    config.embedding.mode = EmbeddingMode::Stub;
    config.retrieval.top_k = 2;
    config.llm.timeout_secs = 5;
    config.retrieval.timeout_secs = 5;
    config
}

async fn assistant(dir: &TempDir, llm: Arc<dyn LanguageModel>) -> DentalAssistant {
    let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder::new(64));
    DentalAssistant::start_with(config(dir), embedder, llm)
        .await
        .unwrap()
}

fn visit(date: &str, teeth: &[u32]) -> PatientVisit {
    PatientVisit {
        timestamp: Some(date.to_string()),
        findings: teeth
            .iter()
            .map(|t| Finding {
                tooth: ToothId::Number(*t),
                description: "Caries".into(),
                metadata: BTreeMap::new(),
            })
            .collect(),
        ..PatientVisit::default()
    }
}

#[tokio::test]
async fn load_then_ask_records_turns_in_order() {
    let dir = TempDir::new().unwrap();
    let model = ScriptedModel::new("Answer: Restore tooth 14 with D2140.");
    let assistant = assistant(&dir, model.clone()).await;

    let outcome = assistant.load_context("s1", LEGACY_VISIT).await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Loaded {
            thread_id: "default".into(),
            findings: 2
        }
    );

    let reply = assistant
        .ask("s1", "Create treatment plan for this case")
        .await
        .unwrap();
    assert_eq!(reply.intent, Some(Intent::TreatmentPlan));
    assert_eq!(reply.status, ReplyStatus::Answered);
    assert_eq!(reply.answer, "Restore tooth 14 with D2140.");
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);

    let session = assistant.sessions().get_session("s1").await;
    let thread = session.current_thread().unwrap();
    let context = thread.context().unwrap();
    assert!(context.json_context.contains("Tooth 14:"));
    assert!(context.cdt_matches.contains("Finding: Tooth 14: Caries distal"));
    assert!(context.anomaly_summary.contains("Total anomalies: 2"));

    let speakers: Vec<Speaker> = thread.chat_history.iter().map(|t| t.speaker).collect();
    assert_eq!(
        speakers,
        vec![Speaker::System, Speaker::User, Speaker::Assistant]
    );
    assert!(thread.chat_history[0]
        .message
        .contains("Found 2 anomalies with metadata."));
}

#[tokio::test]
async fn invalid_json_is_rejected_and_recorded() {
    let dir = TempDir::new().unwrap();
    let assistant = assistant(&dir, ScriptedModel::new("unused")).await;

    let outcome = assistant.load_context("s1", "{not json").await.unwrap();
    assert_eq!(
        outcome,
        LoadOutcome::Rejected {
            reason: "Invalid JSON syntax.".into()
        }
    );

    let session = assistant.sessions().get_session("s1").await;
    let thread = session.current_thread().unwrap();
    assert!(!thread.is_loaded());
    assert_eq!(thread.chat_history.len(), 1);
    assert_eq!(thread.chat_history[0].speaker, Speaker::Error);
    assert_eq!(thread.chat_history[0].message, "⚠️ Invalid JSON syntax.");
}

#[tokio::test]
async fn visit_without_metadata_loads_with_placeholder_matches() {
    let dir = TempDir::new().unwrap();
    let assistant = assistant(&dir, ScriptedModel::new("unused")).await;

    let raw = r#"{"teeth": [{"number": 2, "anomalies": [{"description": "Stain"}]}]}"#;
    let outcome = assistant.load_context("s1", raw).await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Loaded { findings: 0, .. }));

    let session = assistant.sessions().get_session("s1").await;
    let thread = session.current_thread().unwrap();
    assert_eq!(thread.context().unwrap().cdt_matches, "No anomalies with metadata.");
    assert!(thread.chat_history[0]
        .message
        .ends_with("No anomalies with metadata found."));
}

#[tokio::test]
async fn model_failure_degrades_instead_of_failing() {
    let dir = TempDir::new().unwrap();
    let assistant = assistant(&dir, Arc::new(FailingModel)).await;

    let reply = assistant.ask("s1", "Is tooth 14 urgent?").await.unwrap();
    assert_eq!(reply.intent, Some(Intent::CaseQuestion));
    assert_eq!(reply.status, ReplyStatus::Degraded(ErrorKind::Generation));
    assert!(reply.is_degraded());
    assert!(reply
        .answer
        .starts_with("⚠️ Error processing your question:"));

    let session = assistant.sessions().get_session("s1").await;
    let history = &session.current_thread().unwrap().chat_history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].message, reply.answer);
}

#[tokio::test]
async fn comparison_without_enough_visits_skips_the_model() {
    let dir = TempDir::new().unwrap();
    let model = ScriptedModel::new("unused");
    let assistant = assistant(&dir, model.clone()).await;

    assistant
        .select_patient("s1", "Jane Doe", vec![visit("2024-01-02", &[14])])
        .await
        .unwrap();
    let reply = assistant.ask("s1", "Compare visits please").await.unwrap();
    assert_eq!(reply.intent, Some(Intent::VisitComparison));
    assert_eq!(reply.answer, format!("❌ {NOT_ENOUGH_VISITS}"));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn comparison_with_history_calls_the_model() {
    let dir = TempDir::new().unwrap();
    let model = ScriptedModel::new("Response: Tooth 14 progressed.");
    let assistant = assistant(&dir, model.clone()).await;

    let selection = assistant
        .select_patient(
            "s1",
            "  Jane Doe ",
            vec![visit("2024-01-02", &[14]), visit("2024-06-02", &[14, 3])],
        )
        .await
        .unwrap();
    let PatientSelection::Selected {
        patient_id,
        visit_count,
        ..
    } = selection
    else {
        panic!("patient should be selected: {selection:?}");
    };
    assert_eq!(patient_id, "jane_doe");
    assert_eq!(visit_count, 2);

    let reply = assistant.ask("s1", "Show progression").await.unwrap();
    assert_eq!(reply.answer, "Tooth 14 progressed.");
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn full_history_without_visits_answers_directly() {
    let dir = TempDir::new().unwrap();
    let model = ScriptedModel::new("unused");
    let assistant = assistant(&dir, model.clone()).await;

    let reply = assistant.ask("s1", "Give me the full history").await.unwrap();
    assert_eq!(reply.intent, Some(Intent::FullHistory));
    assert_eq!(reply.answer, "No past visit data available.");
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn general_questions_only_without_a_case() {
    let dir = TempDir::new().unwrap();
    let assistant = assistant(&dir, ScriptedModel::new("Response: A crown caps a tooth.")).await;

    let reply = assistant.ask("s1", "What is a crown?").await.unwrap();
    assert_eq!(reply.intent, Some(Intent::GeneralQuestion));
    assert_eq!(reply.answer, "A crown caps a tooth.");

    assistant.load_context("s1", LEGACY_VISIT).await.unwrap();
    let reply = assistant.ask("s1", "What is on tooth 14?").await.unwrap();
    assert_eq!(reply.intent, Some(Intent::CaseQuestion));
}

#[tokio::test]
async fn blank_inputs_are_recorded_as_error_turns() {
    let dir = TempDir::new().unwrap();
    let model = ScriptedModel::new("unused");
    let assistant = assistant(&dir, model.clone()).await;

    let selection = assistant.select_patient("s1", "   ", Vec::new()).await.unwrap();
    assert_eq!(
        selection,
        PatientSelection::Rejected {
            reason: "Please enter a patient name or ID".into()
        }
    );

    let reply = assistant.ask("s1", " \n ").await.unwrap();
    assert_eq!(reply.answer, "⚠️ Please enter a question");
    assert_eq!(reply.intent, None);
    assert_eq!(reply.status, ReplyStatus::Degraded(ErrorKind::Validation));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);

    let session = assistant.sessions().get_session("s1").await;
    assert!(session.patient_id.is_none());
    let turns: Vec<(Speaker, &str)> = session
        .current_thread()
        .unwrap()
        .chat_history
        .iter()
        .map(|t| (t.speaker, t.message.as_str()))
        .collect();
    assert_eq!(
        turns,
        vec![
            (Speaker::Error, "⚠️ Please enter a patient name or ID"),
            (Speaker::Error, "⚠️ Please enter a question"),
        ]
    );
}

#[tokio::test]
async fn sessions_do_not_share_threads() {
    let dir = TempDir::new().unwrap();
    let assistant = assistant(&dir, ScriptedModel::new("Answer: ok")).await;

    assistant.load_context("a", LEGACY_VISIT).await.unwrap();
    let b = assistant.sessions().get_session("b").await;
    assert!(!b.current_thread().unwrap().is_loaded());
    assert!(b.current_thread().unwrap().chat_history.is_empty());
}

#[tokio::test]
async fn slow_model_times_out_and_degrades() {
    let dir = TempDir::new().unwrap();
    let assistant = assistant(&dir, Arc::new(HangingModel)).await;

    tokio::time::pause();
    let reply = assistant.ask("s1", "Is tooth 14 urgent?").await.unwrap();
    assert_eq!(reply.status, ReplyStatus::Degraded(ErrorKind::Timeout));
    assert!(reply.answer.contains("timed out after 5s"));
}

#[tokio::test]
async fn retrieval_timeout_is_recorded_without_loading() {
    let dir = TempDir::new().unwrap();
    let stub = StubEmbedder::new(32);
    let table = ReferenceTable::from_entries(vec![CodeEntry::new(
        "D2140",
        "Amalgam restoration, one surface",
        "caries, amalgam, restoration",
    )]);
    let index = CodeIndex::from_table(table, &stub).await.unwrap();
    let retriever = Retriever::new(Arc::new(index), Arc::new(HangingEmbedder(stub)));
    let assistant = DentalAssistant::new(
        config(&dir),
        retriever,
        ScriptedModel::new("unused"),
        Arc::new(SessionStore::new()),
    );

    tokio::time::pause();
    let err = assistant.load_context("s1", LEGACY_VISIT).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let session = assistant.sessions().get_session("s1").await;
    let thread = session.current_thread().unwrap();
    assert!(!thread.is_loaded());
    assert_eq!(thread.chat_history.len(), 1);
    assert_eq!(thread.chat_history[0].speaker, Speaker::Error);
    assert_eq!(
        thread.chat_history[0].message,
        "⚠️ retrieval timed out after 5s"
    );
}

#[tokio::test]
async fn dropped_load_leaves_the_thread_untouched() {
    let dir = TempDir::new().unwrap();
    let stub = StubEmbedder::new(32);
    let index = CodeIndex::from_table(
        ReferenceTable::from_entries(vec![CodeEntry::new("D2140", "Amalgam", "caries")]),
        &stub,
    )
    .await
    .unwrap();
    let retriever = Retriever::new(Arc::new(index), Arc::new(HangingEmbedder(stub)));
    let assistant = DentalAssistant::new(
        config(&dir),
        retriever,
        ScriptedModel::new("unused"),
        Arc::new(SessionStore::new()),
    );

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        assistant.load_context("s1", LEGACY_VISIT),
    )
    .await;
    assert!(abandoned.is_err());

    // The session lock was released with the dropped future.
    let session = assistant.sessions().get_session("s1").await;
    assert!(!session.current_thread().unwrap().is_loaded());
    assert!(session.current_thread().unwrap().chat_history.is_empty());
}
