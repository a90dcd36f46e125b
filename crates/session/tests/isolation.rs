use dental_protocol::{PatientVisit, Speaker};
use dental_session::{LoadedContext, SessionStore, ThreadKind, VisitComparison};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn context(text: &str) -> LoadedContext {
    LoadedContext {
        json_context: text.to_string(),
        json_text: r#"{"teeth": []}"#.to_string(),
        findings: Vec::new(),
        cdt_matches: String::new(),
        anomaly_summary: String::new(),
    }
}

#[tokio::test]
async fn mutating_one_session_leaves_another_untouched() {
    let store = SessionStore::new();
    let before = store.get_session("b").await;

    store
        .with_session("a", |s| {
            s.current_thread_mut().load(context("loaded"));
            s.current_thread_mut().push_turn(Speaker::System, "hello");
        })
        .await;
    store.create_thread("a", "What if", ThreadKind::Scenario).await;
    store
        .set_current_patient("a", "jane_doe", "Jane Doe", vec![PatientVisit::default()])
        .await;

    assert_eq!(store.get_session("b").await, before);
    assert_eq!(store.thread_list("a").await.len(), 2);
}

#[tokio::test]
async fn comparison_outcomes_through_the_store() {
    let store = SessionStore::new();
    assert_eq!(
        store.get_visit_comparison_data("s", None).await,
        VisitComparison::Unavailable("No patient selected for comparison.".into())
    );
    store
        .set_current_patient("s", "p", "P", vec![PatientVisit::default()])
        .await;
    assert_eq!(
        store.get_visit_comparison_data("s", None).await,
        VisitComparison::Unavailable("Need at least 2 visits for comparison.".into())
    );
    assert_eq!(
        store.get_patient_context("s").await,
        "Patient: P - 1 previous visits\n\n--- Visit 1 (Unknown date) ---"
    );
}

/// Concurrent writers on one session are serialized; none of their turns are lost.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_turns_on_one_session_are_not_lost() {
    let store = Arc::new(SessionStore::new());
    let mut tasks = Vec::new();
    for i in 0..32 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            let mut guard = store.lock("shared").await;
            tokio::task::yield_now().await;
            guard
                .current_thread_mut()
                .push_turn(Speaker::User, format!("question {i}"));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let session = store.get_session("shared").await;
    assert_eq!(session.current_thread().unwrap().chat_history.len(), 32);
}
