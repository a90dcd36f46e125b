use crate::patient::VisitComparison;
use crate::session::Session;
use crate::thread::ThreadKind;
use dashmap::DashMap;
use dental_protocol::PatientVisit;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub type SessionHandle = Arc<Mutex<Session>>;

/// Concurrency-safe keyed session store.
///
/// The map shard lock is held only while a handle is fetched or inserted; all session work
/// happens under that session's own async mutex, so distinct sessions never contend.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `session_id`, creating the session on first reference.
    pub fn handle(&self, session_id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.get(session_id) {
            return Arc::clone(handle.value());
        }
        Arc::clone(
            self.sessions
                .entry(session_id.to_string())
                .or_insert_with(|| {
                    log::debug!("Creating session {session_id}");
                    Arc::new(Mutex::new(Session::new(session_id)))
                })
                .value(),
        )
    }

    /// Exclusive access to a session for as long as the guard lives.
    pub async fn lock(&self, session_id: &str) -> OwnedMutexGuard<Session> {
        let mut guard = self.handle(session_id).lock_owned().await;
        guard.ensure_default();
        guard
    }

    pub async fn with_session<R>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut guard = self.lock(session_id).await;
        f(&mut guard)
    }

    /// Snapshot of the session, creating it if absent.
    pub async fn get_session(&self, session_id: &str) -> Session {
        self.lock(session_id).await.clone()
    }

    pub async fn set_current_patient(
        &self,
        session_id: &str,
        patient_id: &str,
        name: &str,
        history: Vec<PatientVisit>,
    ) -> usize {
        self.with_session(session_id, |s| s.set_current_patient(patient_id, name, history))
            .await
    }

    pub async fn create_thread(&self, session_id: &str, name: &str, kind: ThreadKind) -> String {
        self.with_session(session_id, |s| s.create_thread(name, kind))
            .await
    }

    pub async fn switch_thread(&self, session_id: &str, thread_id: &str) -> bool {
        self.with_session(session_id, |s| s.switch_thread(thread_id))
            .await
    }

    pub async fn clear_thread(&self, session_id: &str, thread_id: &str) -> bool {
        self.with_session(session_id, |s| s.clear_thread(thread_id))
            .await
    }

    pub async fn thread_list(&self, session_id: &str) -> Vec<(String, String)> {
        self.with_session(session_id, |s| s.thread_list()).await
    }

    pub async fn get_patient_context(&self, session_id: &str) -> String {
        self.with_session(session_id, |s| s.patient_context()).await
    }

    pub async fn get_visit_comparison_data(
        &self,
        session_id: &str,
        visit_ids: Option<&[String]>,
    ) -> VisitComparison {
        self.with_session(session_id, |s| s.visit_comparison(visit_ids))
            .await
    }

    /// Drop a session entirely. In-flight holders of its handle keep their copy alive.
    pub fn clear_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).is_some();
        if removed {
            log::debug!("Cleared session {session_id}");
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
