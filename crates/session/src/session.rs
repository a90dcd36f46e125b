use crate::patient::{patient_context, visit_comparison, VisitComparison};
use crate::thread::{Thread, ThreadKind, DEFAULT_THREAD_ID};
use dental_protocol::PatientVisit;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user container of threads and patient history.
///
/// Threads are kept in creation order. Every mutating operation first reseeds the `default`
/// thread when the session has none, so a session observed through [`crate::SessionStore`]
/// always has a current thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    threads: Vec<Thread>,
    current_thread_id: Option<String>,
    next_thread_seq: u64,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub patient_history: Vec<PatientVisit>,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let mut session = Self {
            id: id.into(),
            threads: Vec::new(),
            current_thread_id: None,
            next_thread_seq: 1,
            patient_id: None,
            patient_name: None,
            patient_history: Vec::new(),
        };
        session.ensure_default();
        session
    }

    pub(crate) fn ensure_default(&mut self) {
        if self.threads.is_empty() {
            log::debug!("Seeding default thread for session {}", self.id);
            self.threads.push(Thread::default_case());
            self.current_thread_id = Some(DEFAULT_THREAD_ID.to_string());
        }
    }

    #[must_use]
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    #[must_use]
    pub fn current_thread_id(&self) -> Option<&str> {
        self.current_thread_id.as_deref()
    }

    #[must_use]
    pub fn thread(&self, id: &str) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn current_thread(&self) -> Option<&Thread> {
        self.current_thread_id.as_deref().and_then(|id| self.thread(id))
    }

    /// Current thread, reseeding `default` first if the session was emptied.
    pub fn current_thread_mut(&mut self) -> &mut Thread {
        self.ensure_default();
        let idx = self
            .current_thread_id
            .as_deref()
            .and_then(|id| self.threads.iter().position(|t| t.id == id))
            .unwrap_or(0);
        self.current_thread_id = Some(self.threads[idx].id.clone());
        &mut self.threads[idx]
    }

    /// Bind the session to a patient, replacing any previous binding, and relabel the current
    /// thread as that patient's current visit. Returns the number of prior visits.
    pub fn set_current_patient(
        &mut self,
        patient_id: impl Into<String>,
        name: impl Into<String>,
        history: Vec<PatientVisit>,
    ) -> usize {
        let patient_id = patient_id.into();
        let name = name.into();

        let thread = self.current_thread_mut();
        thread.kind = ThreadKind::Visit;
        thread.name = format!("Visit: {name} - Current Visit");
        thread.patient_id = Some(patient_id.clone());
        thread.visit_id = Some(Uuid::new_v4().to_string());

        self.patient_id = Some(patient_id);
        self.patient_name = Some(name);
        self.patient_history = history;
        self.patient_history.len()
    }

    /// Create a thread and make it current. Ids are `thread_{n}` and never reused.
    pub fn create_thread(&mut self, name: &str, kind: ThreadKind) -> String {
        self.ensure_default();
        let id = format!("thread_{}", self.next_thread_seq);
        self.next_thread_seq += 1;

        let mut thread = Thread::new(id.clone(), kind.display_name(name), kind);
        thread.patient_id = self.patient_id.clone();
        if kind == ThreadKind::Visit {
            thread.visit_id = Some(Uuid::new_v4().to_string());
        }
        self.threads.push(thread);
        self.current_thread_id = Some(id.clone());
        id
    }

    /// Unknown ids leave the current thread unchanged.
    pub fn switch_thread(&mut self, id: &str) -> bool {
        self.ensure_default();
        if self.thread(id).is_none() {
            return false;
        }
        self.current_thread_id = Some(id.to_string());
        true
    }

    /// Remove a thread. When it was current, `default` takes over if present, then the oldest
    /// remaining thread, then nothing until the next access reseeds `default`.
    pub fn clear_thread(&mut self, id: &str) -> bool {
        let Some(pos) = self.threads.iter().position(|t| t.id == id) else {
            return false;
        };
        self.threads.remove(pos);
        if self.current_thread_id.as_deref() == Some(id) {
            self.current_thread_id = if self.thread(DEFAULT_THREAD_ID).is_some() {
                Some(DEFAULT_THREAD_ID.to_string())
            } else {
                self.threads.first().map(|t| t.id.clone())
            };
        }
        true
    }

    /// `(id, display name)` pairs in creation order.
    #[must_use]
    pub fn thread_list(&self) -> Vec<(String, String)> {
        self.threads
            .iter()
            .map(|t| (t.id.clone(), t.name.clone()))
            .collect()
    }

    #[must_use]
    pub fn patient_context(&self) -> String {
        patient_context(
            self.patient_id.as_deref(),
            self.patient_name.as_deref().unwrap_or_default(),
            &self.patient_history,
        )
    }

    #[must_use]
    pub fn visit_comparison(&self, visit_ids: Option<&[String]>) -> VisitComparison {
        visit_comparison(
            self.patient_id.as_deref(),
            self.patient_name.as_deref().unwrap_or_default(),
            &self.patient_history,
            visit_ids,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn new_session_has_default_thread() {
        let session = Session::new("s1");
        assert_eq!(session.current_thread_id(), Some("default"));
        let thread = session.current_thread().unwrap();
        assert_eq!(thread.name, "Default Case");
        assert_eq!(thread.kind, ThreadKind::Scenario);
        assert!(thread.visit_id.is_none());
    }

    #[test]
    fn created_threads_become_current_with_unique_ids() {
        let mut session = Session::new("s1");
        let a = session.create_thread("What if", ThreadKind::Scenario);
        let b = session.create_thread("Jan", ThreadKind::Visit);
        assert_eq!((a.as_str(), b.as_str()), ("thread_1", "thread_2"));
        assert_eq!(session.current_thread_id(), Some("thread_2"));
        assert!(session.thread(&a).unwrap().visit_id.is_none());
        assert!(session.thread(&b).unwrap().visit_id.is_some());
        assert_eq!(session.thread(&b).unwrap().name, "Visit: Jan");

        session.clear_thread(&b);
        let c = session.create_thread("again", ThreadKind::Scenario);
        assert_eq!(c, "thread_3");
    }

    #[test]
    fn switching_to_unknown_thread_is_a_no_op() {
        let mut session = Session::new("s1");
        let id = session.create_thread("x", ThreadKind::Scenario);
        assert!(!session.switch_thread("missing"));
        assert_eq!(session.current_thread_id(), Some(id.as_str()));
        assert!(session.switch_thread("default"));
        assert_eq!(session.current_thread_id(), Some("default"));
    }

    #[test]
    fn clearing_current_thread_falls_back() {
        let mut session = Session::new("s1");
        let a = session.create_thread("a", ThreadKind::Scenario);
        session.clear_thread(&a);
        assert_eq!(session.current_thread_id(), Some("default"));

        let b = session.create_thread("b", ThreadKind::Scenario);
        let c = session.create_thread("c", ThreadKind::Scenario);
        session.clear_thread("default");
        assert_eq!(session.current_thread_id(), Some(c.as_str()));
        session.clear_thread(&c);
        assert_eq!(session.current_thread_id(), Some(b.as_str()));
        session.clear_thread(&b);
        assert_eq!(session.current_thread_id(), None);
        assert!(session.threads().is_empty());

        assert_eq!(session.current_thread_mut().id, "default");
        assert_eq!(session.current_thread_id(), Some("default"));
    }

    #[test]
    fn patient_binding_overwrites_and_relabels_current_thread() {
        let mut session = Session::new("s1");
        session.create_thread("scratch", ThreadKind::Scenario);
        let count = session.set_current_patient(
            "jane_doe",
            "Jane Doe",
            vec![PatientVisit::default(), PatientVisit::default()],
        );
        assert_eq!(count, 2);
        let thread = session.current_thread().unwrap();
        assert_eq!(thread.name, "Visit: Jane Doe - Current Visit");
        assert_eq!(thread.kind, ThreadKind::Visit);
        assert_eq!(thread.patient_id.as_deref(), Some("jane_doe"));
        assert!(thread.visit_id.is_some());

        session.set_current_patient("john", "John", Vec::new());
        assert_eq!(session.patient_name.as_deref(), Some("John"));
        assert!(session.patient_history.is_empty());

        let visit = session.create_thread("follow-up", ThreadKind::Visit);
        assert_eq!(
            session.thread(&visit).unwrap().patient_id.as_deref(),
            Some("john")
        );
    }
}
