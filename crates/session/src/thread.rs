use dental_protocol::{ChatTurn, Finding, Speaker};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_THREAD_ID: &str = "default";
pub const DEFAULT_THREAD_NAME: &str = "Default Case";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadKind {
    Scenario,
    Visit,
}

impl ThreadKind {
    #[must_use]
    pub fn display_name(self, name: &str) -> String {
        match self {
            Self::Scenario => format!("Scenario: {name}"),
            Self::Visit => format!("Visit: {name}"),
        }
    }
}

impl fmt::Display for ThreadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scenario => "scenario",
            Self::Visit => "visit",
        })
    }
}

/// Case context committed by one JSON load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedContext {
    /// Full-text rendering of the visit.
    pub json_context: String,
    /// Visit JSON exactly as it was loaded.
    pub json_text: String,
    pub findings: Vec<Finding>,
    /// Rendered per-finding code matches.
    pub cdt_matches: String,
    pub anomaly_summary: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ThreadState {
    #[default]
    Empty,
    Loaded(Box<LoadedContext>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub name: String,
    pub kind: ThreadKind,
    pub state: ThreadState,
    pub chat_history: Vec<ChatTurn>,
    pub patient_id: Option<String>,
    pub visit_id: Option<String>,
}

impl Thread {
    pub(crate) fn new(id: impl Into<String>, name: impl Into<String>, kind: ThreadKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            state: ThreadState::Empty,
            chat_history: Vec::new(),
            patient_id: None,
            visit_id: None,
        }
    }

    pub(crate) fn default_case() -> Self {
        Self::new(DEFAULT_THREAD_ID, DEFAULT_THREAD_NAME, ThreadKind::Scenario)
    }

    #[must_use]
    pub fn context(&self) -> Option<&LoadedContext> {
        match &self.state {
            ThreadState::Empty => None,
            ThreadState::Loaded(context) => Some(context),
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.state, ThreadState::Loaded(_))
    }

    /// Replace the whole context at once.
    pub fn load(&mut self, context: LoadedContext) {
        self.state = ThreadState::Loaded(Box::new(context));
    }

    pub fn push_turn(&mut self, speaker: Speaker, message: impl Into<String>) {
        self.chat_history.push(ChatTurn::new(speaker, message));
    }
}
