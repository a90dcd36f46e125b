//! # Dental Assistant
//!
//! Orchestration over the code index, visit parsing and per-session threads.
//!
//! ```text
//! select_patient ──> Session (patient, history)
//! load_context   ──> VisitContext ──> match_findings ──> Thread: Loaded
//! ask            ──> IntentClassifier ──> prompt ──> LanguageModel ──> Thread turns
//! ```
//!
//! Every public operation runs under the session's lock; slow steps are bounded by the
//! configured timeouts.

mod config;
mod engine;
mod error;
mod intent;
mod llm;
mod prompt;

pub use config::{AssistantConfig, LlmSettings, RetrievalSettings, DEFAULT_LLM_MODEL};
pub use engine::{DentalAssistant, LoadOutcome, PatientSelection, Reply, ReplyStatus};
pub use error::{AssistantError, ErrorKind, Result};
pub use intent::{Intent, IntentClassifier};
pub use llm::{strip_echo, LanguageModel, OllamaLanguageModel};
