//! Per-session conversation state.
//!
//! A [`Session`] owns an ordered set of [`Thread`]s (one per case or visit) plus the bound
//! patient and their visit history. [`SessionStore`] hands out per-session async locks so
//! callers can linearize load and answer operations on one session while other sessions
//! proceed in parallel.

mod patient;
mod session;
mod store;
mod thread;

pub use patient::{
    ComparisonData, VisitComparison, VisitSummary, NOT_ENOUGH_VISITS, NO_PATIENT_FOR_COMPARISON,
};
pub use session::Session;
pub use store::{SessionHandle, SessionStore};
pub use thread::{
    LoadedContext, Thread, ThreadKind, ThreadState, DEFAULT_THREAD_ID, DEFAULT_THREAD_NAME,
};
