//! Hybrid CDT code retrieval.
//!
//! Candidates come from the quantized index in `dental-vector-store`; each candidate is
//! re-scored with the exact cosine of its stored embedding and the Jaccard overlap between the
//! query tokens and the code's keywords.

mod error;
mod finding_matches;
mod retriever;
mod tokens;

pub use error::{Result, SearchError};
pub use finding_matches::{
    match_findings, FindingCodeRecord, FindingMatchReport, NO_CODE_MESSAGE, NO_FINDINGS_MESSAGE,
};
pub use retriever::{combined_score, Retriever, COSINE_WEIGHT, JACCARD_WEIGHT};
pub use tokens::{jaccard, query_tokens};
