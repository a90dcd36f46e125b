//! # Dental Vector Store
//!
//! Embedding index over the CDT reference table.
//!
//! ## Architecture
//!
//! ```text
//! reference table (CSV)
//!     │
//!     ├──> ReferenceTable (cleaned rows, keyword sets, fingerprint)
//!     │
//!     ├──> Embedder (Ollama /api/embed or deterministic stub)
//!     │      └─> Vector[dim] per canonical code text
//!     │
//!     ├──> CodeIndex
//!     │      ├─> QuantizedIndex (int8 candidate search)
//!     │      └─> exact matrix (re-ranking)
//!     │
//!     └──> Persistent artifact (binary, atomic write)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use dental_vector_store::{CodeIndex, StubEmbedder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let embedder = StubEmbedder::new(384);
//!     let index = CodeIndex::open("cdt_codes.csv", "cdt_index.bin", &embedder).await?;
//!     println!("{} codes indexed with {}", index.len(), index.model_id());
//!     Ok(())
//! }
//! ```

mod artifact;
mod embeddings;
mod error;
mod index;
mod quantized_index;
mod table;

pub use artifact::INDEX_FORMAT_VERSION;
pub use embeddings::{
    Embedder, EmbeddingMode, EmbeddingSettings, OllamaEmbedder, StubEmbedder,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_OLLAMA_URL, STUB_DIMENSION,
};
pub use error::{Result, VectorStoreError};
pub use index::CodeIndex;
pub use quantized_index::QuantizedIndex;
pub use table::{CodeEntry, ReferenceTable};
