use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

#[derive(Error, Debug)]
pub enum SearchError {
    /// Embedding service or index failed; distinct from an empty result.
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] dental_vector_store::VectorStoreError),

    #[error("Empty query")]
    EmptyQuery,
}
