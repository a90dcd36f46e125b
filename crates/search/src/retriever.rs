use crate::error::{Result, SearchError};
use crate::tokens::{jaccard, query_tokens};
use dental_protocol::CodeMatch;
use dental_vector_store::{CodeIndex, Embedder};
use std::sync::Arc;

pub const COSINE_WEIGHT: f32 = 0.7;
pub const JACCARD_WEIGHT: f32 = 0.3;

/// Hybrid code retrieval: quantized nearest-neighbour candidates re-ranked by
/// `0.7 * exact cosine + 0.3 * keyword Jaccard`.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<CodeIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    #[must_use]
    pub fn new(index: Arc<CodeIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    #[must_use]
    pub fn index(&self) -> &CodeIndex {
        &self.index
    }

    /// Return at most `k` codes for `query`, best first.
    ///
    /// An empty index or `k == 0` yields an empty list without calling the embedding service.
    /// Embedding failures surface as [`SearchError::Retrieval`], never as an empty list.
    pub async fn retrieve_best_match(&self, query: &str, k: usize) -> Result<Vec<CodeMatch>> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        if k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        log::debug!("Retrieving top {k} codes for '{query}'");
        let embedding = self.embedder.embed(query).await?;
        let candidates = self.index.approximate_search(&embedding, k)?;
        let tokens = query_tokens(query);

        let mut matches: Vec<CodeMatch> = candidates
            .into_iter()
            .filter_map(|(idx, _)| {
                let entry = self.index.entry(idx)?;
                let cosine = self.index.exact_cosine(idx, &embedding);
                let jaccard = jaccard(&tokens, &entry.keywords);
                Some(CodeMatch {
                    code: entry.code.clone(),
                    description: entry.description.clone(),
                    cosine,
                    jaccard,
                    score: combined_score(cosine, jaccard),
                })
            })
            .collect();

        // sort_by is stable: equal scores keep candidate order.
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(k);

        if let Some(best) = matches.first() {
            log::debug!("Best match {} (score {:.3})", best.code, best.score);
        }
        Ok(matches)
    }
}

#[must_use]
pub fn combined_score(cosine: f32, jaccard: f32) -> f32 {
    COSINE_WEIGHT.mul_add(cosine, JACCARD_WEIGHT * jaccard)
}
