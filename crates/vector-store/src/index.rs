use crate::artifact::{decode_index, encode_index, write_atomic, IndexHeader};
use crate::embeddings::Embedder;
use crate::error::{Result, VectorStoreError};
use crate::quantized_index::QuantizedIndex;
use crate::table::{fingerprint_entries, CodeEntry, ReferenceTable};
use ndarray::{Array2, ArrayView1};
use std::collections::HashSet;
use std::path::Path;

/// Searchable embedding index over the billing-code reference table.
///
/// Holds two views of the same embeddings: a quantized index for fast candidate search and the
/// exact matrix (row `i` belongs to entry `i`) for re-ranking.
pub struct CodeIndex {
    entries: Vec<CodeEntry>,
    exact: Array2<f32>,
    approx: QuantizedIndex,
    model_id: String,
    fingerprint: String,
}

impl CodeIndex {
    /// Read the table at `table_path` and embed every row.
    pub async fn build(table_path: impl AsRef<Path>, embedder: &dyn Embedder) -> Result<Self> {
        let table = ReferenceTable::from_path(table_path)?;
        Self::from_table(table, embedder).await
    }

    pub async fn from_table(table: ReferenceTable, embedder: &dyn Embedder) -> Result<Self> {
        let entries = table.into_entries();
        log::info!(
            "Embedding {} reference codes with {}",
            entries.len(),
            embedder.model_id()
        );
        let texts: Vec<String> = entries.iter().map(CodeEntry::canonical_text).collect();
        let vectors = embedder.embed_batch(&texts).await?;
        Self::from_parts(embedder.model_id(), entries, vectors)
    }

    /// Assemble an index from entries and their embeddings. An empty index is allowed.
    pub fn from_parts(
        model_id: impl Into<String>,
        entries: Vec<CodeEntry>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if entries.len() != vectors.len() {
            return Err(VectorStoreError::IndexError(format!(
                "{} entries but {} embeddings",
                entries.len(),
                vectors.len()
            )));
        }
        let dimension = vectors.first().map_or(0, Vec::len);
        let mut flat = Vec::with_capacity(vectors.len() * dimension);
        for vector in &vectors {
            if vector.len() != dimension {
                return Err(VectorStoreError::InvalidDimension {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            flat.extend_from_slice(vector);
        }
        let exact = Array2::from_shape_vec((entries.len(), dimension), flat)
            .map_err(|e| VectorStoreError::IndexError(e.to_string()))?;
        Self::from_matrix(model_id.into(), entries, exact)
    }

    fn from_matrix(model_id: String, entries: Vec<CodeEntry>, exact: Array2<f32>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.code.as_str()) {
                return Err(VectorStoreError::IndexError(format!(
                    "duplicate code {} in index",
                    entry.code
                )));
            }
        }

        let mut approx = QuantizedIndex::new(exact.ncols());
        for row in exact.rows() {
            approx.add(&row.to_vec())?;
        }

        let fingerprint = fingerprint_entries(&entries);
        Ok(Self {
            entries,
            exact,
            approx,
            model_id,
            fingerprint,
        })
    }

    /// Write the index to `path` (temp file + rename).
    pub async fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        log::info!("Saving code index ({} entries) to {:?}", self.len(), path);
        let header = IndexHeader {
            model_id: self.model_id.clone(),
            dimension: self.dimension(),
            fingerprint: self.fingerprint.clone(),
            entries: self.entries.clone(),
        };
        let bytes = encode_index(&header, &self.exact)?;
        write_atomic(path, &bytes).await
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading code index from {:?}", path);
        let bytes = tokio::fs::read(path).await?;
        let (header, exact) = decode_index(&bytes)?;
        let index = Self::from_matrix(header.model_id, header.entries, exact)?;
        if index.fingerprint != header.fingerprint {
            return Err(VectorStoreError::CorruptIndex(
                "entry fingerprint does not match header".into(),
            ));
        }
        log::info!("Loaded {} indexed codes", index.len());
        Ok(index)
    }

    /// Startup entry point: reuse a compatible persisted index, otherwise build and persist.
    ///
    /// The table is always read first, so a missing or empty table fails even when a persisted
    /// index exists.
    pub async fn open(
        table_path: impl AsRef<Path>,
        index_path: impl AsRef<Path>,
        embedder: &dyn Embedder,
    ) -> Result<Self> {
        let table = ReferenceTable::from_path(table_path)?;
        let index_path = index_path.as_ref();

        if index_path.exists() {
            match Self::load(index_path).await {
                Ok(index)
                    if index.model_id == embedder.model_id()
                        && index.fingerprint == table.fingerprint() =>
                {
                    return Ok(index);
                }
                Ok(_) => log::info!(
                    "Persisted index at {:?} is stale (model or table changed); rebuilding",
                    index_path
                ),
                Err(err) => log::warn!("Ignoring unreadable index at {:?}: {err}", index_path),
            }
        } else {
            log::info!("No persisted index at {:?}; building", index_path);
        }

        let index = Self::from_table(table, embedder).await?;
        index.persist(index_path).await?;
        Ok(index)
    }

    /// Candidate search over the quantized vectors.
    pub fn approximate_search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        self.approx.search(query, k)
    }

    /// Exact cosine similarity between `query` and the stored embedding of entry `idx`.
    #[must_use]
    pub fn exact_cosine(&self, idx: usize, query: &[f32]) -> f32 {
        if idx >= self.len() || query.len() != self.dimension() {
            return 0.0;
        }
        let row = self.exact.row(idx);
        let query = ArrayView1::from(query);
        let norm_row = row.dot(&row).sqrt();
        let norm_query = query.dot(&query).sqrt();
        if norm_row == 0.0 || norm_query == 0.0 {
            return 0.0;
        }
        row.dot(&query) / (norm_row * norm_query)
    }

    #[must_use]
    pub fn entry(&self, idx: usize) -> Option<&CodeEntry> {
        self.entries.get(idx)
    }

    #[must_use]
    pub fn entries(&self) -> &[CodeEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.exact.ncols()
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
