use crate::error::{AssistantError, Result};
use dental_protocol::DEFAULT_TOP_K;
use dental_vector_store::{EmbeddingMode, EmbeddingSettings, DEFAULT_OLLAMA_URL};
use dental_visit_context::DEFAULT_CONFIDENCE_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_LLM_MODEL: &str = "mistral:latest";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub timeout_secs: u64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            timeout_secs: 30,
        }
    }
}

/// Runtime settings: defaults, then an optional TOML file, then `DENTAL_*` environment
/// variables. Command-line flags are applied on top by the binary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub table_path: PathBuf,
    pub index_path: PathBuf,
    pub confidence_threshold: f64,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            table_path: PathBuf::from("cdt_codes.csv"),
            index_path: PathBuf::from("cdt_index.bin"),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            embedding: EmbeddingSettings::default(),
            llm: LlmSettings::default(),
            retrieval: RetrievalSettings::default(),
        }
    }
}

impl AssistantConfig {
    /// Load from `path` (if given) and the process environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AssistantError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
            .map_err(|e| AssistantError::configuration(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| AssistantError::configuration(e.to_string()))
    }

    /// Override fields from `DENTAL_*` variables resolved through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DENTAL_TABLE_PATH") {
            self.table_path = PathBuf::from(v);
        }
        if let Some(v) = get("DENTAL_INDEX_PATH") {
            self.index_path = PathBuf::from(v);
        }
        if let Some(v) = get("DENTAL_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = parse_env("DENTAL_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("DENTAL_EMBEDDING_MODE") {
            self.embedding.mode = EmbeddingMode::parse(&v)
                .map_err(|e| AssistantError::configuration(e.to_string()))?;
        }
        if let Some(v) = get("DENTAL_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Some(v) = get("DENTAL_EMBEDDING_URL") {
            self.embedding.base_url = v;
        }
        if let Some(v) = get("DENTAL_LLM_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("DENTAL_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("DENTAL_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("DENTAL_LLM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("DENTAL_TOP_K") {
            self.retrieval.top_k = parse_env("DENTAL_TOP_K", &v)?;
        }
        if let Some(v) = get("DENTAL_RETRIEVAL_TIMEOUT_SECS") {
            self.retrieval.timeout_secs = parse_env("DENTAL_RETRIEVAL_TIMEOUT_SECS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(AssistantError::configuration(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(AssistantError::configuration("retrieval.top_k must be > 0"));
        }
        if self.retrieval.timeout_secs == 0 || self.llm.timeout_secs == 0 {
            return Err(AssistantError::configuration("timeouts must be > 0"));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| AssistantError::configuration(format!("{key}={raw}: {e}")))
}
