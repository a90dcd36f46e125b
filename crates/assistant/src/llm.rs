use crate::config::LlmSettings;
use crate::error::{AssistantError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Black-box text completion service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Ollama `/api/generate` client (non-streaming).
pub struct OllamaLanguageModel {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl OllamaLanguageModel {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        // The caller bounds each call with its own timeout; this one only guards stuck sockets.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AssistantError::configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaLanguageModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        log::debug!("Calling {} with a {}-byte prompt", self.model, prompt.len());
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    AssistantError::generation(format!(
                        "cannot reach language model at {}",
                        self.base_url
                    ))
                } else {
                    AssistantError::generation(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::generation(format!(
                "language model returned {status}: {body}"
            )));
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::generation(format!("malformed response: {e}")))?;
        Ok(parsed.response)
    }
}

/// Drop an echoed prompt: keep only the text after the last `Answer:`, else after the last
/// `Response:`.
#[must_use]
pub fn strip_echo(raw: &str) -> String {
    for marker in ["Answer:", "Response:"] {
        if let Some((_, tail)) = raw.rsplit_once(marker) {
            return tail.trim().to_string();
        }
    }
    raw.trim().to_string()
}
