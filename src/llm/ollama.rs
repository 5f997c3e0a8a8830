//! Local Ollama backend (`/api/tags`, `/api/generate`).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::llm::provider::{ProviderError, TranslationProvider};

/// Timeout for the availability probe and model listing.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// Talks to an Ollama server, by default `http://localhost:11434`.
///
/// Connection failures map to [`ProviderError::Connect`] so the UI can show
/// "Ollama unavailable" instead of an error dialog.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: default_model.into(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(&config.ollama_url, &config.ollama_model)
    }

    async fn tags(&self) -> Result<Vec<String>, reqwest::Error> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        let tags: TagsResponse = response.json().await?;
        let mut names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();
        names.sort();
        Ok(names)
    }
}

#[async_trait]
impl TranslationProvider for OllamaProvider {
    fn name(&self) -> &str {
        "Ollama"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn is_available(&self) -> bool {
        self.tags().await.is_ok()
    }

    async fn list_models(&self) -> Vec<String> {
        match self.tags().await {
            Ok(models) => models,
            Err(e) => {
                log::debug!("ollama: model listing failed: {e}");
                Vec::new()
            }
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        model: Option<&str>,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let model = model.filter(|m| !m.is_empty()).unwrap_or(self.default_model.as_str());

        let body = serde_json::json!({
            "model":  model,
            "prompt": prompt,
            "stream": false
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| match ProviderError::from(e) {
                ProviderError::Connect(_) => ProviderError::Connect("Ollama".into()),
                other => other,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error)
                .unwrap_or(text);
            return Err(ProviderError::Provider(format!(
                "Ollama error {status}: {message}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Provider(format!("Ollama: bad response: {e}")))?;

        let text = parsed.response.trim().to_string();
        if text.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let p = OllamaProvider::new("http://localhost:11434/", "gemma3:1b");
        assert_eq!(p.base_url, "http://localhost:11434");
        assert!(p.is_local());
        assert_eq!(p.name(), "Ollama");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connect_error() {
        // Port 9 (discard) is closed on test machines; the connect fails fast.
        let p = OllamaProvider::new("http://127.0.0.1:9", "m");
        let err = p
            .generate("hi", None, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.is_connect(), "expected connect error, got {err:?}");
        assert!(p.list_models().await.is_empty());
        assert!(!p.is_available().await);
    }
}
