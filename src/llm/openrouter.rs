//! OpenRouter backend: OpenAI-compatible `/chat/completions`.
//!
//! All connection details (`openrouter_url`, `openrouter_api_key`,
//! `openrouter_model`) come from [`ProviderConfig`]; nothing is hardcoded
//! beyond the config defaults.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ProviderConfig;
use crate::llm::provider::{ProviderError, TranslationProvider};

/// Sent as `X-Title`; OpenRouter shows it in its usage dashboard.
const APP_TITLE: &str = "phrase-cards";

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Calls OpenRouter with a bearer key.
///
/// The provider reports itself available only when a non-empty API key is
/// configured; generation without a key fails before any request is sent.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    temperature: f32,
}

impl OpenRouterProvider {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.openrouter_url.trim_end_matches('/').to_string(),
            api_key: config
                .openrouter_api_key
                .clone()
                .filter(|k| !k.trim().is_empty()),
            default_model: config.openrouter_model.clone(),
            temperature: config.temperature,
        }
    }

    /// Pull a human-readable message out of an error body, falling back to
    /// the raw text.
    fn error_message(body: &str) -> String {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| body.to_string())
    }
}

#[async_trait]
impl TranslationProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "OpenRouter"
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn list_models(&self) -> Vec<String> {
        let result = async {
            let response = self
                .client
                .get(format!("{}/models", self.base_url))
                .timeout(Duration::from_secs(5))
                .send()
                .await?
                .error_for_status()?;
            response.json::<ModelsResponse>().await
        }
        .await;

        match result {
            Ok(models) => {
                let mut ids: Vec<String> = models.data.into_iter().map(|m| m.id).collect();
                ids.sort();
                ids
            }
            Err(e) => {
                log::debug!("openrouter: model listing failed: {e}");
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
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Provider("OpenRouter API key is not set".into()))?;

        let model = model
            .filter(|m| !m.is_empty())
            .unwrap_or(self.default_model.as_str());

        let body = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": self.temperature
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(key)
            .header("X-Title", APP_TITLE)
            .json(&body)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Provider(format!(
                "OpenRouter error {}: {}",
                status.as_u16(),
                Self::error_message(&text)
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Provider(format!("OpenRouter: bad response: {e}")))?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(ProviderError::EmptyResponse)?
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
