//! Core `TranslationProvider` trait, its error type, and provider selection.
//!
//! A provider only has to implement [`TranslationProvider::generate`]; the
//! `translate` / `translate_with_context` conveniences render the prompt
//! template, call `generate`, and run the response through
//! [`split_context`] and [`clean_markdown`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::llm::response::{clean_markdown, split_context};
use crate::llm::{OllamaProvider, OpenRouterProvider};

// ---------------------------------------------------------------------------
// ProviderError
// ---------------------------------------------------------------------------

/// Errors that can occur while generating a translation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// The backend could not be reached at all (e.g. Ollama not running).
    #[error("cannot connect to {0}")]
    Connect(String),

    /// The request did not complete within its deadline.
    #[error("generation timed out")]
    Timeout,

    /// The backend answered with an application-level failure.
    #[error("{0}")]
    Provider(String),

    /// The backend answered but produced no text.
    #[error("provider returned an empty response")]
    EmptyResponse,

    /// The request named a provider that is not registered.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
}

impl ProviderError {
    /// `true` for the routine "service not running" condition, which the UI
    /// shows as a quiet status line instead of an error dialog.
    pub fn is_connect(&self) -> bool {
        matches!(self, ProviderError::Connect(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_connect() {
            ProviderError::Connect(
                e.url()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_else(|| "provider".into()),
            )
        } else {
            ProviderError::Provider(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

/// A cleaned translation and its (possibly empty) context notes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Translation {
    pub translation: String,
    /// Empty when context was not requested or the model gave none.
    pub context: String,
}

/// Substitute `phrase` into a prompt template's `{phrase}` placeholder.
pub fn render_prompt(template: &str, phrase: &str) -> String {
    template.replace("{phrase}", phrase)
}

// ---------------------------------------------------------------------------
// TranslationProvider trait
// ---------------------------------------------------------------------------

/// Async capability over one AI backend.
///
/// Implementors must be `Send + Sync` so they can be shared across tasks
/// behind an `Arc<dyn TranslationProvider>`.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Display name, also used as the lookup key in [`ProviderSet`].
    fn name(&self) -> &str;

    /// `true` when the backend runs on this machine and needs no API key.
    fn is_local(&self) -> bool;

    /// Cheap reachability / configuration check.
    async fn is_available(&self) -> bool;

    /// Models offered by the backend, sorted; empty when unreachable.
    async fn list_models(&self) -> Vec<String>;

    /// Send `prompt` and return the raw, trimmed answer.
    ///
    /// `model = None` uses the provider's configured default.
    async fn generate(
        &self,
        prompt: &str,
        model: Option<&str>,
        timeout: Duration,
    ) -> Result<String, ProviderError>;

    /// Translation only; the returned context is always empty.
    async fn translate(
        &self,
        phrase: &str,
        template: &str,
        model: Option<&str>,
        timeout: Duration,
    ) -> Result<Translation, ProviderError> {
        let raw = self
            .generate(&render_prompt(template, phrase), model, timeout)
            .await?;
        Ok(Translation {
            translation: clean_markdown(&raw),
            context: String::new(),
        })
    }

    /// Translation plus context, split at the first context marker.
    async fn translate_with_context(
        &self,
        phrase: &str,
        template: &str,
        delimiter: &str,
        model: Option<&str>,
        timeout: Duration,
    ) -> Result<Translation, ProviderError> {
        let raw = self
            .generate(&render_prompt(template, phrase), model, timeout)
            .await?;
        let (translation, context) = split_context(&raw, delimiter);
        Ok(Translation {
            translation: clean_markdown(&translation),
            context: clean_markdown(&context),
        })
    }
}

// Compile-time assertion: Box<dyn TranslationProvider> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn TranslationProvider>) {}
};

// ---------------------------------------------------------------------------
// ProviderSet
// ---------------------------------------------------------------------------

/// The registered providers, looked up by name (case-insensitive).
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: Vec<Arc<dyn TranslationProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every built-in backend configured in `config`.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new()
            .with(Arc::new(OllamaProvider::from_config(config)))
            .with(Arc::new(OpenRouterProvider::from_config(config)))
    }

    /// Add `provider`, replacing any earlier one with the same name.
    pub fn with(mut self, provider: Arc<dyn TranslationProvider>) -> Self {
        self.providers
            .retain(|p| !p.name().eq_ignore_ascii_case(provider.name()));
        self.providers.push(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TranslationProvider>> {
        self.providers
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("providers", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
