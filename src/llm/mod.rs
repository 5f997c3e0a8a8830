//! Translation providers for phrase-cards.
//!
//! This module provides:
//! * [`TranslationProvider`]: async trait implemented by all AI backends.
//! * [`OllamaProvider`]: local Ollama server.
//! * [`OpenRouterProvider`]: OpenRouter's OpenAI-compatible API.
//! * [`ProviderSet`]: the registered backends, looked up by name.
//! * [`split_context`] / [`clean_markdown`]: response post-processing.
//! * [`ProviderError`]: error variants for provider operations.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use phrase_cards::config::AppConfig;
//! use phrase_cards::llm::{ProviderSet, TranslationProvider};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let providers = ProviderSet::from_config(&config.provider);
//!     let ollama = providers.get("Ollama").unwrap();
//!
//!     let result = ollama
//!         .translate_with_context(
//!             "Guten Morgen",
//!             &config.prompts.context,
//!             &config.prompts.delimiter,
//!             None,
//!             config.provider.timeout(),
//!         )
//!         .await
//!         .unwrap();
//!     println!("{} / {}", result.translation, result.context);
//! }
//! ```

pub mod ollama;
pub mod openrouter;
pub mod provider;
pub mod response;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use ollama::OllamaProvider;
pub use openrouter::OpenRouterProvider;
pub use provider::{render_prompt, ProviderError, ProviderSet, Translation, TranslationProvider};
pub use response::{clean_markdown, split_context};
