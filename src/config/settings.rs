//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a hand-edited file that only sets a
//! few keys still loads.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ProviderKind
// ---------------------------------------------------------------------------

/// Selects which AI backend produces translations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Ollama running locally; no authentication required.
    Ollama,
    /// OpenRouter (OpenAI-compatible chat completions, bearer key).
    OpenRouter,
}

impl ProviderKind {
    /// Display name; matches `TranslationProvider::name` of the backend.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "Ollama",
            ProviderKind::OpenRouter => "OpenRouter",
        }
    }
}

impl Default for ProviderKind {
    fn default() -> Self {
        Self::Ollama
    }
}

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

/// Settings for the translation providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Which backend handles generation requests.
    pub kind: ProviderKind,
    /// Base URL of the local Ollama server.
    pub ollama_url: String,
    /// Model requested from Ollama (e.g. `"gemma3:1b"`).
    pub ollama_model: String,
    /// Base URL of the OpenRouter API (including `/api/v1`).
    pub openrouter_url: String,
    /// OpenRouter API key; `None` makes the provider unavailable.
    pub openrouter_api_key: Option<String>,
    /// Model requested from OpenRouter (e.g. `"openai/gpt-4o-mini"`).
    pub openrouter_model: String,
    /// Sampling temperature for chat-completion backends.
    pub temperature: f32,
    /// Maximum seconds to wait for a generation before timing out.
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Model identifier for the currently selected backend.
    pub fn active_model(&self) -> &str {
        match self.kind {
            ProviderKind::Ollama => &self.ollama_model,
            ProviderKind::OpenRouter => &self.openrouter_model,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            ollama_url: "http://localhost:11434".into(),
            ollama_model: "gemma3:1b".into(),
            openrouter_url: "https://openrouter.ai/api/v1".into(),
            openrouter_api_key: None,
            openrouter_model: "openai/gpt-4o-mini".into(),
            temperature: 0.7,
            timeout_secs: 45,
        }
    }
}

// ---------------------------------------------------------------------------
// PromptConfig
// ---------------------------------------------------------------------------

const DEFAULT_TRANSLATE_PROMPT: &str = "\
Переведи следующий немецкий текст на русский язык качественно:

\"{phrase}\"

Ответь только переводом на русском языке. \
Не используй в ответе кавычки, маркдаун или любой дополнительный текст.";

const DEFAULT_CONTEXT_PROMPT: &str = "\
Проанализируй следующее немецкое предложение:

\"{phrase}\"

Ответь строго в следующем формате (не добавляй ничего лишнего, не используй маркдаун):

ПЕРЕВОД: [краткий перевод на русский одной или несколькими фразами]
КОНТЕКСТ: [кратко разъясни значение важных слов, грамматику, род и падежи, \
приведи 1–3 похожих примера. Избегай списков и таблиц.]";

/// Active prompt templates.  `{phrase}` is replaced with the captured text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Template for a plain translation.
    pub translate: String,
    /// Template for a translation followed by a context section.
    pub context: String,
    /// Marker the context template asks the model to put before the context.
    pub delimiter: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            translate: DEFAULT_TRANSLATE_PROMPT.into(),
            context: DEFAULT_CONTEXT_PROMPT.into(),
            delimiter: "КОНТЕКСТ".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechSpeed / TtsConfig
// ---------------------------------------------------------------------------

/// Playback pace of synthesized audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeechSpeed {
    Normal,
    /// Wider pauses between words.
    Slow,
    /// Slow voice plus the widest pauses.
    VerySlow,
}

impl Default for SpeechSpeed {
    fn default() -> Self {
        Self::Normal
    }
}

/// Text-to-speech settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Attach synthesized audio to interactive cards.
    pub enabled: bool,
    /// Language code of the spoken phrase (e.g. `"de"`).
    pub lang: String,
    /// Regional voice, expressed as the Google top-level domain (e.g. `"de"`,
    /// `"at"`, `"ch"`).
    pub region: String,
    pub speed: SpeechSpeed,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lang: "de".into(),
            region: "de".into(),
            speed: SpeechSpeed::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// AnkiConfig
// ---------------------------------------------------------------------------

/// AnkiConnect endpoint and note layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnkiConfig {
    /// AnkiConnect URL.
    pub url: String,
    /// Deck used when the operator has not picked one.
    pub deck: String,
    /// Note type ("model" in AnkiConnect terms).
    pub note_type: String,
    /// Field holding the foreign phrase; also used for duplicate lookups.
    pub front_field: String,
    /// Field holding the translation.
    pub back_field: String,
    /// Dedicated field for context.  `None` appends the context to the back.
    pub context_field: Option<String>,
    /// Tags added to every created note.
    pub tags: Vec<String>,
}

impl Default for AnkiConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8765".into(),
            deck: "Default".into(),
            note_type: "Basic".into(),
            front_field: "Front".into(),
            back_field: "Back".into(),
            context_field: None,
            tags: vec!["phrase-cards".into()],
        }
    }
}

// ---------------------------------------------------------------------------
// WatcherConfig
// ---------------------------------------------------------------------------

/// Clipboard watcher timing and eligibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Milliseconds between clipboard reads.
    pub poll_ms: u64,
    /// Milliseconds to back off after a failed clipboard read.
    pub error_backoff_ms: u64,
    /// Captures with more words than this are ignored.
    pub max_words: usize,
    /// Start with monitoring paused.
    pub start_paused: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_ms: 500,
            error_backoff_ms: 1_000,
            max_words: 100,
            start_paused: false,
        }
    }
}

// ---------------------------------------------------------------------------
// DuplicatePolicy
// ---------------------------------------------------------------------------

/// What a call site does when the phrase already has a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Leave the existing card alone and skip the phrase.
    Skip,
    /// Ask the operator; replace only on confirmation.
    ReplaceOnConfirm,
    /// Delete the existing cards and add the new one without asking.
    Replace,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        Self::ReplaceOnConfirm
    }
}

// ---------------------------------------------------------------------------
// BatchConfig
// ---------------------------------------------------------------------------

/// Defaults for batch jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Milliseconds to wait between two items.
    pub item_delay_ms: u64,
    /// Granularity of the stop/pause checks during waits.
    pub poll_slice_ms: u64,
    pub check_duplicates: bool,
    pub duplicate_policy: DuplicatePolicy,
    pub audio: bool,
    pub context: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            item_delay_ms: 3_000,
            poll_slice_ms: 100,
            check_duplicates: true,
            duplicate_policy: DuplicatePolicy::Skip,
            audio: true,
            context: false,
        }
    }
}

// ---------------------------------------------------------------------------
// BehaviourConfig
// ---------------------------------------------------------------------------

/// How the interactive path reacts to captures and results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviourConfig {
    /// Ask for context alongside the translation.
    pub with_context: bool,
    /// Start a generation as soon as a phrase is captured.
    pub auto_generate: bool,
    /// Commit the card as soon as the translation arrives.
    pub auto_commit: bool,
    /// Duplicate handling for interactive requests.
    pub duplicate_policy: DuplicatePolicy,
    /// Answer given to duplicate questions when no operator is attached.
    pub assume_replace: bool,
}

impl Default for BehaviourConfig {
    fn default() -> Self {
        Self {
            with_context: false,
            auto_generate: true,
            auto_commit: true,
            duplicate_policy: DuplicatePolicy::default(),
            assume_replace: false,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use phrase_cards::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub prompts: PromptConfig,
    pub tts: TtsConfig,
    pub anki: AnkiConfig,
    pub watcher: WatcherConfig,
    pub batch: BatchConfig,
    pub behaviour: BehaviourConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
