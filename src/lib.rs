//! Capture foreign-language phrases and turn them into flashcards.
//!
//! The crate is organised one directory per subsystem:
//!
//! * [`config`]: TOML settings and platform paths.
//! * [`llm`]: translation providers (Ollama, OpenRouter) and response cleanup.
//! * [`tts`]: speech synthesis into short-lived audio artifacts.
//! * [`anki`]: the card store (AnkiConnect).
//! * [`clipboard`]: the clipboard watcher feeding candidate phrases.
//! * [`pipeline`]: the coordinators, the results queue and its dispatcher.

pub mod anki;
pub mod clipboard;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod tts;
