//! Text-to-speech for card audio.
//!
//! * [`SpeechSynthesizer`]: async capability: text + voice options → audio
//!   file on disk.
//! * [`AudioArtifact`]: owned handle to that file.  The file is removed when
//!   the handle is dropped, so every artifact is deleted exactly once whether
//!   the card store took it, the add failed, or the operator declined.
//! * [`GoogleTts`]: Google Translate TTS backend.

pub mod google;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{SpeechSpeed, TtsConfig};

pub use google::{pad_for_speed, GoogleTts};

// ---------------------------------------------------------------------------
// SynthesisError
// ---------------------------------------------------------------------------

/// Errors that can arise while synthesizing audio.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisError {
    /// The TTS service could not be reached or rejected the request.
    #[error("TTS request failed: {0}")]
    Request(String),

    /// The audio could not be written to disk.
    #[error("cannot write audio file: {0}")]
    Io(String),

    /// The service returned no audio.
    #[error("TTS returned no audio")]
    EmptyAudio,
}

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        SynthesisError::Request(e.to_string())
    }
}

impl From<std::io::Error> for SynthesisError {
    fn from(e: std::io::Error) -> Self {
        SynthesisError::Io(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// VoiceOptions
// ---------------------------------------------------------------------------

/// Voice parameters for one synthesis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceOptions {
    /// Language code (e.g. `"de"`).
    pub lang: String,
    pub speed: SpeechSpeed,
    /// Regional accent as a Google TLD (e.g. `"de"`, `"at"`).
    pub region: String,
}

impl From<&TtsConfig> for VoiceOptions {
    fn from(config: &TtsConfig) -> Self {
        Self {
            lang: config.lang.clone(),
            speed: config.speed,
            region: config.region.clone(),
        }
    }
}

impl Default for VoiceOptions {
    fn default() -> Self {
        Self::from(&TtsConfig::default())
    }
}

// ---------------------------------------------------------------------------
// AudioArtifact
// ---------------------------------------------------------------------------

/// A synthesized audio file owned by whichever coordinator holds it.
///
/// Not `Clone`: ownership moves from the synthesizer to the commit stage and,
/// for a pending duplicate decision, into that decision.  Dropping the value
/// deletes the file (best-effort; failures are logged).
#[derive(Debug)]
pub struct AudioArtifact {
    path: PathBuf,
}

impl AudioArtifact {
    /// Take ownership of the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now.
    pub fn discard(self) {
        drop(self);
    }
}

impl Drop for AudioArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("audio: removed {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("audio: could not remove {}: {e}", self.path.display()),
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechSynthesizer trait
// ---------------------------------------------------------------------------

/// Async capability that turns text into an audio file.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceOptions,
    ) -> Result<AudioArtifact, SynthesisError>;
}

// Compile-time assertion: Box<dyn SpeechSynthesizer> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SpeechSynthesizer>) {}
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
