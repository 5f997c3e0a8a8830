//! Google Translate TTS backend.
//!
//! The public `translate_tts` endpoint accepts at most ~100 characters per
//! request, so longer text is split at word boundaries and the returned MP3
//! segments are concatenated (MP3 frames concatenate cleanly).
//!
//! Speed handling mirrors what listeners expect from a language-learning deck:
//! * `Normal`  : unchanged text, normal voice.
//! * `Slow`    : wider pauses between words and after punctuation.
//! * `VerySlow`: Google's slow voice plus the widest pauses.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::SpeechSpeed;
use crate::tts::{AudioArtifact, SpeechSynthesizer, SynthesisError, VoiceOptions};

/// Longest chunk sent in a single request.
const MAX_CHUNK_CHARS: usize = 100;

/// Punctuation after which extra pause is inserted.
const PAUSE_PUNCTUATION: [char; 6] = [',', '.', '!', '?', ';', ':'];

// ---------------------------------------------------------------------------
// Text preparation
// ---------------------------------------------------------------------------

/// Widen pauses for the slower speeds by padding spaces.
///
/// ```
/// use phrase_cards::config::SpeechSpeed;
/// use phrase_cards::tts::pad_for_speed;
///
/// assert_eq!(pad_for_speed("a b", SpeechSpeed::Normal), "a b");
/// assert_eq!(pad_for_speed("a b", SpeechSpeed::Slow), "a   b");
/// ```
pub fn pad_for_speed(text: &str, speed: SpeechSpeed) -> String {
    let (word_gap, punct_gap) = match speed {
        SpeechSpeed::Normal => return text.to_string(),
        SpeechSpeed::Slow => (3, 4),
        SpeechSpeed::VerySlow => (6, 7),
    };

    let mut out = String::with_capacity(text.len() * 2);
    for c in text.chars() {
        if c == ' ' {
            out.extend(std::iter::repeat(' ').take(word_gap));
        } else if PAUSE_PUNCTUATION.contains(&c) {
            out.push(c);
            out.extend(std::iter::repeat(' ').take(punct_gap));
        } else {
            out.push(c);
        }
    }
    out
}

/// Split `text` into chunks of at most `max` characters, breaking at
/// whitespace where possible.
fn chunk_text(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word.to_string();

        // Words longer than a whole chunk are cut hard.
        while word.chars().count() > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let head: String = word.chars().take(max).collect();
            word = word.chars().skip(max).collect();
            chunks.push(head);
        }

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Request texts for `text` at `speed`.
///
/// Chunk boundaries are chosen on the plain text; padding is applied per
/// chunk so the widened pauses reach the endpoint.
fn speech_chunks(text: &str, speed: SpeechSpeed) -> Vec<String> {
    chunk_text(text, MAX_CHUNK_CHARS)
        .iter()
        .map(|chunk| pad_for_speed(chunk, speed))
        .collect()
}

// ---------------------------------------------------------------------------
// GoogleTts
// ---------------------------------------------------------------------------

/// Synthesizes MP3 files into `audio_dir` via Google Translate TTS.
pub struct GoogleTts {
    client: reqwest::Client,
    audio_dir: PathBuf,
}

impl GoogleTts {
    pub fn new(audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            audio_dir: audio_dir.into(),
        }
    }

    fn endpoint(region: &str) -> String {
        let tld = if region.trim().is_empty() { "com" } else { region.trim() };
        format!("https://translate.google.{tld}/translate_tts")
    }

    fn artifact_path(&self) -> PathBuf {
        self.audio_dir
            .join(format!("anki_audio_{}.mp3", uuid::Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceOptions,
    ) -> Result<AudioArtifact, SynthesisError> {
        log::debug!(
            "tts: lang={} region={} speed={:?} text={:?}",
            voice.lang,
            voice.region,
            voice.speed,
            text.chars().take(40).collect::<String>()
        );

        let chunks = speech_chunks(text, voice.speed);
        if chunks.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }

        let speed = if voice.speed == SpeechSpeed::VerySlow { "0.3" } else { "1" };
        let total = chunks.len().to_string();
        let url = Self::endpoint(&voice.region);

        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let bytes = self
                .client
                .get(&url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("q", chunk.as_str()),
                    ("tl", voice.lang.as_str()),
                    ("ttsspeed", speed),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            audio.extend_from_slice(&bytes);
        }

        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }

        tokio::fs::create_dir_all(&self.audio_dir).await?;
        let path = self.artifact_path();
        tokio::fs::write(&path, &audio).await?;

        log::debug!("tts: wrote {} bytes to {}", audio.len(), path.display());
        Ok(AudioArtifact::new(path))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
