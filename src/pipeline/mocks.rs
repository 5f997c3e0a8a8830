//! Recording test doubles for the capability traits.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::anki::{CardStore, NewNote, NoteId, StoreError};
use crate::llm::{ProviderError, TranslationProvider};
use crate::tts::{AudioArtifact, SpeechSynthesizer, SynthesisError, VoiceOptions};

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// Answers `"<prompt> (übersetzt)"` unless told otherwise.
pub struct MockProvider {
    name: String,
    reply: Option<String>,
    failing: HashSet<String>,
    unreachable: bool,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            name: "Mock".into(),
            reply: None,
            failing: HashSet::new(),
            unreachable: false,
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Fail with a provider error whenever the prompt contains `phrase`.
    pub fn failing_on(mut self, phrase: &str) -> Self {
        self.failing.insert(phrase.into());
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn is_available(&self) -> bool {
        !self.unreachable
    }

    async fn list_models(&self) -> Vec<String> {
        if self.unreachable {
            Vec::new()
        } else {
            vec!["mock-large".into(), "mock-small".into()]
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        _model: Option<&str>,
        _timeout: Duration,
    ) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return Err(ProviderError::Connect("Mock".into()));
        }
        if self.failing.iter().any(|p| prompt.contains(p.as_str())) {
            return Err(ProviderError::Provider("model crashed".into()));
        }
        Ok(self
            .reply
            .clone()
            .unwrap_or_else(|| format!("{prompt} (übersetzt)")))
    }
}

// ---------------------------------------------------------------------------
// MockStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Find(String),
    Add {
        phrase: String,
        allow_duplicate: bool,
        with_audio: bool,
    },
    Delete(Vec<NoteId>),
    ListDecks,
    CreateDeck(String),
}

/// In-memory store keyed by phrase; records every call.
pub struct MockStore {
    notes: Mutex<HashMap<String, Vec<NoteId>>>,
    next_id: AtomicI64,
    failing_add: HashSet<String>,
    failing_delete: bool,
    unavailable: bool,
    calls: Mutex<Vec<StoreCall>>,
    audio_present: Mutex<Vec<bool>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            notes: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(2000),
            failing_add: HashSet::new(),
            failing_delete: false,
            unavailable: false,
            calls: Mutex::new(Vec::new()),
            audio_present: Mutex::new(Vec::new()),
        }
    }

    pub fn with_note(self, phrase: &str, id: NoteId) -> Self {
        self.notes
            .lock()
            .unwrap()
            .entry(phrase.into())
            .or_default()
            .push(id);
        self
    }

    pub fn failing_add(mut self, phrase: &str) -> Self {
        self.failing_add.insert(phrase.into());
        self
    }

    pub fn failing_delete(mut self) -> Self {
        self.failing_delete = true;
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// For each `add_note`, whether the audio file existed at that moment.
    pub fn audio_present_at_add(&self) -> Vec<bool> {
        self.audio_present.lock().unwrap().clone()
    }

    pub fn added_phrases(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Add { phrase, .. } => Some(phrase),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl CardStore for MockStore {
    async fn find_notes(&self, phrase: &str) -> Result<Vec<NoteId>, StoreError> {
        self.record(StoreCall::Find(phrase.into()));
        if self.unavailable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(self
            .notes
            .lock()
            .unwrap()
            .get(phrase)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_note(
        &self,
        note: &NewNote,
        audio: Option<&Path>,
        allow_duplicate: bool,
    ) -> Result<NoteId, StoreError> {
        self.record(StoreCall::Add {
            phrase: note.phrase.clone(),
            allow_duplicate,
            with_audio: audio.is_some(),
        });
        self.audio_present
            .lock()
            .unwrap()
            .push(audio.is_some_and(Path::exists));

        if self.unavailable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        if self.failing_add.contains(&note.phrase) {
            return Err(StoreError::Rejected("model was not found".into()));
        }

        let mut notes = self.notes.lock().unwrap();
        let existing = notes.get(&note.phrase).cloned().unwrap_or_default();
        if !allow_duplicate && !existing.is_empty() {
            return Err(StoreError::Duplicate { ids: existing });
        }
        let id = NoteId(self.next_id.fetch_add(1, Ordering::Relaxed));
        notes.entry(note.phrase.clone()).or_default().push(id);
        Ok(id)
    }

    async fn delete_notes(&self, ids: &[NoteId]) -> Result<bool, StoreError> {
        self.record(StoreCall::Delete(ids.to_vec()));
        if self.failing_delete {
            return Err(StoreError::Rejected("collection is locked".into()));
        }
        for list in self.notes.lock().unwrap().values_mut() {
            list.retain(|id| !ids.contains(id));
        }
        Ok(true)
    }

    async fn list_decks(&self) -> Result<Vec<String>, StoreError> {
        self.record(StoreCall::ListDecks);
        if self.unavailable {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(vec!["Default".into(), "Deutsch".into()])
    }

    async fn create_deck(&self, name: &str) -> Result<bool, StoreError> {
        self.record(StoreCall::CreateDeck(name.into()));
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// MockTts
// ---------------------------------------------------------------------------

/// Writes a tiny fake MP3 into `dir` for every call.
pub struct MockTts {
    dir: PathBuf,
    failing: bool,
    calls: AtomicUsize,
}

impl MockTts {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            failing: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SpeechSynthesizer for MockTts {
    async fn synthesize(
        &self,
        _text: &str,
        _voice: &VoiceOptions,
    ) -> Result<AudioArtifact, SynthesisError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        if self.failing {
            return Err(SynthesisError::Request("503 Service Unavailable".into()));
        }
        let path = self.dir.join(format!("mock_audio_{n}.mp3"));
        std::fs::write(&path, b"ID3")?;
        Ok(AudioArtifact::new(path))
    }
}
