//! Persisting a generated card, with operator-confirmed duplicate handling.
//!
//! # Flow
//!
//! ```text
//! commit(request)
//!   ├─ force_replace → find_notes + delete_notes
//!   └─ add_note(allow_duplicate = confirm_delete || force_replace)
//!        ├─ Ok                       → CommitOk
//!        ├─ Duplicate (no override)  → DuplicateFound(decision)   [pending]
//!        │     ├─ confirm → delete_notes(ids) → commit(confirm_delete) → CommitOk | CommitError
//!        │     └─ decline → CommitCancelled
//!        └─ any other error          → CommitError
//! ```
//!
//! The audio artifact travels inside the request. It is dropped (and the file
//! deleted) on every terminal path; while a decision is pending it lives in
//! the [`DuplicateDecision`].

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::anki::{CardStore, NewNote, NoteId, StoreError};
use crate::pipeline::events::{EventSender, PipelineEvent, RequestId};
use crate::tts::{AudioArtifact, SpeechSynthesizer, VoiceOptions};

// ---------------------------------------------------------------------------
// CommitRequest / DuplicateDecision
// ---------------------------------------------------------------------------

/// A card waiting to be written to the store.
#[derive(Debug)]
pub struct CommitRequest {
    /// Usually the id of the generation that produced the translation.
    pub id: RequestId,
    pub phrase: String,
    pub translation: String,
    pub context: String,
    pub deck: String,
    pub audio: Option<AudioArtifact>,
    /// Set when re-committing after the operator confirmed a replacement.
    pub confirm_delete: bool,
    /// Delete existing cards for the phrase before adding.
    pub force_replace: bool,
}

impl CommitRequest {
    pub fn new(
        id: RequestId,
        phrase: impl Into<String>,
        translation: impl Into<String>,
        context: impl Into<String>,
        deck: impl Into<String>,
    ) -> Self {
        Self {
            id,
            phrase: phrase.into(),
            translation: translation.into(),
            context: context.into(),
            deck: deck.into(),
            audio: None,
            confirm_delete: false,
            force_replace: false,
        }
    }

    fn note(&self) -> NewNote {
        NewNote {
            phrase: self.phrase.clone(),
            translation: self.translation.clone(),
            context: self.context.clone(),
            deck: self.deck.clone(),
        }
    }
}

/// A commit parked until the operator chooses replace or skip.
#[derive(Debug)]
pub struct DuplicateDecision {
    pub request: CommitRequest,
    /// Notes that already hold the phrase.
    pub ids: Vec<NoteId>,
}

// ---------------------------------------------------------------------------
// CommitCoordinator
// ---------------------------------------------------------------------------

/// Turns [`CommitRequest`]s into cards. Each call runs on its own task.
#[derive(Clone)]
pub struct CommitCoordinator {
    store: Arc<dyn CardStore>,
    tts: Option<Arc<dyn SpeechSynthesizer>>,
    tx: EventSender,
}

impl CommitCoordinator {
    pub fn new(
        store: Arc<dyn CardStore>,
        tts: Option<Arc<dyn SpeechSynthesizer>>,
        tx: EventSender,
    ) -> Self {
        Self { store, tts, tx }
    }

    /// Write `request` to the store.
    pub fn commit(&self, request: CommitRequest) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run_commit(request).await })
    }

    /// Synthesize the phrase first, then commit.
    ///
    /// A synthesis failure emits `AudioError` and the card is added without
    /// audio. Without a synthesizer or `voice` this is a plain commit.
    pub fn synthesize_and_commit(
        &self,
        mut request: CommitRequest,
        voice: Option<VoiceOptions>,
    ) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let (Some(tts), Some(voice)) = (this.tts.as_ref(), voice) {
                match tts.synthesize(&request.phrase, &voice).await {
                    Ok(artifact) => {
                        this.emit(PipelineEvent::AudioOk {
                            request: request.id,
                            path: artifact.path().to_path_buf(),
                        });
                        request.audio = Some(artifact);
                    }
                    Err(error) => {
                        log::warn!("commit {}: audio failed: {error}", request.id);
                        this.emit(PipelineEvent::AudioError {
                            request: request.id,
                            error,
                        });
                    }
                }
            }
            this.run_commit(request).await;
        })
    }

    /// Operator chose "replace": delete the matched notes and add again.
    pub fn confirm(&self, decision: DuplicateDecision) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let DuplicateDecision { mut request, ids } = decision;
            match this.store.delete_notes(&ids).await {
                Ok(true) => {
                    log::info!("commit {}: replaced {} note(s)", request.id, ids.len());
                    request.confirm_delete = true;
                    this.run_commit(request).await;
                }
                Ok(false) => this.fail(request, "could not delete old version".into()),
                Err(e) => this.fail(request, format!("could not delete old version: {e}")),
            }
        })
    }

    /// Operator chose "skip": the existing cards stay untouched.
    pub fn decline(&self, decision: DuplicateDecision) {
        let id = decision.request.id;
        log::info!("commit {id}: duplicate kept, new card discarded");
        drop(decision);
        self.emit(PipelineEvent::CommitCancelled { request: id });
    }

    async fn run_commit(&self, mut request: CommitRequest) {
        if request.force_replace {
            if let Err(e) = self.delete_existing(&request.phrase).await {
                self.fail(request, e.to_string());
                return;
            }
        }

        let allow_duplicate = request.confirm_delete || request.force_replace;
        let note = request.note();
        let audio_path = request.audio.as_ref().map(|a| a.path().to_path_buf());

        match self
            .store
            .add_note(&note, audio_path.as_deref(), allow_duplicate)
            .await
        {
            Ok(id) => {
                log::info!("commit {}: added note {id}", request.id);
                // The store has copied the media; the local file can go.
                drop(request.audio.take());
                self.emit(PipelineEvent::CommitOk {
                    request: request.id,
                    note: id,
                });
            }
            Err(StoreError::Duplicate { ids }) if !allow_duplicate => {
                let ids = if ids.is_empty() {
                    self.store.find_notes(&request.phrase).await.unwrap_or_default()
                } else {
                    ids
                };
                if ids.is_empty() {
                    self.fail(request, StoreError::Duplicate { ids }.to_string());
                } else {
                    log::info!("commit {}: phrase exists in {} note(s)", request.id, ids.len());
                    self.emit(PipelineEvent::DuplicateFound(DuplicateDecision { request, ids }));
                }
            }
            Err(e) => self.fail(request, e.to_string()),
        }
    }

    async fn delete_existing(&self, phrase: &str) -> Result<(), StoreError> {
        let ids = self.store.find_notes(phrase).await?;
        if !ids.is_empty() {
            self.store.delete_notes(&ids).await?;
        }
        Ok(())
    }

    /// Terminal failure: drop the artifact and report.
    fn fail(&self, request: CommitRequest, message: String) {
        log::error!("commit {}: {message}", request.id);
        let id = request.id;
        drop(request);
        self.emit(PipelineEvent::CommitError { request: id, message });
    }

    fn emit(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("commit: results queue closed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
