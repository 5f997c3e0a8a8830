//! The single consumer of the results queue.
//!
//! [`EventDispatcher::tick`] takes at most one event, resets the flags it
//! implies, and hands it to the [`ResultSink`]. It never blocks, so it can be
//! driven from the thread that owns the display. The sink is held weakly:
//! once the display is gone, deliveries become no-ops.

use std::path::Path;
use std::sync::Weak;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::anki::NoteId;
use crate::llm::{ProviderError, Translation};
use crate::pipeline::commit::DuplicateDecision;
use crate::pipeline::events::{
    BatchLogLine, BatchSummary, DecisionHandle, EventReceiver, PipelineEvent, RequestId,
};
use crate::pipeline::PipelineFlags;
use crate::tts::SynthesisError;

// ---------------------------------------------------------------------------
// ResultSink
// ---------------------------------------------------------------------------

/// Typed callbacks the presentation layer implements, one per event kind.
///
/// Every method has a no-op default. The two decision-carrying callbacks
/// default to declining (dropping the decision).
#[allow(unused_variables)]
pub trait ResultSink {
    /// Short operator-facing status for every event that has one.
    fn status(&self, text: &str) {}

    fn translation_ok(
        &self,
        request: RequestId,
        phrase: &str,
        translation: &Translation,
        elapsed: Duration,
        force_replace: bool,
    ) {
    }

    /// Not called for connection failures; those only produce a status.
    fn translation_error(&self, request: RequestId, phrase: &str, error: &ProviderError) {}

    fn existing_notes(
        &self,
        request: RequestId,
        phrase: &str,
        ids: &[NoteId],
        decision: DecisionHandle,
    ) {
        decision.decline();
    }

    fn generation_cancelled(&self, request: RequestId) {}

    fn audio_ok(&self, request: RequestId, path: &Path) {}

    fn audio_error(&self, request: RequestId, error: &SynthesisError) {}

    fn duplicate_found(&self, decision: DuplicateDecision) {
        drop(decision);
    }

    fn commit_ok(&self, request: RequestId, note: NoteId) {}

    fn commit_error(&self, request: RequestId, message: &str) {}

    fn commit_cancelled(&self, request: RequestId) {}

    fn batch_progress(&self, index: usize, total: usize, phrase: &str) {}

    fn batch_log(&self, line: &BatchLogLine) {}

    fn batch_done(&self, summary: &BatchSummary) {}

    fn models_loaded(&self, provider: &str, models: &[String]) {}

    fn models_unavailable(&self, provider: &str) {}

    fn decks_loaded(&self, decks: &[String]) {}

    fn decks_unavailable(&self, message: &str) {}
}

/// Status-bar text for `event`, if it warrants one.
pub fn status_line(event: &PipelineEvent) -> Option<String> {
    let text = match event {
        PipelineEvent::TranslationOk { elapsed, .. } => {
            format!("Translated in {:.1}s", elapsed.as_secs_f32())
        }
        PipelineEvent::TranslationError {
            error: ProviderError::Connect(service),
            ..
        } => format!("{service} is not running"),
        PipelineEvent::TranslationError { error, .. } => format!("Translation failed: {error}"),
        PipelineEvent::ExistingNotes { .. } => "Card already exists".into(),
        PipelineEvent::GenerationCancelled { .. } => "Generation cancelled".into(),
        PipelineEvent::AudioOk { .. } => "Audio ready".into(),
        PipelineEvent::AudioError { .. } => "Audio failed, adding card without it".into(),
        PipelineEvent::DuplicateFound(_) => "Duplicate card found".into(),
        PipelineEvent::CommitOk { .. } => "Card added".into(),
        PipelineEvent::CommitError { .. } => "Card not added".into(),
        PipelineEvent::CommitCancelled { .. } => "Kept the existing card".into(),
        PipelineEvent::BatchProgress { index, total, .. } => format!("Batch {index}/{total}"),
        PipelineEvent::BatchLog(_) => return None,
        PipelineEvent::BatchDone(summary) if summary.stopped => "Batch stopped".into(),
        PipelineEvent::BatchDone(_) => "Batch finished".into(),
        PipelineEvent::ModelsLoaded { provider, models } => {
            format!("{} model(s) from {provider}", models.len())
        }
        PipelineEvent::ModelsUnavailable { provider } => format!("{provider} unavailable"),
        PipelineEvent::DecksLoaded(decks) => format!("{} deck(s)", decks.len()),
        PipelineEvent::DecksUnavailable(_) => "Anki unavailable".into(),
    };
    Some(text)
}

// ---------------------------------------------------------------------------
// EventDispatcher
// ---------------------------------------------------------------------------

pub struct EventDispatcher {
    rx: EventReceiver,
    sink: Weak<dyn ResultSink>,
    flags: PipelineFlags,
}

impl EventDispatcher {
    pub fn new(rx: EventReceiver, sink: Weak<dyn ResultSink>, flags: PipelineFlags) -> Self {
        Self { rx, sink, flags }
    }

    /// Deliver at most one pending event. Returns `false` when the queue was
    /// empty.
    pub fn tick(&mut self) -> bool {
        match self.rx.try_recv() {
            Ok(event) => {
                self.dispatch(event);
                true
            }
            Err(_) => false,
        }
    }

    /// Tick every `period` until `cancel` fires.
    pub async fn run(mut self, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }
        log::debug!("dispatcher: stopped");
    }

    fn dispatch(&self, event: PipelineEvent) {
        if event.is_generation() {
            if let Some(request) = event.request() {
                if !self.flags.is_active_generation(request) {
                    log::debug!("dispatcher: discarding {} for stale {request}", event.kind());
                    return;
                }
                if event.is_generation_terminal() {
                    self.flags.finish_generation(request);
                }
            }
        }

        let Some(sink) = self.sink.upgrade() else {
            log::debug!("dispatcher: display gone, dropping {}", event.kind());
            return;
        };

        if let Some(text) = status_line(&event) {
            sink.status(&text);
        }

        match event {
            PipelineEvent::TranslationOk {
                request,
                phrase,
                translation,
                elapsed,
                force_replace,
            } => sink.translation_ok(request, &phrase, &translation, elapsed, force_replace),
            PipelineEvent::TranslationError { error, .. } if error.is_connect() => {}
            PipelineEvent::TranslationError {
                request,
                phrase,
                error,
            } => sink.translation_error(request, &phrase, &error),
            PipelineEvent::ExistingNotes {
                request,
                phrase,
                ids,
                decision,
            } => sink.existing_notes(request, &phrase, &ids, decision),
            PipelineEvent::GenerationCancelled { request } => sink.generation_cancelled(request),
            PipelineEvent::AudioOk { request, path } => sink.audio_ok(request, &path),
            PipelineEvent::AudioError { request, error } => sink.audio_error(request, &error),
            PipelineEvent::DuplicateFound(decision) => sink.duplicate_found(decision),
            PipelineEvent::CommitOk { request, note } => sink.commit_ok(request, note),
            PipelineEvent::CommitError { request, message } => sink.commit_error(request, &message),
            PipelineEvent::CommitCancelled { request } => sink.commit_cancelled(request),
            PipelineEvent::BatchProgress {
                index,
                total,
                phrase,
            } => sink.batch_progress(index, total, &phrase),
            PipelineEvent::BatchLog(line) => sink.batch_log(&line),
            PipelineEvent::BatchDone(summary) => sink.batch_done(&summary),
            PipelineEvent::ModelsLoaded { provider, models } => {
                sink.models_loaded(&provider, &models)
            }
            PipelineEvent::ModelsUnavailable { provider } => sink.models_unavailable(&provider),
            PipelineEvent::DecksLoaded(decks) => sink.decks_loaded(&decks),
            PipelineEvent::DecksUnavailable(message) => sink.decks_unavailable(&message),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
