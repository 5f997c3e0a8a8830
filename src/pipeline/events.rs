//! Messages on the results queue.
//!
//! Every coordinator only ever *produces* [`PipelineEvent`]s; the
//! [`EventDispatcher`](crate::pipeline::EventDispatcher) is the single place
//! that interprets them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::anki::NoteId;
use crate::llm::{ProviderError, Translation};
use crate::pipeline::commit::DuplicateDecision;
use crate::tts::SynthesisError;

// ---------------------------------------------------------------------------
// RequestId
// ---------------------------------------------------------------------------

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

/// Correlates the events of one interactive request. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// A process-unique id.
    pub fn next() -> Self {
        Self(NEXT_REQUEST.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn from_raw(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// DecisionHandle
// ---------------------------------------------------------------------------

/// Operator answer to "this phrase already has a card, generate anyway?".
///
/// Dropping the handle without answering counts as declining.
#[derive(Debug)]
pub struct DecisionHandle {
    reply: oneshot::Sender<bool>,
}

impl DecisionHandle {
    pub(crate) fn new() -> (Self, oneshot::Receiver<bool>) {
        let (reply, rx) = oneshot::channel();
        (Self { reply }, rx)
    }

    /// Go ahead and replace the existing cards.
    pub fn confirm(self) {
        let _ = self.reply.send(true);
    }

    pub fn decline(self) {
        let _ = self.reply.send(false);
    }
}

// ---------------------------------------------------------------------------
// Batch payloads
// ---------------------------------------------------------------------------

/// One piece of the batch log.
///
/// Stage glyphs continue the current item's line (`append = true`); the start
/// of an item or a lifecycle message opens a new line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLogLine {
    pub text: String,
    pub append: bool,
}

impl BatchLogLine {
    pub fn line(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            append: false,
        }
    }

    pub fn append(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            append: true,
        }
    }
}

/// Totals reported when a batch ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// `true` when the run ended on a stop request.
    pub stopped: bool,
}

// ---------------------------------------------------------------------------
// PipelineEvent
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum PipelineEvent {
    // ---- generation ---
    TranslationOk {
        request: RequestId,
        phrase: String,
        translation: Translation,
        elapsed: Duration,
        /// The operator agreed to replace existing cards for this phrase.
        force_replace: bool,
    },
    TranslationError {
        request: RequestId,
        phrase: String,
        error: ProviderError,
    },
    /// The phrase already has cards; the generation task waits on `decision`.
    ExistingNotes {
        request: RequestId,
        phrase: String,
        ids: Vec<NoteId>,
        decision: DecisionHandle,
    },
    GenerationCancelled { request: RequestId },

    // ---- commit ---
    AudioOk { request: RequestId, path: PathBuf },
    AudioError { request: RequestId, error: SynthesisError },
    DuplicateFound(DuplicateDecision),
    CommitOk { request: RequestId, note: NoteId },
    CommitError { request: RequestId, message: String },
    CommitCancelled { request: RequestId },

    // ---- batch ---
    BatchProgress {
        /// One-based position in the job.
        index: usize,
        total: usize,
        phrase: String,
    },
    BatchLog(BatchLogLine),
    BatchDone(BatchSummary),

    // ---- catalogs ---
    ModelsLoaded { provider: String, models: Vec<String> },
    ModelsUnavailable { provider: String },
    DecksLoaded(Vec<String>),
    DecksUnavailable(String),
}

impl PipelineEvent {
    /// Variant name, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::TranslationOk { .. } => "translation-ok",
            PipelineEvent::TranslationError { .. } => "translation-error",
            PipelineEvent::ExistingNotes { .. } => "existing-notes",
            PipelineEvent::GenerationCancelled { .. } => "generation-cancelled",
            PipelineEvent::AudioOk { .. } => "audio-ok",
            PipelineEvent::AudioError { .. } => "audio-error",
            PipelineEvent::DuplicateFound(_) => "duplicate-found",
            PipelineEvent::CommitOk { .. } => "commit-ok",
            PipelineEvent::CommitError { .. } => "commit-error",
            PipelineEvent::CommitCancelled { .. } => "commit-cancelled",
            PipelineEvent::BatchProgress { .. } => "batch-progress",
            PipelineEvent::BatchLog(_) => "batch-log",
            PipelineEvent::BatchDone(_) => "batch-done",
            PipelineEvent::ModelsLoaded { .. } => "models-loaded",
            PipelineEvent::ModelsUnavailable { .. } => "models-unavailable",
            PipelineEvent::DecksLoaded(_) => "decks-loaded",
            PipelineEvent::DecksUnavailable(_) => "decks-unavailable",
        }
    }

    /// The interactive request this event belongs to, if any.
    pub fn request(&self) -> Option<RequestId> {
        match self {
            PipelineEvent::TranslationOk { request, .. }
            | PipelineEvent::TranslationError { request, .. }
            | PipelineEvent::ExistingNotes { request, .. }
            | PipelineEvent::GenerationCancelled { request }
            | PipelineEvent::AudioOk { request, .. }
            | PipelineEvent::AudioError { request, .. }
            | PipelineEvent::CommitOk { request, .. }
            | PipelineEvent::CommitError { request, .. }
            | PipelineEvent::CommitCancelled { request } => Some(*request),
            PipelineEvent::DuplicateFound(decision) => Some(decision.request.id),
            _ => None,
        }
    }

    /// Events produced by the generation coordinator.
    pub fn is_generation(&self) -> bool {
        matches!(
            self,
            PipelineEvent::TranslationOk { .. }
                | PipelineEvent::TranslationError { .. }
                | PipelineEvent::ExistingNotes { .. }
                | PipelineEvent::GenerationCancelled { .. }
        )
    }

    /// Generation events after which the request is over.
    pub fn is_generation_terminal(&self) -> bool {
        self.is_generation() && !matches!(self, PipelineEvent::ExistingNotes { .. })
    }
}

pub type EventSender = mpsc::UnboundedSender<PipelineEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<PipelineEvent>;

/// A fresh results queue.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
