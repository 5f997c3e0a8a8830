//! Unattended generation over a list of phrases.
//!
//! # Per-item flow
//!
//! ```text
//! stop? ─▶ "interrupted", exit
//! paused? ─▶ wait (poll_slice) until resumed or stopped
//! blank? ─▶ skip silently
//! BatchProgress + "<phrase>:"
//!   ├─ duplicate check (optional) ─▶ "⚠️ duplicate (skipped)"
//!   ├─ 🤖 translate
//!   ├─ 🔊 synthesize (optional)
//!   ├─ 📇 add_note, artifact dropped
//!   └─ "✅ done" | "❌ error: …"
//! wait item_delay (not after the last item), checking stop/pause every slice
//! ```
//!
//! A failing item never aborts the run; the batch ends on exhaustion or stop
//! and always emits `BatchDone`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::anki::{CardStore, NewNote, StoreError};
use crate::config::{AppConfig, BatchConfig, DuplicatePolicy, PromptConfig};
use crate::llm::{ProviderError, ProviderSet, Translation};
use crate::pipeline::events::{BatchLogLine, BatchSummary, EventSender, PipelineEvent};
use crate::pipeline::generation::preview;
use crate::pipeline::PipelineFlags;
use crate::tts::{SpeechSynthesizer, SynthesisError, VoiceOptions};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("a batch is already running")]
    AlreadyRunning,
}

/// Failure of one item; logged, never propagated.
#[derive(Debug, Error)]
enum ItemError {
    #[error(transparent)]
    Translation(#[from] ProviderError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

enum ItemOutcome {
    Added,
    Duplicate,
}

// ---------------------------------------------------------------------------
// BatchJob / BatchTiming
// ---------------------------------------------------------------------------

/// A list of phrases and how to process them.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub phrases: Vec<String>,
    pub deck: String,
    pub audio: bool,
    pub context: bool,
    pub check_duplicates: bool,
    /// Applied when `check_duplicates` finds a card. `ReplaceOnConfirm` has
    /// nobody to ask in an unattended run and behaves like `Skip`.
    pub duplicate_policy: DuplicatePolicy,
    pub voice: VoiceOptions,
    pub prompts: PromptConfig,
    pub provider: String,
    pub model: Option<String>,
    pub timeout: Duration,
}

impl BatchJob {
    pub fn from_config(phrases: Vec<String>, deck: impl Into<String>, config: &AppConfig) -> Self {
        Self {
            phrases,
            deck: deck.into(),
            audio: config.batch.audio && config.tts.enabled,
            context: config.batch.context,
            check_duplicates: config.batch.check_duplicates,
            duplicate_policy: config.batch.duplicate_policy,
            voice: VoiceOptions::from(&config.tts),
            prompts: config.prompts.clone(),
            provider: config.provider.kind.name().to_string(),
            model: Some(config.provider.active_model().to_string()),
            timeout: config.provider.timeout(),
        }
    }
}

/// Waits used by the batch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchTiming {
    /// Pause between two items.
    pub item_delay: Duration,
    /// Grain of the stop/pause checks during waits.
    pub poll_slice: Duration,
}

impl From<&BatchConfig> for BatchTiming {
    fn from(config: &BatchConfig) -> Self {
        Self {
            item_delay: Duration::from_millis(config.item_delay_ms),
            poll_slice: Duration::from_millis(config.poll_slice_ms.max(1)),
        }
    }
}

impl Default for BatchTiming {
    fn default() -> Self {
        Self::from(&BatchConfig::default())
    }
}

// ---------------------------------------------------------------------------
// BatchCoordinator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct BatchCoordinator {
    providers: ProviderSet,
    store: Arc<dyn CardStore>,
    tts: Option<Arc<dyn SpeechSynthesizer>>,
    tx: EventSender,
    flags: PipelineFlags,
    timing: BatchTiming,
}

impl BatchCoordinator {
    pub fn new(
        providers: ProviderSet,
        store: Arc<dyn CardStore>,
        tts: Option<Arc<dyn SpeechSynthesizer>>,
        tx: EventSender,
        flags: PipelineFlags,
        timing: BatchTiming,
    ) -> Self {
        Self {
            providers,
            store,
            tts,
            tx,
            flags,
            timing,
        }
    }

    /// Start `job` in the background.
    ///
    /// # Errors
    ///
    /// [`BatchError::AlreadyRunning`] while another batch holds the slot.
    pub fn run(&self, job: BatchJob) -> Result<JoinHandle<BatchSummary>, BatchError> {
        if !self.flags.try_start_batch() {
            return Err(BatchError::AlreadyRunning);
        }
        log::info!("batch: starting {} phrase(s) into {:?}", job.phrases.len(), job.deck);

        let this = self.clone();
        Ok(tokio::spawn(async move {
            let summary = this.run_job(&job).await;
            this.flags.finish_batch();
            log::info!(
                "batch: done, {} added, {} failed, {} skipped{}",
                summary.succeeded,
                summary.failed,
                summary.skipped,
                if summary.stopped { " (stopped)" } else { "" }
            );
            this.emit(PipelineEvent::BatchDone(summary));
            summary
        }))
    }

    pub fn pause(&self) {
        self.flags.set_batch_paused(true);
    }

    pub fn resume(&self) {
        self.flags.set_batch_paused(false);
    }

    /// Ask the loop to exit at its next check.
    pub fn stop(&self) {
        self.flags.request_batch_stop();
    }

    async fn run_job(&self, job: &BatchJob) -> BatchSummary {
        let total = job.phrases.len();
        let mut summary = BatchSummary {
            total,
            ..BatchSummary::default()
        };
        self.log(format!("🚀 processing {total} phrase(s)..."));

        for (i, raw) in job.phrases.iter().enumerate() {
            if self.stopping() {
                self.log("🛑 interrupted.");
                summary.stopped = true;
                break;
            }

            if self.flags.is_batch_paused() {
                let short: String = raw.trim().chars().take(30).collect();
                self.log(format!("⏸ paused before: {short}..."));
                self.wait_while_paused().await;
                if !self.stopping() {
                    self.log("▶ resuming...");
                }
            }
            if self.stopping() {
                self.log("🛑 interrupted.");
                summary.stopped = true;
                break;
            }

            let phrase = raw.trim();
            if phrase.is_empty() {
                continue;
            }

            self.emit(PipelineEvent::BatchProgress {
                index: i + 1,
                total,
                phrase: phrase.to_string(),
            });
            self.log(format!("{}:", preview(phrase)));

            match self.process_item(job, phrase).await {
                Ok(ItemOutcome::Added) => {
                    summary.succeeded += 1;
                    self.append("✅ done");
                }
                Ok(ItemOutcome::Duplicate) => {
                    summary.skipped += 1;
                    self.append("⚠️ duplicate (skipped)");
                    continue;
                }
                Err(e) => {
                    log::warn!("batch: {phrase:?} failed: {e}");
                    summary.failed += 1;
                    self.append(format!("❌ error: {e}"));
                }
            }

            let more_ahead = job.phrases[i + 1..].iter().any(|p| !p.trim().is_empty());
            if more_ahead && !self.stopping() {
                self.wait_between_items().await;
            }
        }

        summary
    }

    async fn process_item(&self, job: &BatchJob, phrase: &str) -> Result<ItemOutcome, ItemError> {
        let mut replace = false;
        if job.check_duplicates {
            let existing = self.store.find_notes(phrase).await?;
            if !existing.is_empty() {
                match job.duplicate_policy {
                    DuplicatePolicy::Skip | DuplicatePolicy::ReplaceOnConfirm => {
                        return Ok(ItemOutcome::Duplicate)
                    }
                    DuplicatePolicy::Replace => {
                        self.store.delete_notes(&existing).await?;
                        replace = true;
                    }
                }
            }
        }

        self.append("🤖");
        let translation = self.translate(job, phrase).await?;

        let audio = match (&self.tts, job.audio) {
            (Some(tts), true) => {
                self.append("🔊");
                Some(tts.synthesize(phrase, &job.voice).await?)
            }
            _ => None,
        };

        self.append("📇");
        let note = NewNote {
            phrase: phrase.to_string(),
            translation: translation.translation,
            context: translation.context,
            deck: job.deck.clone(),
        };
        let allow_duplicate = replace || !job.check_duplicates;
        self.store
            .add_note(&note, audio.as_ref().map(|a| a.path()), allow_duplicate)
            .await?;
        Ok(ItemOutcome::Added)
    }

    async fn translate(&self, job: &BatchJob, phrase: &str) -> Result<Translation, ProviderError> {
        let provider = self
            .providers
            .get(&job.provider)
            .ok_or_else(|| ProviderError::UnknownProvider(job.provider.clone()))?;
        let model = job.model.as_deref();

        let call = async {
            if job.context {
                provider
                    .translate_with_context(
                        phrase,
                        &job.prompts.context,
                        &job.prompts.delimiter,
                        model,
                        job.timeout,
                    )
                    .await
            } else {
                provider
                    .translate(phrase, &job.prompts.translate, model, job.timeout)
                    .await
            }
        };
        tokio::time::timeout(job.timeout, call)
            .await
            .unwrap_or(Err(ProviderError::Timeout))
    }

    // ---- waits ---

    fn stopping(&self) -> bool {
        self.flags.is_batch_stop_requested()
    }

    async fn wait_while_paused(&self) {
        while self.flags.is_batch_paused() && !self.stopping() {
            tokio::time::sleep(self.timing.poll_slice).await;
        }
    }

    async fn wait_between_items(&self) {
        let slice = self.timing.poll_slice;
        let slices = (self.timing.item_delay.as_millis() / slice.as_millis().max(1)).max(1);
        for _ in 0..slices {
            if self.stopping() {
                return;
            }
            self.wait_while_paused().await;
            tokio::time::sleep(slice).await;
        }
    }

    // ---- events ---

    fn emit(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("batch: results queue closed");
        }
    }

    fn log(&self, text: impl Into<String>) {
        self.emit(PipelineEvent::BatchLog(BatchLogLine::line(text)));
    }

    fn append(&self, text: impl Into<String>) {
        self.emit(PipelineEvent::BatchLog(BatchLogLine::append(text)));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anki::NoteId;
    use crate::pipeline::events::{event_channel, EventReceiver};
    use crate::pipeline::mocks::{MockProvider, MockStore, MockTts, StoreCall};

    fn fast() -> BatchTiming {
        BatchTiming {
            item_delay: Duration::from_millis(2),
            poll_slice: Duration::from_millis(1),
        }
    }

    fn job(phrases: &[&str]) -> BatchJob {
        BatchJob {
            phrases: phrases.iter().map(|s| s.to_string()).collect(),
            deck: "Deutsch".into(),
            audio: false,
            context: false,
            check_duplicates: true,
            duplicate_policy: DuplicatePolicy::Skip,
            voice: VoiceOptions::default(),
            prompts: PromptConfig {
                translate: "{phrase}".into(),
                context: "{phrase}".into(),
                delimiter: "КОНТЕКСТ".into(),
            },
            provider: "Mock".into(),
            model: None,
            timeout: Duration::from_secs(2),
        }
    }

    struct Harness {
        batch: BatchCoordinator,
        rx: EventReceiver,
        flags: PipelineFlags,
        store: Arc<MockStore>,
    }

    fn harness(provider: MockProvider, store: MockStore, tts: Option<Arc<MockTts>>, timing: BatchTiming) -> Harness {
        let (tx, rx) = event_channel();
        let flags = PipelineFlags::new();
        let store = Arc::new(store);
        let tts = tts.map(|t| t as Arc<dyn SpeechSynthesizer>);
        let batch = BatchCoordinator::new(
            ProviderSet::new().with(Arc::new(provider)),
            store.clone(),
            tts,
            tx,
            flags.clone(),
            timing,
        );
        Harness {
            batch,
            rx,
            flags,
            store,
        }
    }

    fn drain(rx: &mut EventReceiver) -> Vec<PipelineEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    async fn wait_for_done_line(rx: &mut EventReceiver) {
        loop {
            match rx.recv().await {
                Some(PipelineEvent::BatchLog(line)) if line.text == "✅ done" => return,
                Some(_) => continue,
                None => panic!("queue closed"),
            }
        }
    }

    /// Log text grouped per item (new line + appended pieces).
    fn item_lines(events: &[PipelineEvent]) -> Vec<String> {
        let mut lines: Vec<String> = Vec::new();
        for ev in events {
            if let PipelineEvent::BatchLog(line) = ev {
                match (line.append, lines.last_mut()) {
                    (true, Some(last)) => {
                        last.push(' ');
                        last.push_str(&line.text);
                    }
                    _ => lines.push(line.text.clone()),
                }
            }
        }
        lines
    }

    // ---- failure isolation ---

    #[tokio::test]
    async fn failing_item_does_not_abort_batch() {
        let mut h = harness(
            MockProvider::new().failing_on("drei"),
            MockStore::new(),
            None,
            fast(),
        );
        let summary = h
            .batch
            .run(job(&["eins", "zwei", "drei", "vier", "fünf"]))
            .unwrap()
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 4);
        assert_eq!(summary.failed, 1);
        assert!(!summary.stopped);
        assert_eq!(h.store.added_phrases(), vec!["eins", "zwei", "vier", "fünf"]);

        let events = drain(&mut h.rx);
        assert!(matches!(events.last(), Some(PipelineEvent::BatchDone(_))));

        let lines = item_lines(&events);
        let errors: Vec<&String> = lines.iter().filter(|l| l.contains("❌")).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("drei:"));
        assert_eq!(lines.iter().filter(|l| l.ends_with("✅ done")).count(), 4);

        let progress: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::BatchProgress { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![1, 2, 3, 4, 5]);
        assert!(!h.flags.is_batch_running());
    }

    #[tokio::test]
    async fn blank_phrases_are_skipped_silently() {
        let mut h = harness(MockProvider::new(), MockStore::new(), None, fast());
        let summary = h.batch.run(job(&["eins", "   ", "zwei"])).unwrap().await.unwrap();

        assert_eq!(summary.succeeded, 2);
        let progress = drain(&mut h.rx)
            .into_iter()
            .filter(|e| matches!(e, PipelineEvent::BatchProgress { .. }))
            .count();
        assert_eq!(progress, 2);
    }

    // ---- duplicates ---

    #[tokio::test]
    async fn trailing_blank_lines_do_not_delay_the_end() {
        let slow = BatchTiming {
            item_delay: Duration::from_secs(5),
            poll_slice: Duration::from_millis(5),
        };
        let h = harness(MockProvider::new(), MockStore::new(), None, slow);

        let started = tokio::time::Instant::now();
        let summary = h.batch.run(job(&["eins", "", "   "])).unwrap().await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn duplicates_are_skipped_without_provider_call() {
        let mut h = harness(
            MockProvider::new(),
            MockStore::new().with_note("zwei", NoteId(2)),
            None,
            fast(),
        );
        let summary = h.batch.run(job(&["eins", "zwei"])).unwrap().await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(h.store.added_phrases(), vec!["eins"]);
        let lines = item_lines(&drain(&mut h.rx));
        assert!(lines.iter().any(|l| l == "zwei: ⚠️ duplicate (skipped)"));
    }

    #[tokio::test]
    async fn replace_policy_deletes_then_adds() {
        let h = harness(
            MockProvider::new(),
            MockStore::new().with_note("eins", NoteId(1)),
            None,
            fast(),
        );
        let mut j = job(&["eins"]);
        j.duplicate_policy = DuplicatePolicy::Replace;
        let summary = h.batch.run(j).unwrap().await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(
            h.store.calls(),
            vec![
                StoreCall::Find("eins".into()),
                StoreCall::Delete(vec![NoteId(1)]),
                StoreCall::Add {
                    phrase: "eins".into(),
                    allow_duplicate: true,
                    with_audio: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn unchecked_duplicates_allow_duplicate_adds() {
        let h = harness(MockProvider::new(), MockStore::new(), None, fast());
        let mut j = job(&["eins"]);
        j.check_duplicates = false;
        h.batch.run(j).unwrap().await.unwrap();
        assert_eq!(
            h.store.calls(),
            vec![StoreCall::Add {
                phrase: "eins".into(),
                allow_duplicate: true,
                with_audio: false
            }]
        );
    }

    // ---- audio ---

    #[tokio::test]
    async fn audio_artifacts_are_removed_after_add() {
        let dir = tempfile::tempdir().unwrap();
        let tts = Arc::new(MockTts::new(dir.path()));
        let mut h = harness(MockProvider::new(), MockStore::new(), Some(tts.clone()), fast());
        let mut j = job(&["eins", "zwei"]);
        j.audio = true;
        h.batch.run(j).unwrap().await.unwrap();

        assert_eq!(tts.calls(), 2);
        assert_eq!(h.store.audio_present_at_add(), vec![true, true]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let lines = item_lines(&drain(&mut h.rx));
        assert!(lines.iter().any(|l| l == "eins: 🤖 🔊 📇 ✅ done"));
    }

    #[tokio::test]
    async fn audio_failure_is_item_error() {
        let dir = tempfile::tempdir().unwrap();
        let tts = Arc::new(MockTts::new(dir.path()).failing());
        let h = harness(MockProvider::new(), MockStore::new(), Some(tts), fast());
        let mut j = job(&["eins"]);
        j.audio = true;
        let summary = h.batch.run(j).unwrap().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert!(h.store.added_phrases().is_empty());
    }

    // ---- control ---

    #[tokio::test]
    async fn second_run_is_rejected() {
        let timing = BatchTiming {
            item_delay: Duration::from_secs(5),
            poll_slice: Duration::from_millis(5),
        };
        let mut h = harness(MockProvider::new(), MockStore::new(), None, timing);
        let first = h.batch.run(job(&["eins", "zwei"])).unwrap();

        assert_eq!(
            h.batch.run(job(&["drei"])).unwrap_err(),
            BatchError::AlreadyRunning
        );

        wait_for_done_line(&mut h.rx).await;
        h.batch.stop();
        let summary = first.await.unwrap();
        assert!(summary.stopped);
        assert_eq!(summary.succeeded, 1);
        assert!(h.batch.run(job(&["drei"])).is_ok());
    }

    #[tokio::test]
    async fn pause_during_delay_holds_next_item() {
        let timing = BatchTiming {
            item_delay: Duration::from_millis(100),
            poll_slice: Duration::from_millis(5),
        };
        let mut h = harness(MockProvider::new(), MockStore::new(), None, timing);
        let handle = h.batch.run(job(&["eins", "zwei"])).unwrap();

        // Pause inside the delay that follows the first item.
        wait_for_done_line(&mut h.rx).await;
        h.batch.pause();
        assert_eq!(h.flags.batch_phase(), crate::pipeline::BatchPhase::Paused);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let during_pause = drain(&mut h.rx);
        assert!(!during_pause
            .iter()
            .any(|e| matches!(e, PipelineEvent::BatchProgress { index: 2, .. })));
        assert_eq!(h.store.added_phrases(), vec!["eins"]);

        h.batch.resume();
        let summary = handle.await.unwrap();
        assert_eq!(summary.succeeded, 2);
        assert!(drain(&mut h.rx)
            .iter()
            .any(|e| matches!(e, PipelineEvent::BatchProgress { index: 2, .. })));
    }

    #[tokio::test]
    async fn stop_while_paused_ends_run() {
        let timing = BatchTiming {
            item_delay: Duration::from_millis(50),
            poll_slice: Duration::from_millis(5),
        };
        let mut h = harness(MockProvider::new(), MockStore::new(), None, timing);
        h.batch.pause();
        // `run` clears a stale pause, so pause again after starting.
        let handle = h.batch.run(job(&["eins", "zwei"])).unwrap();
        h.batch.pause();
        tokio::time::sleep(Duration::from_millis(20)).await;
        h.batch.stop();

        let summary = handle.await.unwrap();
        assert!(summary.stopped);
        let lines = item_lines(&drain(&mut h.rx));
        assert!(lines.iter().any(|l| l == "🛑 interrupted."));
        assert!(!h.flags.is_batch_paused());
    }
}
