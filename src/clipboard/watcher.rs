//! Polling loop that turns source changes into [`CandidatePhrase`]s.
//!
//! [`SourceWatcher::cycle`] is one poll; [`SourceWatcher::spawn`] runs it on a
//! dedicated OS thread until the [`WatcherHandle`] is stopped or dropped.

use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::clipboard::{CandidatePhrase, TextSource};
use crate::config::WatcherConfig;
use crate::pipeline::PipelineFlags;

/// What one poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Monitoring is paused; the source was not read.
    Paused,
    /// Reading failed; the caller should back off.
    ReadFailed,
    /// Empty or identical to the last observed value.
    Unchanged,
    /// A new eligible phrase was queued.
    Pushed,
    /// A new value failed the eligibility filter; recorded, not queued.
    Ignored,
    /// The inbound queue's receiver is gone.
    Disconnected,
}

/// Polls a [`TextSource`] and feeds the inbound queue.
pub struct SourceWatcher<S> {
    source: S,
    tx: mpsc::UnboundedSender<CandidatePhrase>,
    flags: PipelineFlags,
    config: WatcherConfig,
    /// Sole writer: this watcher.
    last_seen: String,
}

impl<S: TextSource + 'static> SourceWatcher<S> {
    pub fn new(
        source: S,
        tx: mpsc::UnboundedSender<CandidatePhrase>,
        flags: PipelineFlags,
        config: WatcherConfig,
    ) -> Self {
        Self {
            source,
            tx,
            flags,
            config,
            last_seen: String::new(),
        }
    }

    pub fn last_seen(&self) -> &str {
        &self.last_seen
    }

    /// Run one poll of the source.
    pub fn cycle(&mut self) -> CycleOutcome {
        if self.flags.is_monitoring_paused() {
            return CycleOutcome::Paused;
        }

        let current = match self.source.read() {
            Ok(text) => text,
            Err(e) => {
                log::warn!("watcher: {e}");
                return CycleOutcome::ReadFailed;
            }
        };

        if current == self.last_seen || current.trim().is_empty() {
            return CycleOutcome::Unchanged;
        }

        let candidate = CandidatePhrase::from_text(current.clone());
        self.last_seen = current;

        if !candidate.is_eligible(self.config.max_words) {
            log::debug!(
                "watcher: ignoring value ({} words, letters: {})",
                candidate.word_count,
                candidate.has_letters
            );
            return CycleOutcome::Ignored;
        }

        log::debug!("watcher: captured {} words", candidate.word_count);
        match self.tx.send(candidate) {
            Ok(()) => CycleOutcome::Pushed,
            Err(_) => CycleOutcome::Disconnected,
        }
    }

    /// Sleep that follows a cycle with the given outcome.
    fn pause_after(&self, outcome: CycleOutcome) -> Duration {
        match outcome {
            CycleOutcome::ReadFailed => Duration::from_millis(self.config.error_backoff_ms),
            _ => Duration::from_millis(self.config.poll_ms),
        }
    }

    /// Move the watcher onto a dedicated OS thread.
    ///
    /// The loop runs while the `watcher_running` flag is set and the inbound
    /// queue has a receiver.
    ///
    /// # Errors
    ///
    /// Fails only if the OS refuses to create the thread.
    pub fn spawn(mut self) -> std::io::Result<WatcherHandle> {
        let flags = self.flags.clone();
        flags.set_watcher_running(true);

        let thread_flags = flags.clone();
        let spawned = std::thread::Builder::new()
            .name("source-watcher".into())
            .spawn(move || {
                log::info!("watcher: started");
                while thread_flags.is_watcher_running() {
                    let outcome = self.cycle();
                    if outcome == CycleOutcome::Disconnected {
                        break;
                    }
                    std::thread::sleep(self.pause_after(outcome));
                }
                thread_flags.set_watcher_running(false);
                log::info!("watcher: stopped");
            });

        match spawned {
            Ok(thread) => Ok(WatcherHandle {
                flags,
                thread: Some(thread),
            }),
            Err(e) => {
                flags.set_watcher_running(false);
                Err(e)
            }
        }
    }
}

/// Handle to the watcher thread; dropping it stops the loop.
pub struct WatcherHandle {
    flags: PipelineFlags,
    thread: Option<JoinHandle<()>>,
}

impl WatcherHandle {
    /// Clear the running flag and wait for the current cycle to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.flags.set_watcher_running(false);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("watcher: thread panicked");
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
