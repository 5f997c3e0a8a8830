//! Control flags shared between the dispatch loop and the workers.
//!
//! [`PipelineFlags`] is a cheap-to-clone handle over a handful of atomics.
//! Each flag has a documented writer; every other party only reads it and
//! re-polls on its next cycle, so relaxed-but-eventually-visible reads are
//! fine.
//!
//! | flag                  | written by                                   |
//! |-----------------------|----------------------------------------------|
//! | `monitoring_paused`   | UI collaborator (dispatch thread)            |
//! | `active_generation`   | dispatch thread (submit, terminal event, stop) |
//! | `watcher_running`     | `WatcherHandle` (spawn / stop)               |
//! | `batch_running`       | batch task (start / exit)                    |
//! | `batch_paused`        | UI collaborator; cleared by batch task on exit |
//! | `batch_stop`          | UI collaborator; cleared by batch task on start |

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use crate::pipeline::events::RequestId;

// ---------------------------------------------------------------------------
// BatchPhase
// ---------------------------------------------------------------------------

/// Batch run state as seen from the flags.
///
/// ```text
/// Idle ──run()──▶ Running ⇄ Paused
///                   │         │
///                 stop()    stop()
///                   ▼         ▼
///                Stopping ──exit──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPhase {
    #[default]
    Idle,
    Running,
    Paused,
    Stopping,
}

impl BatchPhase {
    /// Returns `true` while a batch task is alive.
    ///
    /// ```
    /// use phrase_cards::pipeline::BatchPhase;
    ///
    /// assert!(!BatchPhase::Idle.is_busy());
    /// assert!(BatchPhase::Running.is_busy());
    /// assert!(BatchPhase::Paused.is_busy());
    /// assert!(BatchPhase::Stopping.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        !matches!(self, BatchPhase::Idle)
    }

    /// A short human-readable label suitable for a status bar.
    pub fn label(&self) -> &'static str {
        match self {
            BatchPhase::Idle => "Idle",
            BatchPhase::Running => "Running",
            BatchPhase::Paused => "Paused",
            BatchPhase::Stopping => "Stopping",
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineFlags
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Flags {
    monitoring_paused: AtomicBool,
    /// Id of the in-flight interactive request, `0` when idle.
    active_generation: AtomicU64,
    watcher_running: AtomicBool,
    batch_running: AtomicBool,
    batch_paused: AtomicBool,
    batch_stop: AtomicBool,
}

/// Thread-visible control flags, passed to each coordinator at construction.
#[derive(Debug, Clone, Default)]
pub struct PipelineFlags {
    inner: Arc<Flags>,
}

impl PipelineFlags {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- source monitoring ---

    pub fn is_monitoring_paused(&self) -> bool {
        self.inner.monitoring_paused.load(Ordering::Relaxed)
    }

    pub fn set_monitoring_paused(&self, paused: bool) {
        self.inner.monitoring_paused.store(paused, Ordering::Relaxed);
    }

    pub fn is_watcher_running(&self) -> bool {
        self.inner.watcher_running.load(Ordering::Acquire)
    }

    pub(crate) fn set_watcher_running(&self, running: bool) {
        self.inner.watcher_running.store(running, Ordering::Release);
    }

    // ---- interactive generation ---

    /// Mark `id` as the in-flight request; replaces any earlier one.
    pub fn begin_generation(&self, id: RequestId) {
        self.inner.active_generation.store(id.get(), Ordering::Release);
    }

    pub fn active_generation(&self) -> Option<RequestId> {
        RequestId::from_raw(self.inner.active_generation.load(Ordering::Acquire))
    }

    pub fn is_generation_running(&self) -> bool {
        self.active_generation().is_some()
    }

    pub fn is_active_generation(&self, id: RequestId) -> bool {
        self.active_generation() == Some(id)
    }

    /// Clear the flag if `id` is still the active request.
    ///
    /// Returns `false` when another request (or none) is active.
    pub fn finish_generation(&self, id: RequestId) -> bool {
        self.inner
            .active_generation
            .compare_exchange(id.get(), 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Stop reacting to whatever request is in flight.
    pub fn stop_generation(&self) {
        self.inner.active_generation.store(0, Ordering::Release);
    }

    // ---- batch ---

    /// Claim the batch slot; `false` if a batch is already running.
    pub(crate) fn try_start_batch(&self) -> bool {
        let claimed = self
            .inner
            .batch_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed {
            self.inner.batch_stop.store(false, Ordering::Release);
            self.inner.batch_paused.store(false, Ordering::Release);
        }
        claimed
    }

    pub(crate) fn finish_batch(&self) {
        self.inner.batch_paused.store(false, Ordering::Release);
        self.inner.batch_running.store(false, Ordering::Release);
    }

    pub fn is_batch_running(&self) -> bool {
        self.inner.batch_running.load(Ordering::Acquire)
    }

    pub fn is_batch_paused(&self) -> bool {
        self.inner.batch_paused.load(Ordering::Acquire)
    }

    pub fn set_batch_paused(&self, paused: bool) {
        self.inner.batch_paused.store(paused, Ordering::Release);
    }

    pub fn is_batch_stop_requested(&self) -> bool {
        self.inner.batch_stop.load(Ordering::Acquire)
    }

    pub fn request_batch_stop(&self) {
        self.inner.batch_stop.store(true, Ordering::Release);
    }

    pub fn batch_phase(&self) -> BatchPhase {
        if !self.is_batch_running() {
            BatchPhase::Idle
        } else if self.is_batch_stop_requested() {
            BatchPhase::Stopping
        } else if self.is_batch_paused() {
            BatchPhase::Paused
        } else {
            BatchPhase::Running
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- BatchPhase ---

    #[test]
    fn default_batch_phase_is_idle() {
        assert_eq!(BatchPhase::default(), BatchPhase::Idle);
        assert_eq!(BatchPhase::Idle.label(), "Idle");
        assert_eq!(BatchPhase::Paused.label(), "Paused");
    }

    // ---- generation ---

    #[test]
    fn generation_flag_tracks_active_request() {
        let flags = PipelineFlags::new();
        assert!(!flags.is_generation_running());

        let a = RequestId::next();
        let b = RequestId::next();
        flags.begin_generation(a);
        assert!(flags.is_active_generation(a));
        assert!(!flags.is_active_generation(b));

        assert!(!flags.finish_generation(b));
        assert!(flags.is_generation_running());
        assert!(flags.finish_generation(a));
        assert!(!flags.is_generation_running());
    }

    #[test]
    fn stop_generation_clears_flag() {
        let flags = PipelineFlags::new();
        let id = RequestId::next();
        flags.begin_generation(id);
        flags.stop_generation();
        assert_eq!(flags.active_generation(), None);
        assert!(!flags.finish_generation(id));
    }

    // ---- batch ---

    #[test]
    fn batch_slot_is_exclusive() {
        let flags = PipelineFlags::new();
        assert!(flags.try_start_batch());
        assert!(!flags.try_start_batch());
        flags.finish_batch();
        assert!(flags.try_start_batch());
    }

    #[test]
    fn batch_phase_follows_flags() {
        let flags = PipelineFlags::new();
        assert_eq!(flags.batch_phase(), BatchPhase::Idle);

        flags.request_batch_stop();
        assert!(flags.try_start_batch());
        // A stale stop request does not leak into the new run.
        assert_eq!(flags.batch_phase(), BatchPhase::Running);

        flags.set_batch_paused(true);
        assert_eq!(flags.batch_phase(), BatchPhase::Paused);

        flags.request_batch_stop();
        assert_eq!(flags.batch_phase(), BatchPhase::Stopping);

        flags.finish_batch();
        assert_eq!(flags.batch_phase(), BatchPhase::Idle);
        assert!(!flags.is_batch_paused());
    }

    #[test]
    fn clones_share_state() {
        let flags = PipelineFlags::new();
        let other = flags.clone();
        flags.set_monitoring_paused(true);
        assert!(other.is_monitoring_paused());
    }

    #[test]
    fn flags_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PipelineFlags>();
    }
}
