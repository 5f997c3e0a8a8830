//! The generation-and-commit pipeline.
//!
//! Coordinators only ever produce [`PipelineEvent`]s onto one results queue;
//! the [`EventDispatcher`] is its single consumer and the seam to whatever
//! presents results to the operator.
//!
//! # Architecture
//!
//! ```text
//! SourceWatcher (thread) ── CandidatePhrase ──▶ inbound queue ──▶ collaborator
//!                                                                    │
//!          ┌──────────────── submit / commit / run ─────────────────┘
//!          ▼
//! GenerationCoordinator ─┐
//! CommitCoordinator     ─┼── PipelineEvent ──▶ results queue
//! BatchCoordinator      ─┤                        │
//! catalog refresh       ─┘                        ▼
//!                                    EventDispatcher::tick() (one per tick)
//!                                                 │
//!                                                 ▼
//!                                        ResultSink callbacks
//!
//! PipelineFlags (atomics) ←── shared by every coordinator and the dispatcher
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use phrase_cards::anki::AnkiConnect;
//! use phrase_cards::config::AppConfig;
//! use phrase_cards::llm::ProviderSet;
//! use phrase_cards::pipeline::{
//!     event_channel, EventDispatcher, GenerationCoordinator, GenerationRequest, PipelineFlags,
//!     ResultSink,
//! };
//!
//! struct Console;
//! impl ResultSink for Console {
//!     fn status(&self, text: &str) {
//!         println!("{text}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let flags = PipelineFlags::new();
//!     let (tx, rx) = event_channel();
//!
//!     let generation = GenerationCoordinator::new(
//!         ProviderSet::from_config(&config.provider),
//!         Arc::new(AnkiConnect::from_config(&config.anki)),
//!         tx,
//!         flags.clone(),
//!         config.behaviour.duplicate_policy,
//!     );
//!     generation.submit(GenerationRequest::from_config("Guten Morgen", false, &config));
//!
//!     let sink: Arc<dyn ResultSink> = Arc::new(Console);
//!     let mut dispatcher = EventDispatcher::new(rx, Arc::downgrade(&sink), flags);
//!     loop {
//!         dispatcher.tick();
//!         tokio::time::sleep(Duration::from_millis(50)).await;
//!     }
//! }
//! ```

pub mod batch;
pub mod catalog;
pub mod commit;
pub mod dispatcher;
pub mod events;
pub mod generation;
pub mod state;

#[cfg(test)]
pub(crate) mod mocks;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use batch::{BatchCoordinator, BatchError, BatchJob, BatchTiming};
pub use catalog::spawn_catalog_refresh;
pub use commit::{CommitCoordinator, CommitRequest, DuplicateDecision};
pub use dispatcher::{status_line, EventDispatcher, ResultSink};
pub use events::{
    event_channel, BatchLogLine, BatchSummary, DecisionHandle, EventReceiver, EventSender,
    PipelineEvent, RequestId,
};
pub use generation::{GenerationCoordinator, GenerationRequest};
pub use state::{BatchPhase, PipelineFlags};
