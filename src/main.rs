//! Application entry point: a console front end for the card pipeline.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Parse the command line and load [`AppConfig`] (default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the provider set, card store and synthesizer from config.
//! 5. Create the results queue, flags and the [`EventDispatcher`].
//! 6. Refresh the model and deck catalogs in the background.
//! 7. Run either clipboard mode (default) or batch mode (`--batch FILE`)
//!    until Ctrl-C or, for a batch, until the run is done.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use phrase_cards::{
    anki::{normalize_deck_name, AnkiConnect, CardStore, NoteId},
    clipboard::{ClipboardSource, SourceWatcher},
    config::{AppConfig, AppPaths},
    llm::{ProviderError, ProviderSet, Translation},
    pipeline::{
        event_channel, spawn_catalog_refresh, BatchCoordinator, BatchJob, BatchLogLine,
        BatchSummary, BatchTiming, CommitCoordinator, CommitRequest, DecisionHandle,
        DuplicateDecision, EventDispatcher, EventSender, GenerationCoordinator,
        GenerationRequest, PipelineFlags, RequestId, ResultSink,
    },
    tts::{GoogleTts, SpeechSynthesizer, SynthesisError, VoiceOptions},
};

/// How often the dispatcher drains one event.
const DISPATCH_PERIOD: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Debug, Parser)]
#[command(name = "phrase-cards", version, about = "Turn copied phrases into flashcards")]
struct Args {
    /// Settings file to use instead of the platform default. Pending audio
    /// is kept in `user_files/` next to it.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Process the phrases in FILE (one per line) instead of watching the
    /// clipboard.
    #[arg(long, value_name = "FILE")]
    batch: Option<PathBuf>,

    /// Target deck; defaults to the configured deck.
    #[arg(long)]
    deck: Option<String>,

    /// Ask for context notes alongside each translation.
    #[arg(long)]
    context: bool,
}

// ---------------------------------------------------------------------------
// ConsoleSink
// ---------------------------------------------------------------------------

/// Prints results and answers pipeline questions from the configured
/// behaviour.
struct ConsoleSink {
    commit: CommitCoordinator,
    deck: String,
    voice: Option<VoiceOptions>,
    auto_commit: bool,
    assume_replace: bool,
    /// Fired when a batch reports it is done.
    finished: CancellationToken,
}

impl ResultSink for ConsoleSink {
    fn status(&self, text: &str) {
        log::info!("{text}");
    }

    fn translation_ok(
        &self,
        request: RequestId,
        phrase: &str,
        translation: &Translation,
        _elapsed: Duration,
        force_replace: bool,
    ) {
        println!("{phrase}\n  → {}", translation.translation);
        if !translation.context.is_empty() {
            println!("  {}", translation.context.replace('\n', "\n  "));
        }
        if !self.auto_commit {
            return;
        }

        let mut commit = CommitRequest::new(
            request,
            phrase,
            translation.translation.clone(),
            translation.context.clone(),
            self.deck.clone(),
        );
        commit.force_replace = force_replace;
        self.commit.synthesize_and_commit(commit, self.voice.clone());
    }

    fn translation_error(&self, _request: RequestId, phrase: &str, error: &ProviderError) {
        log::error!("{phrase:?}: {error}");
    }

    fn existing_notes(
        &self,
        _request: RequestId,
        phrase: &str,
        ids: &[NoteId],
        decision: DecisionHandle,
    ) {
        if self.assume_replace {
            log::info!("{phrase:?} has {} card(s); replacing", ids.len());
            decision.confirm();
        } else {
            log::info!("{phrase:?} already has a card; skipped");
            decision.decline();
        }
    }

    fn audio_error(&self, _request: RequestId, error: &SynthesisError) {
        log::warn!("audio: {error}");
    }

    fn duplicate_found(&self, decision: DuplicateDecision) {
        if self.assume_replace {
            self.commit.confirm(decision);
        } else {
            self.commit.decline(decision);
        }
    }

    fn commit_ok(&self, _request: RequestId, note: NoteId) {
        println!("  added note {note}");
    }

    fn commit_error(&self, _request: RequestId, message: &str) {
        log::error!("card not added: {message}");
    }

    fn batch_log(&self, line: &BatchLogLine) {
        let mut out = std::io::stdout().lock();
        let written = if line.append {
            write!(out, " {}", line.text)
        } else {
            write!(out, "\n{}", line.text)
        };
        if written.and_then(|_| out.flush()).is_err() {
            log::debug!("stdout closed");
        }
    }

    fn batch_done(&self, summary: &BatchSummary) {
        println!(
            "\n{} added, {} failed, {} skipped of {}",
            summary.succeeded, summary.failed, summary.skipped, summary.total
        );
        self.finished.cancel();
    }

    fn models_loaded(&self, provider: &str, models: &[String]) {
        log::debug!("{provider} models: {}", models.join(", "));
    }

    fn decks_unavailable(&self, message: &str) {
        log::warn!("cannot list decks: {message}");
    }
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// Everything both modes share.
struct Pipeline {
    config: AppConfig,
    deck: String,
    with_context: bool,
    providers: ProviderSet,
    store: Arc<dyn CardStore>,
    tts: Option<Arc<dyn SpeechSynthesizer>>,
    flags: PipelineFlags,
    tx: EventSender,
}

async fn run_clipboard(p: Pipeline, dispatcher: EventDispatcher) -> Result<()> {
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    p.flags.set_monitoring_paused(p.config.watcher.start_paused);
    let watcher = SourceWatcher::new(
        ClipboardSource::new(),
        inbound_tx,
        p.flags.clone(),
        p.config.watcher.clone(),
    )
    .spawn()
    .context("cannot start the clipboard watcher")?;

    let generation = GenerationCoordinator::new(
        p.providers.clone(),
        Arc::clone(&p.store),
        p.tx.clone(),
        p.flags.clone(),
        p.config.behaviour.duplicate_policy,
    );

    let stop = CancellationToken::new();
    let dispatch = dispatcher.run(DISPATCH_PERIOD, stop.clone());
    tokio::pin!(dispatch);
    log::info!("watching the clipboard; Ctrl-C to quit");

    loop {
        tokio::select! {
            Some(candidate) = inbound_rx.recv() => {
                let phrase = candidate.normalized();
                if !p.config.behaviour.auto_generate {
                    println!("captured: {phrase}");
                    continue;
                }
                if p.flags.is_generation_running() {
                    log::info!("still translating; ignored {phrase:?}");
                    continue;
                }
                let request = GenerationRequest::from_config(phrase, p.with_context, &p.config);
                generation.submit(request);
            }
            _ = &mut dispatch => break,
            _ = tokio::signal::ctrl_c() => {
                stop.cancel();
                break;
            }
        }
    }

    p.flags.stop_generation();
    watcher.stop();
    Ok(())
}

async fn run_batch(
    p: Pipeline,
    file: &Path,
    dispatcher: EventDispatcher,
    finished: CancellationToken,
) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("cannot read {}", file.display()))?;
    let phrases: Vec<String> = text.lines().map(str::to_string).collect();

    let batch = BatchCoordinator::new(
        p.providers,
        p.store,
        p.tts,
        p.tx,
        p.flags,
        BatchTiming::from(&p.config.batch),
    );
    let mut job = BatchJob::from_config(phrases, p.deck, &p.config);
    job.context |= p.with_context;
    let _run = batch.run(job)?;

    let stopper = batch.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("stopping the batch after the current item");
            stopper.stop();
        }
    });

    dispatcher.run(DISPATCH_PERIOD, finished).await;
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Command line + configuration
    let args = Args::parse();
    let paths = match &args.config {
        Some(path) => AppPaths::beside(path),
        None => AppPaths::new(),
    };
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        }),
    };
    let deck = normalize_deck_name(
        args.deck.as_deref().unwrap_or(&config.anki.deck),
        &config.anki.deck,
    );
    log::info!("phrase-cards starting (deck {deck:?})");

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime");

    // 4. Capabilities
    let providers = ProviderSet::from_config(&config.provider);
    let store: Arc<dyn CardStore> = Arc::new(AnkiConnect::from_config(&config.anki));
    let tts: Option<Arc<dyn SpeechSynthesizer>> = if config.tts.enabled {
        Some(Arc::new(GoogleTts::new(paths.audio_dir.clone())))
    } else {
        None
    };

    // 5. Results queue + dispatcher
    let flags = PipelineFlags::new();
    let (tx, rx) = event_channel();
    let finished = CancellationToken::new();
    let sink: Arc<dyn ResultSink> = Arc::new(ConsoleSink {
        commit: CommitCoordinator::new(Arc::clone(&store), tts.clone(), tx.clone()),
        deck: deck.clone(),
        voice: Some(VoiceOptions::from(&config.tts)),
        auto_commit: config.behaviour.auto_commit,
        assume_replace: config.behaviour.assume_replace,
        finished: finished.clone(),
    });
    let dispatcher = EventDispatcher::new(rx, Arc::downgrade(&sink), flags.clone());

    let pipeline = Pipeline {
        with_context: args.context || config.behaviour.with_context,
        config,
        deck,
        providers,
        store,
        tts,
        flags,
        tx,
    };

    rt.block_on(async move {
        // 6. Catalogs
        let active = pipeline.config.provider.kind.name();
        match pipeline.providers.get(active) {
            Some(provider) => {
                spawn_catalog_refresh(provider, Arc::clone(&pipeline.store), pipeline.tx.clone());
            }
            None => log::warn!("provider {active} is not registered"),
        }

        // 7. Mode
        match &args.batch {
            Some(file) => run_batch(pipeline, file, dispatcher, finished).await,
            None => run_clipboard(pipeline, dispatcher).await,
        }
    })?;

    drop(sink);
    log::info!("phrase-cards stopped");
    Ok(())
}
