//! The interactive single-phrase pipeline.
//!
//! # Flow
//!
//! ```text
//! submit(request)                               [active_generation = id]
//!   └─ task
//!        ├─ find_notes(phrase)
//!        │     └─ matches → policy
//!        │           Skip             → GenerationCancelled
//!        │           ReplaceOnConfirm → ExistingNotes(decision) … await
//!        │                                 declined → GenerationCancelled
//!        │           Replace          → continue, force_replace
//!        └─ provider.translate[_with_context] under timeout
//!              ├─ Ok  → TranslationOk
//!              └─ Err → TranslationError
//! ```
//!
//! Each submission produces exactly one terminal event. There is no hard
//! cancellation: stopping clears the active id, the call runs to completion
//! and the dispatcher discards its result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::anki::CardStore;
use crate::config::{AppConfig, DuplicatePolicy, PromptConfig};
use crate::llm::{ProviderError, ProviderSet, Translation};
use crate::pipeline::events::{DecisionHandle, EventSender, PipelineEvent, RequestId};
use crate::pipeline::PipelineFlags;

// ---------------------------------------------------------------------------
// GenerationRequest
// ---------------------------------------------------------------------------

/// Everything one generation needs; owned by the task that runs it.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub id: RequestId,
    pub phrase: String,
    pub with_context: bool,
    pub prompts: PromptConfig,
    /// Provider name as registered in the [`ProviderSet`].
    pub provider: String,
    /// `None` uses the provider's default model.
    pub model: Option<String>,
    pub timeout: Duration,
}

impl GenerationRequest {
    /// A request for `phrase` using the active provider settings.
    pub fn from_config(phrase: impl Into<String>, with_context: bool, config: &AppConfig) -> Self {
        Self {
            id: RequestId::next(),
            phrase: phrase.into(),
            with_context,
            prompts: config.prompts.clone(),
            provider: config.provider.kind.name().to_string(),
            model: Some(config.provider.active_model().to_string()),
            timeout: config.provider.timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationCoordinator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct GenerationCoordinator {
    providers: ProviderSet,
    store: Arc<dyn CardStore>,
    tx: EventSender,
    flags: PipelineFlags,
    policy: DuplicatePolicy,
}

impl GenerationCoordinator {
    pub fn new(
        providers: ProviderSet,
        store: Arc<dyn CardStore>,
        tx: EventSender,
        flags: PipelineFlags,
        policy: DuplicatePolicy,
    ) -> Self {
        Self {
            providers,
            store,
            tx,
            flags,
            policy,
        }
    }

    /// Start generating `request` in the background.
    ///
    /// Marks the request as the active generation. The caller checks
    /// [`PipelineFlags::is_generation_running`] first; submitting while
    /// another request is active supersedes it.
    pub fn submit(&self, request: GenerationRequest) -> JoinHandle<()> {
        log::info!(
            "generation {}: {:?} via {} (context: {})",
            request.id,
            preview(&request.phrase),
            request.provider,
            request.with_context
        );
        self.flags.begin_generation(request.id);

        let this = self.clone();
        tokio::spawn(async move {
            let event = this.run(request).await;
            if this.tx.send(event).is_err() {
                log::debug!("generation: results queue closed");
            }
        })
    }

    /// Run the request to its terminal event.
    async fn run(&self, request: GenerationRequest) -> PipelineEvent {
        let id = request.id;

        let force_replace = match self.check_existing(&request).await {
            Some(force) => force,
            None => {
                log::info!("generation {id}: abandoned, card already exists");
                return PipelineEvent::GenerationCancelled { request: id };
            }
        };

        let started = Instant::now();
        match self.translate(&request).await {
            Ok(translation) => {
                let elapsed = started.elapsed();
                log::info!("generation {id}: done in {:.1}s", elapsed.as_secs_f32());
                PipelineEvent::TranslationOk {
                    request: id,
                    phrase: request.phrase,
                    translation,
                    elapsed,
                    force_replace,
                }
            }
            Err(error) => {
                if error.is_connect() {
                    log::warn!("generation {id}: {error}");
                } else {
                    log::error!("generation {id}: {error}");
                }
                PipelineEvent::TranslationError {
                    request: id,
                    phrase: request.phrase,
                    error,
                }
            }
        }
    }

    /// Duplicate pre-check.
    ///
    /// `Some(force_replace)` to go on generating, `None` to abandon. A failed
    /// lookup counts as "no matches".
    async fn check_existing(&self, request: &GenerationRequest) -> Option<bool> {
        let ids = match self.store.find_notes(&request.phrase).await {
            Ok(ids) => ids,
            Err(e) => {
                log::warn!("generation {}: duplicate check skipped: {e}", request.id);
                return Some(false);
            }
        };
        if ids.is_empty() {
            return Some(false);
        }

        match self.policy {
            DuplicatePolicy::Skip => None,
            DuplicatePolicy::Replace => Some(true),
            DuplicatePolicy::ReplaceOnConfirm => {
                let (decision, answer) = DecisionHandle::new();
                let asked = self.tx.send(PipelineEvent::ExistingNotes {
                    request: request.id,
                    phrase: request.phrase.clone(),
                    ids,
                    decision,
                });
                if asked.is_err() {
                    return None;
                }
                // A dropped handle reads as "no".
                answer.await.unwrap_or(false).then_some(true)
            }
        }
    }

    async fn translate(&self, request: &GenerationRequest) -> Result<Translation, ProviderError> {
        let provider = self
            .providers
            .get(&request.provider)
            .ok_or_else(|| ProviderError::UnknownProvider(request.provider.clone()))?;
        let model = request.model.as_deref();

        let call = async {
            if request.with_context {
                provider
                    .translate_with_context(
                        &request.phrase,
                        &request.prompts.context,
                        &request.prompts.delimiter,
                        model,
                        request.timeout,
                    )
                    .await
            } else {
                provider
                    .translate(&request.phrase, &request.prompts.translate, model, request.timeout)
                    .await
            }
        };

        tokio::time::timeout(request.timeout, call)
            .await
            .unwrap_or(Err(ProviderError::Timeout))
    }
}

/// First 40 characters, for log lines.
pub(crate) fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(40).collect();
    if text.chars().count() > 40 {
        out.push_str("...");
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anki::NoteId;
    use crate::pipeline::events::{event_channel, EventReceiver};
    use crate::pipeline::mocks::{MockProvider, MockStore, StoreCall};

    fn request(phrase: &str, with_context: bool) -> GenerationRequest {
        GenerationRequest {
            id: RequestId::next(),
            phrase: phrase.into(),
            with_context,
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

    fn setup(
        provider: MockProvider,
        store: MockStore,
        policy: DuplicatePolicy,
    ) -> (GenerationCoordinator, EventReceiver, PipelineFlags, Arc<MockProvider>, Arc<MockStore>) {
        let provider = Arc::new(provider);
        let store = Arc::new(store);
        let (tx, rx) = event_channel();
        let flags = PipelineFlags::new();
        let coordinator = GenerationCoordinator::new(
            ProviderSet::new().with(provider.clone()),
            store.clone(),
            tx,
            flags.clone(),
            policy,
        );
        (coordinator, rx, flags, provider, store)
    }

    fn drain(rx: &mut EventReceiver) -> Vec<PipelineEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    // ---- terminal events ---

    #[tokio::test]
    async fn success_emits_one_translation_ok() {
        let (gen, mut rx, flags, _, _) =
            setup(MockProvider::new(), MockStore::new(), DuplicatePolicy::ReplaceOnConfirm);

        let req = request("Guten Morgen", false);
        let id = req.id;
        gen.submit(req).await.unwrap();

        assert!(flags.is_active_generation(id));
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            PipelineEvent::TranslationOk {
                request,
                translation,
                force_replace,
                ..
            } => {
                assert_eq!(*request, id);
                assert_eq!(translation.translation, "Guten Morgen (übersetzt)");
                assert_eq!(translation.context, "");
                assert!(!force_replace);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_emits_one_translation_error() {
        let (gen, mut rx, _, _, _) = setup(
            MockProvider::new().failing_on("Hallo"),
            MockStore::new(),
            DuplicatePolicy::ReplaceOnConfirm,
        );
        gen.submit(request("Hallo", false)).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            PipelineEvent::TranslationError { error, .. } => assert!(!error.is_connect()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_failure_is_distinguishable() {
        let (gen, mut rx, _, _, _) = setup(
            MockProvider::new().unreachable(),
            MockStore::new(),
            DuplicatePolicy::ReplaceOnConfirm,
        );
        gen.submit(request("Hallo", false)).await.unwrap();

        match drain(&mut rx).as_slice() {
            [PipelineEvent::TranslationError { error, .. }] => assert!(error.is_connect()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let (gen, mut rx, _, _, _) = setup(
            MockProvider::new().with_delay(Duration::from_millis(500)),
            MockStore::new(),
            DuplicatePolicy::ReplaceOnConfirm,
        );
        let mut req = request("Hallo", false);
        req.timeout = Duration::from_millis(20);
        gen.submit(req).await.unwrap();

        match drain(&mut rx).as_slice() {
            [PipelineEvent::TranslationError { error, .. }] => {
                assert_eq!(*error, ProviderError::Timeout)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_provider_is_an_error() {
        let (gen, mut rx, _, _, _) =
            setup(MockProvider::new(), MockStore::new(), DuplicatePolicy::ReplaceOnConfirm);
        let mut req = request("Hallo", false);
        req.provider = "Nope".into();
        gen.submit(req).await.unwrap();

        match drain(&mut rx).as_slice() {
            [PipelineEvent::TranslationError { error, .. }] => {
                assert_eq!(*error, ProviderError::UnknownProvider("Nope".into()))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn context_is_split_from_reply() {
        let (gen, mut rx, _, _, _) = setup(
            MockProvider::new().with_reply("Перевод: Доброе утро\nКОНТЕКСТ: **приветствие**"),
            MockStore::new(),
            DuplicatePolicy::ReplaceOnConfirm,
        );
        gen.submit(request("Guten Morgen", true)).await.unwrap();

        match drain(&mut rx).as_slice() {
            [PipelineEvent::TranslationOk { translation, .. }] => {
                assert_eq!(translation.translation, "Доброе утро");
                assert_eq!(translation.context, "приветствие");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    // ---- duplicate pre-check ---

    #[tokio::test]
    async fn existing_card_declined_skips_provider() {
        let (gen, mut rx, _, provider, _) = setup(
            MockProvider::new(),
            MockStore::new().with_note("Guten Morgen", NoteId(1)),
            DuplicatePolicy::ReplaceOnConfirm,
        );
        let handle = gen.submit(request("Guten Morgen", false));

        match rx.recv().await {
            Some(PipelineEvent::ExistingNotes { ids, decision, .. }) => {
                assert_eq!(ids, vec![NoteId(1)]);
                decision.decline();
            }
            other => panic!("unexpected {other:?}"),
        }
        handle.await.unwrap();

        assert!(matches!(
            drain(&mut rx).as_slice(),
            [PipelineEvent::GenerationCancelled { .. }]
        ));
        assert!(provider.prompts().is_empty());
    }

    #[tokio::test]
    async fn existing_card_confirmed_forces_replace() {
        let (gen, mut rx, _, _, _) = setup(
            MockProvider::new(),
            MockStore::new().with_note("Guten Morgen", NoteId(1)),
            DuplicatePolicy::ReplaceOnConfirm,
        );
        let handle = gen.submit(request("Guten Morgen", false));

        match rx.recv().await {
            Some(PipelineEvent::ExistingNotes { decision, .. }) => decision.confirm(),
            other => panic!("unexpected {other:?}"),
        }
        handle.await.unwrap();

        match drain(&mut rx).as_slice() {
            [PipelineEvent::TranslationOk { force_replace, .. }] => assert!(force_replace),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn skip_policy_abandons_without_asking() {
        let (gen, mut rx, _, provider, store) = setup(
            MockProvider::new(),
            MockStore::new().with_note("Hallo", NoteId(9)),
            DuplicatePolicy::Skip,
        );
        gen.submit(request("Hallo", false)).await.unwrap();

        assert!(matches!(
            drain(&mut rx).as_slice(),
            [PipelineEvent::GenerationCancelled { .. }]
        ));
        assert!(provider.prompts().is_empty());
        assert_eq!(store.calls(), vec![StoreCall::Find("Hallo".into())]);
    }

    #[tokio::test]
    async fn store_outage_does_not_block_generation() {
        let (gen, mut rx, _, _, _) = setup(
            MockProvider::new(),
            MockStore::new().unavailable(),
            DuplicatePolicy::ReplaceOnConfirm,
        );
        gen.submit(request("Hallo", false)).await.unwrap();
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [PipelineEvent::TranslationOk { .. }]
        ));
    }

    #[test]
    fn preview_truncates_long_text() {
        assert_eq!(preview("kurz"), "kurz");
        let long = "x".repeat(50);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(40)));
    }
}
