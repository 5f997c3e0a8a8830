//! Background refresh of the model and deck lists shown to the operator.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::anki::CardStore;
use crate::llm::TranslationProvider;
use crate::pipeline::events::{EventSender, PipelineEvent};

/// Query `provider` for its models and `store` for its decks, reporting both
/// on the results queue.
///
/// The two lookups are independent; one being down does not hide the other.
pub fn spawn_catalog_refresh(
    provider: Arc<dyn TranslationProvider>,
    store: Arc<dyn CardStore>,
    tx: EventSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (models, decks) = tokio::join!(
            model_event(provider.as_ref()),
            deck_event(store.as_ref())
        );
        for event in [models, decks] {
            if tx.send(event).is_err() {
                log::debug!("catalog: results queue closed");
                return;
            }
        }
    })
}

async fn model_event(provider: &dyn TranslationProvider) -> PipelineEvent {
    let name = provider.name().to_string();
    if !provider.is_available().await {
        log::info!("catalog: {name} is not reachable");
        return PipelineEvent::ModelsUnavailable { provider: name };
    }
    let models = provider.list_models().await;
    log::debug!("catalog: {} model(s) from {name}", models.len());
    PipelineEvent::ModelsLoaded {
        provider: name,
        models,
    }
}

async fn deck_event(store: &dyn CardStore) -> PipelineEvent {
    match store.list_decks().await {
        Ok(decks) => PipelineEvent::DecksLoaded(decks),
        Err(e) => {
            log::info!("catalog: deck list unavailable: {e}");
            PipelineEvent::DecksUnavailable(e.to_string())
        }
    }
}
