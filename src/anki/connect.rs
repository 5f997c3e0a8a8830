//! AnkiConnect client (JSON-RPC version 6 over HTTP).
//!
//! Every call is a `POST {action, version, params}` to the add-on's URL; the
//! reply is `{result, error}` with exactly one of the two set.

use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::anki::{CardStore, NewNote, NoteId, StoreError};
use crate::config::AnkiConfig;

const API_VERSION: u32 = 6;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Talks to a running Anki instance through the AnkiConnect add-on.
pub struct AnkiConnect {
    client: reqwest::Client,
    url: String,
    note_type: String,
    front_field: String,
    back_field: String,
    context_field: Option<String>,
    tags: Vec<String>,
}

impl AnkiConnect {
    pub fn from_config(config: &AnkiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            note_type: config.note_type.clone(),
            front_field: config.front_field.clone(),
            back_field: config.back_field.clone(),
            context_field: config
                .context_field
                .clone()
                .filter(|f| !f.trim().is_empty()),
            tags: config.tags.clone(),
        }
    }

    async fn invoke<T: DeserializeOwned>(&self, action: &str, params: Value) -> Result<T, StoreError> {
        log::debug!("anki: {action}");
        let body = json!({
            "action": action,
            "version": API_VERSION,
            "params": params,
        });

        let reply: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(message) = reply.error {
            return Err(StoreError::Rejected(message));
        }
        serde_json::from_value(reply.result)
            .map_err(|e| StoreError::Rejected(format!("unexpected AnkiConnect reply to {action}: {e}")))
    }

    /// Search expression matching notes whose front is exactly `phrase`.
    ///
    /// Fronts are stored HTML-escaped, so the search term is escaped the same
    /// way before the search syntax escaping.
    fn front_query(&self, phrase: &str) -> String {
        format!(
            "\"{}:{}\"",
            self.front_field,
            escape_search(&html_field(phrase))
        )
    }

    /// The `note` object for `addNote`.
    fn note_payload(&self, note: &NewNote, audio: Option<&Path>, allow_duplicate: bool) -> Value {
        let mut fields = serde_json::Map::new();
        fields.insert(self.front_field.clone(), Value::String(html_field(&note.phrase)));

        let translation = html_field(&note.translation);
        let context = html_field(note.context.trim());
        match &self.context_field {
            Some(field) => {
                fields.insert(self.back_field.clone(), Value::String(translation));
                fields.insert(field.clone(), Value::String(context));
            }
            None if !context.is_empty() => {
                fields.insert(
                    self.back_field.clone(),
                    Value::String(format!("{translation}<br><br>{context}")),
                );
            }
            None => {
                fields.insert(self.back_field.clone(), Value::String(translation));
            }
        }

        let mut payload = json!({
            "deckName": note.deck,
            "modelName": self.note_type,
            "fields": fields,
            "options": {
                "allowDuplicate": allow_duplicate,
                "duplicateScope": "deck",
            },
            "tags": self.tags,
        });

        if let Some(path) = audio {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "audio.mp3".into());
            payload["audio"] = json!([{
                "path": path.to_string_lossy(),
                "filename": filename,
                "fields": [self.front_field],
            }]);
        }
        payload
    }
}

#[async_trait]
impl CardStore for AnkiConnect {
    async fn find_notes(&self, phrase: &str) -> Result<Vec<NoteId>, StoreError> {
        self.invoke("findNotes", json!({ "query": self.front_query(phrase) }))
            .await
    }

    async fn add_note(
        &self,
        note: &NewNote,
        audio: Option<&Path>,
        allow_duplicate: bool,
    ) -> Result<NoteId, StoreError> {
        self.create_deck(&note.deck).await?;

        let params = json!({ "note": self.note_payload(note, audio, allow_duplicate) });
        match self.invoke::<Option<NoteId>>("addNote", params).await {
            Ok(Some(id)) => Ok(id),
            Ok(None) => Err(StoreError::Rejected("AnkiConnect did not return a note id".into())),
            Err(StoreError::Rejected(message)) if is_duplicate_message(&message) => {
                let ids = self.find_notes(&note.phrase).await.unwrap_or_default();
                Err(StoreError::Duplicate { ids })
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_notes(&self, ids: &[NoteId]) -> Result<bool, StoreError> {
        if ids.is_empty() {
            return Ok(true);
        }
        self.invoke::<Value>("deleteNotes", json!({ "notes": ids }))
            .await?;
        Ok(true)
    }

    async fn list_decks(&self) -> Result<Vec<String>, StoreError> {
        let mut decks: Vec<String> = self.invoke("deckNames", json!({})).await?;
        decks.sort();
        Ok(decks)
    }

    async fn create_deck(&self, name: &str) -> Result<bool, StoreError> {
        let id: Option<i64> = self.invoke("createDeck", json!({ "deck": name })).await?;
        Ok(id.is_some())
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn is_duplicate_message(message: &str) -> bool {
    message.to_lowercase().contains("duplicate")
}

/// Escape Anki search metacharacters inside a quoted term.
fn escape_search(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '"' | '*' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// HTML-escape a field value and turn line breaks into `<br>`.
fn html_field(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\r' => {}
            '\n' => out.push_str("<br>"),
            other => out.push(other),
        }
    }
    out
}
