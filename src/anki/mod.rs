//! Card store access.
//!
//! * [`CardStore`]: async capability over the external flashcard service.
//! * [`AnkiConnect`]: the AnkiConnect add-on's JSON-RPC API.
//! * [`StoreError`]: typed failures; a duplicate rejection carries the ids
//!   of the notes that already exist, so callers branch on the variant.

pub mod connect;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use connect::AnkiConnect;

// ---------------------------------------------------------------------------
// NoteId / NewNote
// ---------------------------------------------------------------------------

/// Identifier of a note in the card store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(pub i64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The content of a card about to be added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewNote {
    pub phrase: String,
    pub translation: String,
    /// Empty when no context was generated.
    pub context: String,
    pub deck: String,
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors returned by a [`CardStore`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The store refused the add because the phrase already has a card.
    /// `ids` may be empty if the follow-up lookup found nothing.
    #[error("cannot create note because it is a duplicate")]
    Duplicate { ids: Vec<NoteId> },

    /// The store could not be reached.
    #[error("card store unavailable: {0}")]
    Unavailable(String),

    /// The store answered with any other failure.
    #[error("{0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Rejected(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// CardStore trait
// ---------------------------------------------------------------------------

/// Async capability over the flashcard service.
///
/// Implementations are stateless request/response clients; one instance is
/// shared by every coordinator behind an `Arc<dyn CardStore>`.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Notes whose front field is exactly `phrase`.
    async fn find_notes(&self, phrase: &str) -> Result<Vec<NoteId>, StoreError>;

    /// Add a card, attaching `audio` to the front when given.
    ///
    /// With `allow_duplicate = false` an existing card for the phrase yields
    /// [`StoreError::Duplicate`].
    async fn add_note(
        &self,
        note: &NewNote,
        audio: Option<&Path>,
        allow_duplicate: bool,
    ) -> Result<NoteId, StoreError>;

    /// Delete the given notes; `true` when the store acknowledged it.
    async fn delete_notes(&self, ids: &[NoteId]) -> Result<bool, StoreError>;

    async fn list_decks(&self) -> Result<Vec<String>, StoreError>;

    /// Create `name` if missing; `true` on success.
    async fn create_deck(&self, name: &str) -> Result<bool, StoreError>;
}

// Compile-time assertion: Box<dyn CardStore> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn CardStore>) {}
};

// ---------------------------------------------------------------------------
// Deck names
// ---------------------------------------------------------------------------

/// Normalise a user-typed deck path.
///
/// Each `::` segment is trimmed and empty segments are dropped; an empty
/// result falls back to `default`.
///
/// ```
/// use phrase_cards::anki::normalize_deck_name;
///
/// assert_eq!(normalize_deck_name(" German ::  Verbs ", "Default"), "German::Verbs");
/// assert_eq!(normalize_deck_name(":: ::", "Default"), "Default");
/// ```
pub fn normalize_deck_name(raw: &str, default: &str) -> String {
    let joined = raw
        .split("::")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("::");
    if joined.is_empty() {
        default.trim().to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deck_name_keeps_single_segment() {
        assert_eq!(normalize_deck_name("Deutsch", "Default"), "Deutsch");
    }

    #[test]
    fn deck_name_drops_empty_segments() {
        assert_eq!(normalize_deck_name("A::::B::", "Default"), "A::B");
        assert_eq!(normalize_deck_name("   ", "Default"), "Default");
    }

    #[test]
    fn duplicate_error_is_typed() {
        let err = StoreError::Duplicate { ids: vec![NoteId(7)] };
        assert!(err.is_duplicate());
        assert!(!StoreError::Rejected("x".into()).is_duplicate());
        assert_eq!(err.to_string(), "cannot create note because it is a duplicate");
    }

    #[test]
    fn note_id_serializes_as_number() {
        let json = serde_json::to_string(&vec![NoteId(1), NoteId(2)]).unwrap();
        assert_eq!(json, "[1,2]");
        assert_eq!(NoteId(42).to_string(), "42");
    }
}
