//! Watching an external text source for new phrases.
//!
//! ```text
//!  TextSource::read  ──(every poll_ms)──▶ SourceWatcher::cycle
//!                                           │ eligible & changed
//!                                           ▼
//!                               inbound queue (CandidatePhrase)
//! ```
//!
//! [`SourceWatcher`] runs on its own OS thread; the source is read with a
//! plain synchronous call, so a hung clipboard never stalls the runtime.

pub mod source;
pub mod watcher;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub use source::ClipboardSource;
pub use watcher::{CycleOutcome, SourceWatcher, WatcherHandle};

// ---------------------------------------------------------------------------
// SourceError / TextSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The OS clipboard could not be opened.
    #[error("cannot access clipboard: {0}")]
    Access(String),
}

/// Something that can be polled for its current text.
pub trait TextSource: Send {
    /// Current value; empty when the source holds no text.
    fn read(&mut self) -> Result<String, SourceError>;
}

// ---------------------------------------------------------------------------
// CandidatePhrase
// ---------------------------------------------------------------------------

/// Runs of whitespace containing a line break.
static LINE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[\r\n]+\s*").expect("valid regex"));

/// Text captured from the source, with the facts used for eligibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePhrase {
    pub text: String,
    pub word_count: usize,
    pub has_letters: bool,
}

impl CandidatePhrase {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            word_count: text.split_whitespace().count(),
            has_letters: text.chars().any(char::is_alphabetic),
            text,
        }
    }

    pub fn is_eligible(&self, max_words: usize) -> bool {
        self.word_count <= max_words && self.has_letters
    }

    /// Text with soft line breaks joined.
    ///
    /// A line break that does not follow sentence punctuation is a wrap from
    /// the copied layout, so it becomes a single space.
    ///
    /// ```
    /// use phrase_cards::clipboard::CandidatePhrase;
    ///
    /// let p = CandidatePhrase::from_text("Guten\nMorgen.\nWie geht's?");
    /// assert_eq!(p.normalized(), "Guten Morgen.\nWie geht's?");
    /// ```
    pub fn normalized(&self) -> String {
        LINE_BREAK
            .replace_all(&self.text, |caps: &regex::Captures<'_>| {
                let start = caps.get(0).map_or(0, |m| m.start());
                let before = self.text[..start].chars().next_back();
                match before {
                    Some(c) if ".!?,;:".contains(c) => caps[0].to_string(),
                    _ => " ".to_string(),
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_words_and_letters() {
        let p = CandidatePhrase::from_text("  Guten   Morgen \n");
        assert_eq!(p.word_count, 2);
        assert!(p.has_letters);

        let digits = CandidatePhrase::from_text("12 34 !!");
        assert!(!digits.has_letters);
        assert!(!digits.is_eligible(100));
    }

    #[test]
    fn eligibility_limit_is_inclusive() {
        let hundred = vec!["Wort"; 100].join(" ");
        assert!(CandidatePhrase::from_text(hundred).is_eligible(100));
        let more = vec!["Wort"; 101].join(" ");
        assert!(!CandidatePhrase::from_text(more).is_eligible(100));
    }

    #[test]
    fn cyrillic_counts_as_letters() {
        assert!(CandidatePhrase::from_text("утро").has_letters);
    }

    #[test]
    fn normalized_joins_soft_breaks_only() {
        let p = CandidatePhrase::from_text("eins\r\n  zwei,\ndrei");
        assert_eq!(p.normalized(), "eins zwei,\ndrei");
    }

    #[test]
    fn normalized_leaves_single_line_alone() {
        let p = CandidatePhrase::from_text("Hallo Welt");
        assert_eq!(p.normalized(), "Hallo Welt");
    }
}
