//! System clipboard as a [`TextSource`], backed by the `arboard` crate.
//!
//! Each read opens a short-lived [`arboard::Clipboard`] handle rather than
//! holding one, because `arboard::Clipboard` is not `Send` on all platforms
//! and the handle is cheap to create.

use arboard::Clipboard;

use super::{SourceError, TextSource};

/// Reads plain text from the OS clipboard.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClipboardSource;

impl ClipboardSource {
    pub fn new() -> Self {
        Self
    }
}

impl TextSource for ClipboardSource {
    /// Returns an empty string when the clipboard is empty or holds non-text
    /// data (e.g. an image).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Access`] if the OS clipboard cannot be opened.
    fn read(&mut self) -> Result<String, SourceError> {
        let mut clipboard = Clipboard::new().map_err(|e| SourceError::Access(e.to_string()))?;
        // `get_text` fails for empty or non-text content; both read as "".
        Ok(clipboard.get_text().unwrap_or_default())
    }
}
