//! Post-processing of raw model output.
//!
//! * [`split_context`] separates a "translation + context" answer at the first
//!   context marker.
//! * [`clean_markdown`] removes emphasis, headings, list bullets and table
//!   pipes that models add despite being told not to.

use once_cell::sync::Lazy;
use regex::Regex;

/// Markers that always introduce a context section, in addition to the
/// configured delimiter.
const FALLBACK_MARKERS: [&str; 2] = ["КОНТЕКСТ", "CONTEXT"];

/// A leading `label:` such as `ПЕРЕВОД:` or `**Translation**:`.
static LEADING_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[*_]*[^:\n\r]{2,30}:[:*_ \t]*").expect("valid regex"));

static BOLD_STARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"));
static BOLD_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"__(.+?)__").expect("valid regex"));
static ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.+?)\*").expect("valid regex"));
static ITALIC_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(.+?)_").expect("valid regex"));
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#+\s+").expect("valid regex"));
static LIST_BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*[*\-+]\s+").expect("valid regex"));
static TABLE_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\|[\s-]+\|").expect("valid regex"));

/// Build the case-insensitive marker pattern for `delimiter`.
///
/// The marker may be wrapped in `*`/`_` emphasis and followed by a colon.
/// Longer markers come first so that a delimiter which extends a fallback
/// marker wins at the same position.
fn marker_regex(delimiter: &str) -> Regex {
    let mut markers: Vec<&str> = std::iter::once(delimiter)
        .chain(FALLBACK_MARKERS)
        .filter(|m| !m.is_empty())
        .collect();
    markers.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then(a.cmp(b)));
    markers.dedup();

    let alternation = markers
        .iter()
        .map(|m| regex::escape(m))
        .collect::<Vec<_>>()
        .join("|");

    Regex::new(&format!(r"(?i)[*_]*(?:{alternation})[:*_]*")).expect("escaped markers form a valid regex")
}

/// Split a raw model answer into `(translation, context)`.
///
/// The answer is cut at the first context marker.  A leading `label:` (2-30
/// characters before a colon on the first line) is stripped once from the
/// translation; if that leaves nothing, the unstripped text is kept.  When no
/// marker is present the context is empty.
///
/// Markdown is *not* removed here; see [`clean_markdown`].
pub fn split_context(raw: &str, delimiter: &str) -> (String, String) {
    let marker = marker_regex(delimiter);

    let (before, context) = match marker.find(raw) {
        Some(m) => (&raw[..m.start()], raw[m.end()..].trim()),
        None => (raw, ""),
    };

    let candidate = before.trim();
    let stripped = LEADING_LABEL.replacen(candidate, 1, "");
    let stripped = stripped.trim();

    let translation = if stripped.is_empty() { candidate } else { stripped };

    (translation.to_string(), context.to_string())
}

/// Strip markdown emphasis, headings, list bullets and table markup.
///
/// ```
/// use phrase_cards::llm::clean_markdown;
///
/// assert_eq!(clean_markdown("**bold**"), "bold");
/// assert_eq!(clean_markdown("# Heading\ntext"), "Heading\ntext");
/// assert_eq!(clean_markdown("- item"), "item");
/// ```
pub fn clean_markdown(text: &str) -> String {
    let text = BOLD_STARS.replace_all(text, "$1");
    let text = BOLD_UNDERSCORES.replace_all(&text, "$1");
    let text = ITALIC_STAR.replace_all(&text, "$1");
    let text = ITALIC_UNDERSCORE.replace_all(&text, "$1");
    let text = HEADING.replace_all(&text, "");
    let text = LIST_BULLET.replace_all(&text, "");
    let text = TABLE_RULE.replace_all(&text, "");
    text.replace('|', "").trim().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
