//! Plain-text helpers used to build node labels and abstracts

use regex::Regex;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Suffix appended to cropped text
pub const CROP_SUFFIX: &str = " …";

/// Remove markup tags and collapse whitespace.
///
/// ```
/// use nodetree_core::utils::strip_tags;
///
/// assert_eq!(strip_tags("<h1>Hello</h1>  <b>World</b>"), "Hello World");
/// ```
pub fn strip_tags(content: &str) -> String {
    let stripped = TAG_RE.replace_all(content, " ");
    WHITESPACE_RE.replace_all(&stripped, " ").trim().to_string()
}

/// Cut `text` to at most `max_characters` characters, appending [`CROP_SUFFIX`]
/// when anything was cut.
pub fn crop(text: &str, max_characters: usize) -> String {
    if text.chars().count() <= max_characters {
        return text.to_string();
    }
    let mut cropped: String = text.chars().take(max_characters).collect();
    cropped.push_str(CROP_SUFFIX);
    cropped
}
