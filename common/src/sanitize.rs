//! Plain-text cleaning for notification titles and bodies.
//!
//! Everything a page hands to the notification constructor is untrusted. The
//! browser also injects a link to the originating site into some bodies; that
//! link and its text are removed entirely.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

/// An anchor element wrapping plain text, e.g. `<a href="..">site.com</a>`.
static ANCHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<a(?:\s[^>]*)?>[^<]*</a\s*>").unwrap());

static ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&(amp|lt|gt|quot|#39);").unwrap());

static LEADING_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:[ \t]*\n)+").unwrap());

static NEWLINE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Cleans a notification title: entities are decoded, every `<...>` tag is
/// removed and surrounding whitespace is trimmed.
pub fn sanitize_title(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    let decoded = decode_entities(input);
    strip_tags(&decoded).trim().to_string()
}

/// Cleans a notification body.
///
/// Order matters: anchors (with their text) go first, then the remaining
/// tags, then entities are decoded. Leading blank lines are dropped and runs
/// of three or more newlines shrink to two.
pub fn sanitize_body(input: &str) -> String {
    if input.is_empty() {
        return String::new();
    }
    let without_links = ANCHOR.replace_all(input, "");
    let stripped = strip_tags(&without_links);
    let decoded = decode_entities(&stripped).replace("\r\n", "\n");

    let trimmed_start = LEADING_BLANK_LINES.replace(&decoded, "");
    NEWLINE_RUN
        .replace_all(&trimmed_start, "\n\n")
        .trim()
        .to_string()
}

/// Removes anything shaped like `<...>`. Unterminated tags are left alone.
pub fn strip_tags(input: &str) -> String {
    TAG.replace_all(input, "").into_owned()
}

/// Decodes `&amp; &lt; &gt; &quot; &#39;` in a single pass, so `&amp;lt;`
/// becomes `&lt;` rather than `<`.
pub fn decode_entities(input: &str) -> String {
    ENTITY
        .replace_all(input, |caps: &Captures| match &caps[1] {
            "amp" => "&",
            "lt" => "<",
            "gt" => ">",
            "quot" => "\"",
            _ => "'",
        })
        .into_owned()
}
