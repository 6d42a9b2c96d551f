//! Cleaning of scraped track metadata and rendering of the status text.
//!
//! Text from the browser is whatever the page happened to render: it can
//! carry zero-width characters, view counts, "By:" bylines, site suffixes,
//! or the same title twice because the DOM node was duplicated. Everything
//! here is pure so it can be tested without a runtime.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::models::{NormalizedStatus, PlaybackEvent, PlaybackState, StatusKey};

/// Maximum length of a single cleaned field (title or artist), in chars.
pub const MAX_FIELD_LEN: usize = 80;

pub const TITLE_PLACEHOLDER: &str = "${title}";
pub const ARTIST_PLACEHOLDER: &str = "${artist}";

pub const UNKNOWN_TRACK: &str = "Unknown Track";
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

const ELLIPSIS: &str = "...";

static RE_LABEL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:current\s*track|now\s*playing)\s*:\s*").unwrap());

/// Decorations removed after whitespace collapse, applied in order.
static RE_DECORATIONS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\s+•\s+.*$",
        r"(?i)\s+\d+(?:[.,]\d+)?[KMB]?\s+views?$",
        r"(?i)\s+-\s+YouTube Music$",
        r"(?i)^YouTube Music\s+",
        r"(?i)\s*\bBy:\s*.*$",
        r"(?i)\s+on SoundCloud$",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Turn a playing event into the status that should be shown.
///
/// Returns `None` when the event is not `playing` or has no usable title;
/// the engine treats that as "nothing is playing".
pub fn normalize(event: &PlaybackEvent, template: &str, max_len: usize) -> Option<NormalizedStatus> {
    if event.state != PlaybackState::Playing {
        return None;
    }

    let title = clean_text(&event.title, MAX_FIELD_LEN);
    if title.is_empty() {
        return None;
    }
    let artist = clean_text(&event.artist, MAX_FIELD_LEN);
    let artist = if artist.is_empty() { UNKNOWN_ARTIST } else { artist.as_str() };

    let display_text = sanitize(&render_template(template, &title, artist), max_len);
    if display_text.is_empty() {
        return None;
    }

    Some(NormalizedStatus {
        key: StatusKey::playing(&display_text),
        display_text,
        platform: event.platform,
    })
}

/// Clean one scraped field.
pub fn clean_text(raw: &str, max_len: usize) -> String {
    let s = strip_invisible(raw);
    let s = RE_LABEL_PREFIX.replace(&s, "");
    let s = collapse_whitespace(&s);
    let s = strip_decorations(&s);
    let s = collapse_doubled(&s);
    truncate(&s, max_len)
}

/// Collapse whitespace, compose to NFC and truncate. Used for the final
/// status text and for manually submitted texts.
pub fn sanitize(text: &str, max_len: usize) -> String {
    let composed: String = text.nfc().collect();
    truncate(&collapse_whitespace(&composed), max_len)
}

/// Substitute `${title}` and `${artist}` in a single pass, so placeholder-like
/// text inside a title is never expanded a second time.
///
/// Empty values fall back to "Unknown Track" / "Unknown Artist".
pub fn render_template(template: &str, title: &str, artist: &str) -> String {
    let title = if title.is_empty() { UNKNOWN_TRACK } else { title };
    let artist = if artist.is_empty() { UNKNOWN_ARTIST } else { artist };

    let mut out = String::with_capacity(template.len() + title.len() + artist.len());
    let mut rest = template;

    while let Some(pos) = rest.find("${") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix(TITLE_PLACEHOLDER) {
            out.push_str(title);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(ARTIST_PLACEHOLDER) {
            out.push_str(artist);
            rest = after;
        } else {
            out.push_str("${");
            rest = &tail[2..];
        }
    }
    out.push_str(rest);
    out
}

fn strip_invisible(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}'))
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_decorations(s: &str) -> String {
    let stripped = RE_DECORATIONS
        .iter()
        .fold(s.to_string(), |acc, re| re.replace(&acc, "").into_owned());
    stripped.trim().to_string()
}

/// Collapse a string made of the same text twice.
///
/// Handles both the glued form ("SongSong", at least 6 chars) and the
/// space-separated form ("Echoes Echoes", each half at least 3 chars).
fn collapse_doubled(s: &str) -> String {
    let chars: Vec<char> = s.trim().chars().collect();
    let n = chars.len();

    if n >= 6 && n % 2 == 0 {
        let (a, b) = chars.split_at(n / 2);
        if a == b {
            return a.iter().collect::<String>().trim().to_string();
        }
    }

    if n >= 7 && n % 2 == 1 && chars[n / 2] == ' ' {
        let a = &chars[..n / 2];
        let b = &chars[n / 2 + 1..];
        if a == b {
            return a.iter().collect();
        }
    }

    s.to_string()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let keep = max_len.saturating_sub(ELLIPSIS.len());
    let mut out: String = s.chars().take(keep).collect();
    out.push_str(ELLIPSIS);
    out
}
