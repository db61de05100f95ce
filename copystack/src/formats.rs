//! Well-known clipboard format tags and the text preview fast path
//!
//! Format tags are opaque everywhere else in the crate. The constants here
//! only exist so previews can pick the first text-like representation.

use crate::interface::{ClipboardEvent, FormatTag};

pub const UTF8_PLAIN_TEXT: &str = "public.utf8-plain-text";
pub const UTF16_PLAIN_TEXT: &str = "public.utf16-plain-text";
pub const RTF: &str = "public.rtf";

/// Default preview length used by list displays
pub const PREVIEW_CHARS: usize = 100;

/// Shown for an event with no items
pub const EMPTY_PREVIEW: &str = "Empty clipboard";

/// Decode a text representation. Returns None for non-text tags.
pub fn decode_text(tag: &FormatTag, payload: &[u8]) -> Option<String> {
    match tag.as_str() {
        UTF8_PLAIN_TEXT => Some(String::from_utf8_lossy(payload).into_owned()),
        UTF16_PLAIN_TEXT => Some(decode_utf16(payload)),
        _ => None,
    }
}

/// UTF-16 with optional BOM; little-endian when no BOM is present
fn decode_utf16(payload: &[u8]) -> String {
    let (big_endian, body) = match payload {
        [0xFE, 0xFF, rest @ ..] => (true, rest),
        [0xFF, 0xFE, rest @ ..] => (false, rest),
        _ => (false, payload),
    };
    let units = body.chunks_exact(2).map(|pair| {
        if big_endian {
            u16::from_be_bytes([pair[0], pair[1]])
        } else {
            u16::from_le_bytes([pair[0], pair[1]])
        }
    });
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Collapse runs of whitespace (newlines, tabs) into single spaces and trim
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Human-readable one-line preview of an event.
///
/// Uses the first text representation in item/representation order.
/// Falls back to `[tag]` of the very first representation.
pub fn preview(event: &ClipboardEvent, max_chars: usize) -> String {
    let text = event
        .items
        .iter()
        .flat_map(|item| item.representations.iter())
        .find_map(|rep| decode_text(&rep.format, &rep.payload));

    if let Some(text) = text {
        let normalized = normalize_whitespace(&text);
        if normalized.chars().count() <= max_chars {
            return normalized;
        }
        let mut truncated: String = normalized.chars().take(max_chars).collect();
        truncated.push_str("...");
        return truncated;
    }

    match event.items.first().and_then(|item| item.representations.first()) {
        Some(rep) => format!("[{}]", rep.format),
        None => EMPTY_PREVIEW.to_string(),
    }
}
