//! Constructors and derived data for the record types
//!
//! The types themselves live in `interface` so the presentation layer sees
//! one definition; everything computed from them lives here.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::formats;
use crate::interface::{ClipboardEvent, ClipboardItem, DataItem, EventId, FormatTag, StoredRecord};

impl DataItem {
    pub fn new(format: impl Into<FormatTag>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            format: format.into(),
            payload: payload.into(),
        }
    }
}

impl ClipboardItem {
    pub fn new(representations: Vec<DataItem>) -> Self {
        Self { representations }
    }
}

impl ClipboardEvent {
    pub fn new(items: Vec<ClipboardItem>) -> Self {
        Self { items }
    }

    /// Single item offered only as UTF-8 plain text
    pub fn from_text(text: &str) -> Self {
        Self::new(vec![ClipboardItem::new(vec![DataItem::new(
            formats::UTF8_PLAIN_TEXT,
            text.as_bytes(),
        )])])
    }

    /// Total number of representations across all items
    pub fn representation_count(&self) -> usize {
        self.items.iter().map(|item| item.representations.len()).sum()
    }

    /// SHA-256 hex digest over the ordered items and representations.
    ///
    /// Every field is length-prefixed so that different splits of the same
    /// bytes never collide. Order-sensitive: reordering items changes the hash.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.items.len() as u64).to_le_bytes());
        for item in &self.items {
            hasher.update((item.representations.len() as u64).to_le_bytes());
            for rep in &item.representations {
                let tag = rep.format.as_str().as_bytes();
                hasher.update((tag.len() as u64).to_le_bytes());
                hasher.update(tag);
                hasher.update((rep.payload.len() as u64).to_le_bytes());
                hasher.update(&rep.payload);
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

impl StoredRecord {
    pub fn new(id: EventId, event: ClipboardEvent, captured_at: DateTime<Utc>) -> Self {
        let content_hash = event.content_hash();
        Self {
            id,
            event,
            captured_at,
            content_hash,
        }
    }

    /// True if `event` is byte-for-byte the content of this record
    pub fn has_content(&self, content_hash: &str, event: &ClipboardEvent) -> bool {
        self.content_hash == content_hash && &self.event == event
    }

    /// One-line text preview for list display
    pub fn preview(&self, max_chars: usize) -> String {
        formats::preview(&self.event, max_chars)
    }
}
