//! CopyStack Interface Definition
//!
//! Public types shared with the presentation layer: the canonical record
//! shape, the error taxonomy and the command surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::bus::Subscription;

/// Identifier of a stored record. Allocated monotonically, never reused.
pub type EventId = i64;

/// Smallest accepted history capacity
pub const MIN_MAX_ITEMS: u32 = 1;
/// Largest accepted history capacity
pub const MAX_MAX_ITEMS: u32 = 1000;

// ═══════════════════════════════════════════════════════════════════════════════
// RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque identifier of one clipboard representation (e.g. `public.utf8-plain-text`).
///
/// Deliberately not an enum: the OS format set is open-ended and new tags
/// must round-trip without code changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatTag(String);

impl FormatTag {
    pub fn new(tag: impl Into<String>) -> Self {
        FormatTag(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FormatTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FormatTag {
    fn from(tag: &str) -> Self {
        FormatTag(tag.to_string())
    }
}

impl From<String> for FormatTag {
    fn from(tag: String) -> Self {
        FormatTag(tag)
    }
}

impl AsRef<str> for FormatTag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One representation of one logical clipboard item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataItem {
    pub format: FormatTag,
    /// Raw bytes as offered by the OS. Base64 in JSON.
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
}

/// All representations offered for one logical item, in OS preference order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClipboardItem {
    pub representations: Vec<DataItem>,
}

/// One capture of the clipboard. May hold several logical items (e.g. multiple files).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClipboardEvent {
    pub items: Vec<ClipboardItem>,
}

/// A captured, identified and timestamped event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: EventId,
    pub event: ClipboardEvent,
    pub captured_at: DateTime<Utc>,
    /// SHA-256 over the ordered formats and payloads of `event`
    pub content_hash: String,
}

mod payload_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Error type for CopyStack operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CopyStackError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Event not found: {0}")]
    NotFound(EventId),
    #[error("Clipboard access error: {0}")]
    ClipboardAccess(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<crate::database::DatabaseError> for CopyStackError {
    fn from(e: crate::database::DatabaseError) -> Self {
        CopyStackError::Persistence(e.to_string())
    }
}

impl From<crate::config::ConfigError> for CopyStackError {
    fn from(e: crate::config::ConfigError) -> Self {
        CopyStackError::InvalidArgument(e.to_string())
    }
}

impl From<crate::clipboard::ClipboardError> for CopyStackError {
    fn from(e: crate::clipboard::ClipboardError) -> Self {
        CopyStackError::ClipboardAccess(e.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERVICE INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// The command surface consumed by the presentation layer.
#[async_trait::async_trait]
pub trait HistoryCommands: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// All stored records, newest first
    fn list_events(&self) -> Vec<StoredRecord>;

    /// A single record by id
    fn get_event(&self, id: EventId) -> Result<StoredRecord, CopyStackError>;

    /// Current history capacity
    fn get_max_items(&self) -> u32;

    // ─────────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Change the capacity. Fails with `InvalidArgument` outside 1..=1000.
    fn set_max_items(&self, max_items: i64) -> Result<(), CopyStackError>;

    /// Delete a record. Absent ids are a no-op.
    fn delete_event(&self, id: EventId);

    /// Remove every record
    fn clear_all_events(&self);

    /// Put every representation of a stored record back on the OS clipboard
    async fn copy_to_clipboard(&self, id: EventId) -> Result<(), CopyStackError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Push Channel
    // ─────────────────────────────────────────────────────────────────────────────

    /// Register for newly captured records. Dropping the subscription unregisters it.
    fn subscribe(&self) -> Subscription;
}
