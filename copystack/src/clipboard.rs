//! OS clipboard capability
//!
//! The concrete pasteboard binding lives outside this crate. It only has to
//! provide a change counter, per-item format enumeration, per-format reads
//! and an atomic multi-format write.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::interface::{ClipboardItem, DataItem, FormatTag};
use crate::normalizer::{RawItem, RawSnapshot};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClipboardError {
    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("Format {format} of item {item} is no longer available")]
    FormatUnavailable { item: usize, format: FormatTag },
    #[error("Clipboard access denied: {0}")]
    AccessDenied(String),
    #[error("Clipboard operation timed out after {0:?}")]
    TimedOut(Duration),
}

pub type ClipboardResult<T> = Result<T, ClipboardError>;

#[async_trait]
pub trait ClipboardBackend: Send + Sync {
    /// Monotonically increasing counter, bumped on every clipboard change
    async fn change_count(&self) -> ClipboardResult<u64>;

    /// Format tags per logical item, in OS preference order
    async fn formats(&self) -> ClipboardResult<Vec<Vec<FormatTag>>>;

    /// Bytes of one format of one item
    async fn read(&self, item: usize, format: &FormatTag) -> ClipboardResult<Vec<u8>>;

    /// Replace the clipboard contents with `items` in a single operation
    async fn write(&self, items: &[ClipboardItem]) -> ClipboardResult<()>;
}

/// Read every format of every item currently on the clipboard.
/// Any single failing read fails the whole snapshot.
pub async fn read_snapshot(clipboard: &dyn ClipboardBackend) -> ClipboardResult<RawSnapshot> {
    let layout = clipboard.formats().await?;
    let mut items = Vec::with_capacity(layout.len());
    for (index, tags) in layout.into_iter().enumerate() {
        let mut formats = Vec::with_capacity(tags.len());
        for tag in tags {
            let bytes = clipboard.read(index, &tag).await?;
            formats.push((tag, bytes));
        }
        items.push(RawItem { formats });
    }
    Ok(RawSnapshot { items })
}

/// Bound a clipboard operation so a wedged pasteboard cannot stall the caller
pub async fn with_timeout<T, F>(limit: Duration, operation: F) -> ClipboardResult<T>
where
    F: Future<Output = ClipboardResult<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(ClipboardError::TimedOut(limit)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IN-PROCESS PASTEBOARD
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    change_count: u64,
    items: Vec<ClipboardItem>,
    unreadable: HashSet<FormatTag>,
    deny_writes: bool,
    unavailable: bool,
}

/// Clipboard held in process memory. Used by tests and headless hosts.
#[derive(Default)]
pub struct MemoryClipboard {
    state: Mutex<MemoryState>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents as another application would, bumping the counter
    pub fn set_items(&self, items: Vec<ClipboardItem>) {
        let mut state = self.state.lock();
        state.items = items;
        state.change_count += 1;
    }

    pub fn set_text(&self, text: &str) {
        self.set_items(vec![ClipboardItem {
            representations: vec![DataItem {
                format: FormatTag::from(crate::formats::UTF8_PLAIN_TEXT),
                payload: text.as_bytes().to_vec(),
            }],
        }]);
    }

    pub fn contents(&self) -> Vec<ClipboardItem> {
        self.state.lock().items.clone()
    }

    pub fn current_change_count(&self) -> u64 {
        self.state.lock().change_count
    }

    /// Keep advertising `format` but fail every read of it
    pub fn make_unreadable(&self, format: impl Into<FormatTag>) {
        self.state.lock().unreadable.insert(format.into());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.unreadable.clear();
        state.deny_writes = false;
        state.unavailable = false;
    }

    pub fn deny_writes(&self, deny: bool) {
        self.state.lock().deny_writes = deny;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }
}

#[async_trait]
impl ClipboardBackend for MemoryClipboard {
    async fn change_count(&self) -> ClipboardResult<u64> {
        let state = self.state.lock();
        if state.unavailable {
            return Err(ClipboardError::Unavailable("pasteboard offline".to_string()));
        }
        Ok(state.change_count)
    }

    async fn formats(&self) -> ClipboardResult<Vec<Vec<FormatTag>>> {
        let state = self.state.lock();
        if state.unavailable {
            return Err(ClipboardError::Unavailable("pasteboard offline".to_string()));
        }
        Ok(state
            .items
            .iter()
            .map(|item| item.representations.iter().map(|rep| rep.format.clone()).collect())
            .collect())
    }

    async fn read(&self, item: usize, format: &FormatTag) -> ClipboardResult<Vec<u8>> {
        let state = self.state.lock();
        if state.unreadable.contains(format) {
            return Err(ClipboardError::FormatUnavailable { item, format: format.clone() });
        }
        state
            .items
            .get(item)
            .and_then(|it| it.representations.iter().find(|rep| &rep.format == format))
            .map(|rep| rep.payload.clone())
            .ok_or_else(|| ClipboardError::FormatUnavailable { item, format: format.clone() })
    }

    async fn write(&self, items: &[ClipboardItem]) -> ClipboardResult<()> {
        let mut state = self.state.lock();
        if state.deny_writes {
            return Err(ClipboardError::AccessDenied("write rejected".to_string()));
        }
        state.items = items.to_vec();
        state.change_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{RTF, UTF8_PLAIN_TEXT};

    fn rich_item() -> ClipboardItem {
        ClipboardItem {
            representations: vec![
                DataItem { format: UTF8_PLAIN_TEXT.into(), payload: b"hello".to_vec() },
                DataItem { format: RTF.into(), payload: b"{\\rtf1 hello}".to_vec() },
            ],
        }
    }

    #[tokio::test]
    async fn test_snapshot_reads_every_format() {
        let clipboard = MemoryClipboard::new();
        clipboard.set_items(vec![rich_item()]);

        let snapshot = read_snapshot(&clipboard).await.unwrap();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].formats.len(), 2);
        assert_eq!(snapshot.items[0].formats[1].1, b"{\\rtf1 hello}");
    }

    #[tokio::test]
    async fn test_unreadable_format_fails_snapshot() {
        let clipboard = MemoryClipboard::new();
        clipboard.set_items(vec![rich_item()]);
        clipboard.make_unreadable(RTF);

        let err = read_snapshot(&clipboard).await.unwrap_err();
        assert!(matches!(err, ClipboardError::FormatUnavailable { item: 0, .. }));
    }

    #[tokio::test]
    async fn test_write_bumps_change_count() {
        let clipboard = MemoryClipboard::new();
        let before = clipboard.change_count().await.unwrap();
        clipboard.write(&[rich_item()]).await.unwrap();
        assert_eq!(clipboard.change_count().await.unwrap(), before + 1);
        assert_eq!(clipboard.contents(), vec![rich_item()]);
    }

    #[tokio::test]
    async fn test_denied_write_leaves_contents() {
        let clipboard = MemoryClipboard::new();
        clipboard.set_text("keep");
        clipboard.deny_writes(true);

        let err = clipboard.write(&[rich_item()]).await.unwrap_err();
        assert!(matches!(err, ClipboardError::AccessDenied(_)));
        assert_eq!(clipboard.contents()[0].representations[0].payload, b"keep");
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result: ClipboardResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(ClipboardError::TimedOut(_))));
    }
}
