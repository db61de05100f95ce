//! Clipboard change detection and the capture pipeline
//!
//! Pipeline Architecture:
//! - Tick task: compares the OS change counter on a fixed interval, reads the
//!   snapshot and normalizes it. Never touches the store.
//! - Ingest task: receives captures in order over an unbounded channel,
//!   inserts them on a blocking thread (dedup against the newest record) and
//!   publishes accepted records on the notification bus.
//!
//! A slow database therefore delays individual inserts but never stops the
//! tick task from noticing the next change.

use crate::bus::NotificationBus;
use crate::clipboard::{read_snapshot, with_timeout, ClipboardBackend};
use crate::interface::{ClipboardEvent, CopyStackError};
use crate::normalizer::normalize;
use crate::store::HistoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};

pub struct ClipboardPoller {
    clipboard: Arc<dyn ClipboardBackend>,
    last_change_count: u64,
    timeout: Duration,
}

impl ClipboardPoller {
    /// Start from the current change counter so pre-existing content is not captured
    pub async fn new(clipboard: Arc<dyn ClipboardBackend>, timeout: Duration) -> Result<Self, CopyStackError> {
        let last_change_count = with_timeout(timeout, clipboard.change_count()).await?;
        Ok(Self {
            clipboard,
            last_change_count,
            timeout,
        })
    }

    pub fn last_change_count(&self) -> u64 {
        self.last_change_count
    }

    /// Run one tick. Returns the captured event if the clipboard changed.
    ///
    /// The counter is advanced before reading, so a change whose read fails is
    /// skipped rather than retried on every tick.
    pub async fn poll(&mut self) -> Option<ClipboardEvent> {
        let current = match with_timeout(self.timeout, self.clipboard.change_count()).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "could not read clipboard change counter; skipping tick");
                return None;
            }
        };
        if current == self.last_change_count {
            return None;
        }
        self.last_change_count = current;

        let snapshot = match with_timeout(self.timeout, read_snapshot(self.clipboard.as_ref())).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(change_count = current, error = %e, "clipboard read failed; skipping change");
                return None;
            }
        };

        let event = normalize(snapshot);
        if event.is_none() {
            tracing::debug!(change_count = current, "clipboard emptied; nothing to capture");
        }
        event
    }

    /// Run the pipeline in the background until the handle is stopped or dropped
    pub fn spawn(self, interval: Duration, store: Arc<HistoryStore>, bus: NotificationBus) -> PollerHandle {
        let shutdown = CancellationToken::new();
        let (sender, receiver) = mpsc::unbounded_channel();

        let tick = tokio::spawn(run_ticks(self, interval, sender, shutdown.clone()));
        let ingest = tokio::spawn(run_ingest(receiver, store, bus));

        PollerHandle {
            guard: shutdown.drop_guard(),
            tick,
            ingest,
        }
    }
}

async fn run_ticks(
    mut poller: ClipboardPoller,
    interval: Duration,
    sender: mpsc::UnboundedSender<ClipboardEvent>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Some(event) = poller.poll().await {
                    if sender.send(event).is_err() {
                        break;
                    }
                }
            }
        }
    }
}

async fn run_ingest(
    mut receiver: mpsc::UnboundedReceiver<ClipboardEvent>,
    store: Arc<HistoryStore>,
    bus: NotificationBus,
) {
    while let Some(event) = receiver.recv().await {
        let store = store.clone();
        match tokio::task::spawn_blocking(move || store.insert_if_new(event)).await {
            Ok(Some(record)) => {
                tracing::debug!(
                    id = record.id,
                    items = record.event.items.len(),
                    representations = record.event.representation_count(),
                    "captured clipboard event"
                );
                bus.publish(&record);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "capture insert task failed"),
        }
    }
}

/// Owns the background pipeline. Dropping it cancels the tick task.
pub struct PollerHandle {
    guard: DropGuard,
    tick: JoinHandle<()>,
    ingest: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop polling and wait until every queued capture has been stored
    pub async fn stop(self) {
        let PollerHandle { guard, tick, ingest } = self;
        drop(guard);
        if let Err(e) = tick.await {
            tracing::warn!(error = %e, "poller tick task ended abnormally");
        }
        if let Err(e) = ingest.await {
            tracing::warn!(error = %e, "poller ingest task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::formats::{RTF, UTF8_PLAIN_TEXT};
    use crate::interface::{ClipboardItem, DataItem};

    #[tokio::test]
    async fn test_existing_content_is_not_captured() {
        let clipboard = Arc::new(MemoryClipboard::new());
        clipboard.set_text("already there");

        let mut poller = ClipboardPoller::new(clipboard.clone(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(poller.poll().await, None);
    }

    #[tokio::test]
    async fn test_change_is_captured_once() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let mut poller = ClipboardPoller::new(clipboard.clone(), Duration::from_secs(1)).await.unwrap();

        clipboard.set_text("hello");
        assert_eq!(poller.poll().await, Some(ClipboardEvent::from_text("hello")));
        assert_eq!(poller.poll().await, None);
    }

    #[tokio::test]
    async fn test_captures_all_formats_in_order() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let mut poller = ClipboardPoller::new(clipboard.clone(), Duration::from_secs(1)).await.unwrap();

        let item = ClipboardItem::new(vec![
            DataItem::new(UTF8_PLAIN_TEXT, "hello"),
            DataItem::new(RTF, "{\\rtf1 hello}"),
        ]);
        clipboard.set_items(vec![item.clone(), ClipboardItem::new(vec![DataItem::new("public.png", vec![1u8, 2])])]);

        let event = poller.poll().await.unwrap();
        assert_eq!(event.items.len(), 2);
        assert_eq!(event.items[0], item);
    }

    #[tokio::test]
    async fn test_failed_read_advances_counter() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let mut poller = ClipboardPoller::new(clipboard.clone(), Duration::from_secs(1)).await.unwrap();

        clipboard.make_unreadable(RTF);
        clipboard.set_items(vec![ClipboardItem::new(vec![DataItem::new(RTF, "x")])]);

        assert_eq!(poller.poll().await, None);
        assert_eq!(poller.last_change_count(), clipboard.current_change_count());

        // Not retried even once the format becomes readable
        clipboard.clear_failures();
        assert_eq!(poller.poll().await, None);

        clipboard.set_text("next");
        assert_eq!(poller.poll().await, Some(ClipboardEvent::from_text("next")));
    }

    #[tokio::test]
    async fn test_unavailable_clipboard_skips_tick() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let mut poller = ClipboardPoller::new(clipboard.clone(), Duration::from_secs(1)).await.unwrap();

        clipboard.set_text("pending");
        clipboard.set_unavailable(true);
        assert_eq!(poller.poll().await, None);

        clipboard.set_unavailable(false);
        assert_eq!(poller.poll().await, Some(ClipboardEvent::from_text("pending")));
    }

    #[tokio::test]
    async fn test_emptied_clipboard_is_ignored() {
        let clipboard = Arc::new(MemoryClipboard::new());
        clipboard.set_text("something");
        let mut poller = ClipboardPoller::new(clipboard.clone(), Duration::from_secs(1)).await.unwrap();

        clipboard.set_items(Vec::new());
        assert_eq!(poller.poll().await, None);
    }
}
