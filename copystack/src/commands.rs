//! Command Service - the request/response surface for the presentation layer
//!
//! Every history operation is a direct call onto the shared `HistoryStore`;
//! its lock provides the ordering guarantees. `copy_to_clipboard` is the only
//! command that reaches the OS clipboard.

use crate::bus::{NotificationBus, Subscription};
use crate::clipboard::{with_timeout, ClipboardBackend};
use crate::interface::{CopyStackError, EventId, HistoryCommands, StoredRecord};
use crate::store::HistoryStore;
use std::sync::Arc;
use std::time::Duration;

pub struct CommandService {
    store: Arc<HistoryStore>,
    clipboard: Arc<dyn ClipboardBackend>,
    bus: NotificationBus,
    clipboard_timeout: Duration,
}

impl CommandService {
    pub fn new(
        store: Arc<HistoryStore>,
        clipboard: Arc<dyn ClipboardBackend>,
        bus: NotificationBus,
        clipboard_timeout: Duration,
    ) -> Self {
        Self {
            store,
            clipboard,
            bus,
            clipboard_timeout,
        }
    }
}

#[async_trait::async_trait]
impl HistoryCommands for CommandService {
    fn list_events(&self) -> Vec<StoredRecord> {
        self.store.list()
    }

    fn get_event(&self, id: EventId) -> Result<StoredRecord, CopyStackError> {
        self.store.get(id).ok_or(CopyStackError::NotFound(id))
    }

    fn get_max_items(&self) -> u32 {
        self.store.max_items()
    }

    fn set_max_items(&self, max_items: i64) -> Result<(), CopyStackError> {
        self.store.set_max_items(max_items)
    }

    fn delete_event(&self, id: EventId) {
        if !self.store.delete(id) {
            tracing::debug!(id, "delete of absent event ignored");
        }
    }

    fn clear_all_events(&self) {
        self.store.clear_all();
    }

    /// Writes all items with all their representations as one clipboard set.
    /// Not retried on failure.
    async fn copy_to_clipboard(&self, id: EventId) -> Result<(), CopyStackError> {
        let record = self.get_event(id)?;
        with_timeout(self.clipboard_timeout, self.clipboard.write(&record.event.items))
            .await
            .map_err(|e| {
                tracing::warn!(id, error = %e, "restoring event to clipboard failed");
                CopyStackError::from(e)
            })
    }

    fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::database::Database;
    use crate::formats::{RTF, UTF8_PLAIN_TEXT};
    use crate::interface::{ClipboardEvent, ClipboardItem, DataItem};

    fn service(clipboard: Arc<MemoryClipboard>) -> (CommandService, Arc<HistoryStore>) {
        let db = Database::open_in_memory().unwrap();
        let store = Arc::new(HistoryStore::open(Arc::new(db), 100).unwrap());
        let service = CommandService::new(
            store.clone(),
            clipboard,
            NotificationBus::new(4),
            Duration::from_secs(1),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_copy_restores_every_representation() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let (service, store) = service(clipboard.clone());

        let item = ClipboardItem::new(vec![
            DataItem::new(UTF8_PLAIN_TEXT, "hello"),
            DataItem::new(RTF, vec![0x7bu8, 0x5c, 0x72, 0x74, 0x66]),
        ]);
        let record = store.insert(ClipboardEvent::new(vec![item.clone()]));

        service.copy_to_clipboard(record.id).await.unwrap();
        assert_eq!(clipboard.contents(), vec![item]);
    }

    #[tokio::test]
    async fn test_copy_unknown_id_is_not_found() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let (service, _store) = service(clipboard.clone());

        let err = service.copy_to_clipboard(404).await.unwrap_err();
        assert_eq!(err, CopyStackError::NotFound(404));
        assert_eq!(clipboard.current_change_count(), 0);
    }

    #[tokio::test]
    async fn test_copy_denied_is_clipboard_access_error() {
        let clipboard = Arc::new(MemoryClipboard::new());
        let (service, store) = service(clipboard.clone());
        let record = store.insert(ClipboardEvent::from_text("secret"));

        clipboard.deny_writes(true);
        let err = service.copy_to_clipboard(record.id).await.unwrap_err();
        assert!(matches!(err, CopyStackError::ClipboardAccess(_)));
    }

    #[test]
    fn test_delete_unknown_leaves_list_unchanged() {
        let (service, store) = service(Arc::new(MemoryClipboard::new()));
        store.insert(ClipboardEvent::from_text("a"));
        let before = service.list_events();

        service.delete_event(12345);
        assert_eq!(service.list_events(), before);
    }

    #[test]
    fn test_capacity_commands() {
        let (service, _store) = service(Arc::new(MemoryClipboard::new()));
        assert_eq!(service.get_max_items(), 100);
        service.set_max_items(7).unwrap();
        assert_eq!(service.get_max_items(), 7);
        assert!(matches!(service.set_max_items(0), Err(CopyStackError::InvalidArgument(_))));
        assert_eq!(service.get_max_items(), 7);
    }

    #[test]
    fn test_clear_and_get() {
        let (service, store) = service(Arc::new(MemoryClipboard::new()));
        let record = store.insert(ClipboardEvent::from_text("a"));
        assert_eq!(service.get_event(record.id).unwrap(), record);

        service.clear_all_events();
        assert!(service.list_events().is_empty());
        assert_eq!(service.get_event(record.id), Err(CopyStackError::NotFound(record.id)));
    }
}
