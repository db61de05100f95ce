//! Process-wide wiring
//!
//! One explicitly constructed history: open the database, load and trim the
//! store, start the poller, hand out the command service. `shutdown` stops
//! capture, drains queued captures and performs the final flush.

use crate::bus::NotificationBus;
use crate::clipboard::ClipboardBackend;
use crate::commands::CommandService;
use crate::config::{ConfigError, HistoryConfig};
use crate::database::Database;
use crate::interface::CopyStackError;
use crate::poller::{ClipboardPoller, PollerHandle};
use crate::store::HistoryStore;
use std::sync::Arc;
use validator::Validate;

pub struct ClipboardHistory {
    store: Arc<HistoryStore>,
    bus: NotificationBus,
    commands: Arc<CommandService>,
    poller: PollerHandle,
}

impl ClipboardHistory {
    /// Must be called from within a tokio runtime.
    /// Out-of-range settings are rejected before anything is opened.
    pub async fn start(config: HistoryConfig, clipboard: Arc<dyn ClipboardBackend>) -> Result<Self, CopyStackError> {
        config.validate().map_err(ConfigError::from)?;
        let database = Database::open(&config.database_path)?;
        let store = Arc::new(HistoryStore::open(Arc::new(database), config.default_max_items)?);
        let bus = NotificationBus::new(config.notification_capacity as usize);

        let poller = ClipboardPoller::new(clipboard.clone(), config.clipboard_timeout()).await?;
        let poller = poller.spawn(config.poll_interval(), store.clone(), bus.clone());

        let commands = Arc::new(CommandService::new(
            store.clone(),
            clipboard,
            bus.clone(),
            config.clipboard_timeout(),
        ));

        tracing::info!(
            database = %config.database_path.display(),
            poll_interval_ms = config.poll_interval_ms,
            "clipboard history started"
        );

        Ok(Self {
            store,
            bus,
            commands,
            poller,
        })
    }

    pub fn commands(&self) -> Arc<CommandService> {
        self.commands.clone()
    }

    pub fn store(&self) -> Arc<HistoryStore> {
        self.store.clone()
    }

    pub fn bus(&self) -> NotificationBus {
        self.bus.clone()
    }

    pub async fn shutdown(self) -> Result<(), CopyStackError> {
        self.poller.stop().await;
        let store = self.store.clone();
        let flushed = tokio::task::spawn_blocking(move || store.flush())
            .await
            .map_err(|e| CopyStackError::Persistence(e.to_string()))?;
        match &flushed {
            Ok(()) => tracing::info!(records = self.store.len(), "clipboard history stopped"),
            Err(e) => tracing::warn!(error = %e, "final flush failed"),
        }
        flushed
    }
}
