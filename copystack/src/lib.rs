//! CopyStack Core - backend of the Copy Stack clipboard history manager
//!
//! Watches the OS clipboard, captures every change as a multi-format
//! `ClipboardEvent`, keeps a bounded newest-first history in SQLite and serves
//! it to the presentation layer through `HistoryCommands` plus a push channel.

pub mod app;
pub mod bus;
pub mod clipboard;
pub mod commands;
pub mod config;
pub mod database;
pub mod formats;
pub mod interface;
mod models;
pub mod normalizer;
pub mod poller;
pub mod store;

pub use app::ClipboardHistory;
pub use bus::{NotificationBus, Subscription};
pub use clipboard::{ClipboardBackend, ClipboardError, MemoryClipboard};
pub use commands::CommandService;
pub use config::HistoryConfig;
pub use interface::*;
pub use store::HistoryStore;
