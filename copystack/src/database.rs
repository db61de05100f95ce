//! SQLite persistence for the clipboard history
//!
//! Schema: `events` (one row per record) + `representations` (one row per
//! format of each item) + `settings` (capacity and id allocator).
//! Every mutation runs in one transaction, so the file is crash-consistent.
//! Uses r2d2 connection pooling so loads don't contend with the writer.

use crate::interface::{ClipboardEvent, ClipboardItem, DataItem, EventId, FormatTag, StoredRecord};
use chrono::{DateTime, TimeZone, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

const SETTING_MAX_ITEMS: &str = "max_items";
const SETTING_NEXT_ID: &str = "next_id";

/// Longest run of representation-less items accepted when loading an event
const MAX_EMPTY_ITEM_RUN: usize = 64;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parse timestamp string from database to DateTime<Utc>
fn parse_db_timestamp(timestamp_str: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(timestamp_str, TIMESTAMP_FORMAT)
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S"))
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or_else(|_| Utc::now())
}

fn format_db_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Everything persisted, as read back at startup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    /// Newest first
    pub records: Vec<StoredRecord>,
    pub max_items: Option<u32>,
    pub next_id: Option<EventId>,
}

/// One store mutation, described so the backend can apply it incrementally
#[derive(Debug, Clone, Copy)]
pub enum Mutation<'a> {
    Insert {
        record: &'a StoredRecord,
        evicted: &'a [EventId],
        next_id: EventId,
    },
    Delete {
        id: EventId,
    },
    Clear,
    Capacity {
        max_items: u32,
        evicted: &'a [EventId],
    },
}

/// Durable backing of the history store
pub trait HistoryPersistence: Send + Sync {
    fn load(&self) -> DatabaseResult<PersistedState>;

    /// Apply one mutation atomically
    fn apply(&self, mutation: &Mutation<'_>) -> DatabaseResult<()>;

    /// Overwrite the whole persisted state atomically
    fn replace_all(&self, records: &[StoredRecord], max_items: u32, next_id: EventId) -> DatabaseResult<()>;
}

/// Thread-safe database wrapper using connection pooling
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open or create a database at the given path with connection pooling
    pub fn open<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| {
                conn.execute_batch("
                    PRAGMA journal_mode=WAL;
                    PRAGMA synchronous=NORMAL;
                    PRAGMA foreign_keys=ON;
                ")?;
                Ok(())
            });

        let pool = Pool::builder()
            .max_size(4)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| {
                conn.execute_batch("PRAGMA foreign_keys=ON;")?;
                Ok(())
            });

        // In-memory needs single connection to maintain state
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;

        let db = Self { pool };
        db.setup_schema()?;
        Ok(db)
    }

    fn get_conn(&self) -> DatabaseResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn setup_schema(&self) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY,
                contentHash TEXT NOT NULL,
                itemCount INTEGER NOT NULL,
                capturedAt TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS representations (
                eventId INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
                itemOrdinal INTEGER NOT NULL,
                ordinal INTEGER NOT NULL,
                format TEXT NOT NULL,
                payload BLOB NOT NULL,
                PRIMARY KEY (eventId, itemOrdinal, ordinal)
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#)?;
        Ok(())
    }

    /// Number of persisted records
    pub fn count_events(&self) -> DatabaseResult<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn read_setting(conn: &rusqlite::Connection, key: &str) -> DatabaseResult<Option<String>> {
        Ok(conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
            .optional()?)
    }

    fn write_setting(conn: &rusqlite::Connection, key: &str, value: &str) -> DatabaseResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn insert_record(conn: &rusqlite::Connection, record: &StoredRecord) -> DatabaseResult<()> {
        conn.execute(
            "INSERT INTO events (id, contentHash, itemCount, capturedAt) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id,
                record.content_hash,
                record.event.items.len() as i64,
                format_db_timestamp(&record.captured_at),
            ],
        )?;

        let mut stmt = conn.prepare_cached(
            "INSERT INTO representations (eventId, itemOrdinal, ordinal, format, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (item_ordinal, item) in record.event.items.iter().enumerate() {
            for (ordinal, rep) in item.representations.iter().enumerate() {
                stmt.execute(params![
                    record.id,
                    item_ordinal as i64,
                    ordinal as i64,
                    rep.format.as_str(),
                    rep.payload,
                ])?;
            }
        }
        Ok(())
    }

    fn delete_records(conn: &rusqlite::Connection, ids: &[EventId]) -> DatabaseResult<()> {
        let mut stmt = conn.prepare_cached("DELETE FROM events WHERE id = ?1")?;
        for id in ids {
            stmt.execute([id])?;
        }
        Ok(())
    }

    /// Rebuild the event of one row from its representation rows.
    ///
    /// Items grow with the ordinals actually present. Runs of items without
    /// representations (between stored ones or after the last) are capped at
    /// `MAX_EMPTY_ITEM_RUN`, so a damaged count is reported as `Corrupt`.
    fn load_event(conn: &rusqlite::Connection, id: EventId, item_count: i64) -> DatabaseResult<ClipboardEvent> {
        let mut items: Vec<ClipboardItem> = Vec::new();
        let mut stmt = conn.prepare_cached(
            "SELECT itemOrdinal, format, payload FROM representations WHERE eventId = ?1 ORDER BY itemOrdinal, ordinal",
        )?;
        let rows = stmt.query_map([id], |row| {
            let item_ordinal: i64 = row.get(0)?;
            let format: String = row.get(1)?;
            let payload: Vec<u8> = row.get(2)?;
            Ok((item_ordinal, format, payload))
        })?;

        for row in rows {
            let (item_ordinal, format, payload) = row?;
            if item_ordinal < 0 || item_ordinal >= item_count {
                return Err(DatabaseError::Corrupt(format!(
                    "event {} has representation for item {} of {}",
                    id, item_ordinal, item_count
                )));
            }
            let index = item_ordinal as usize;
            if index > items.len() + MAX_EMPTY_ITEM_RUN {
                return Err(DatabaseError::Corrupt(format!(
                    "event {} skips from item {} to {}",
                    id,
                    items.len(),
                    index
                )));
            }
            if index >= items.len() {
                items.resize_with(index + 1, ClipboardItem::default);
            }
            items[index].representations.push(DataItem {
                format: FormatTag::from(format),
                payload,
            });
        }

        let trailing = item_count - items.len() as i64;
        if trailing < 0 || trailing > MAX_EMPTY_ITEM_RUN as i64 {
            return Err(DatabaseError::Corrupt(format!(
                "event {} claims {} items but has representations for {}",
                id,
                item_count,
                items.len()
            )));
        }
        items.resize_with(item_count as usize, ClipboardItem::default);
        Ok(ClipboardEvent { items })
    }
}

impl HistoryPersistence for Database {
    fn load(&self) -> DatabaseResult<PersistedState> {
        let conn = self.get_conn()?;

        let max_items = Self::read_setting(&conn, SETTING_MAX_ITEMS)?.and_then(|v| v.parse::<u32>().ok());
        let next_id = Self::read_setting(&conn, SETTING_NEXT_ID)?.and_then(|v| v.parse::<EventId>().ok());

        let mut stmt = conn.prepare(
            "SELECT id, contentHash, itemCount, capturedAt FROM events ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let id: EventId = row.get(0)?;
                let content_hash: String = row.get(1)?;
                let item_count: i64 = row.get(2)?;
                let captured_at: String = row.get(3)?;
                Ok((id, content_hash, item_count, captured_at))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for (id, content_hash, item_count, captured_at) in rows {
            let event = match Self::load_event(&conn, id, item_count) {
                Ok(event) => event,
                Err(DatabaseError::Corrupt(reason)) => {
                    tracing::warn!(id, %reason, "skipping corrupt persisted event");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let record = StoredRecord::new(id, event, parse_db_timestamp(&captured_at));
            if record.content_hash != content_hash {
                tracing::warn!(id, "skipping persisted event whose payload no longer matches its hash");
                continue;
            }
            records.push(record);
        }

        Ok(PersistedState {
            records,
            max_items,
            next_id,
        })
    }

    fn apply(&self, mutation: &Mutation<'_>) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        match mutation {
            Mutation::Insert { record, evicted, next_id } => {
                Self::insert_record(&tx, record)?;
                Self::delete_records(&tx, evicted)?;
                Self::write_setting(&tx, SETTING_NEXT_ID, &next_id.to_string())?;
            }
            Mutation::Delete { id } => {
                Self::delete_records(&tx, &[*id])?;
            }
            Mutation::Clear => {
                tx.execute("DELETE FROM events", [])?;
            }
            Mutation::Capacity { max_items, evicted } => {
                Self::write_setting(&tx, SETTING_MAX_ITEMS, &max_items.to_string())?;
                Self::delete_records(&tx, evicted)?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn replace_all(&self, records: &[StoredRecord], max_items: u32, next_id: EventId) -> DatabaseResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        tx.execute("DELETE FROM events", [])?;
        for record in records {
            Self::insert_record(&tx, record)?;
        }
        Self::write_setting(&tx, SETTING_MAX_ITEMS, &max_items.to_string())?;
        Self::write_setting(&tx, SETTING_NEXT_ID, &next_id.to_string())?;

        tx.commit()?;
        Ok(())
    }
}
