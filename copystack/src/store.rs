//! HistoryStore - the authoritative, bounded, ordered clipboard history
//!
//! Concurrency Model:
//! - One `RwLock` guards the record list together with its persisted backing.
//!   Mutations take the write lock for the in-memory change *and* the durable
//!   write, so readers never observe state the database has not been asked to hold.
//! - Reads (`list`, `get`) share the read lock and may run concurrently.
//!
//! Durability Model:
//! - Each mutation is written incrementally. If a write fails the store is
//!   marked dirty, the in-memory change stands, and the next mutation (or the
//!   final `flush`) rewrites the full record set instead.

use crate::database::{HistoryPersistence, Mutation};
use crate::interface::{ClipboardEvent, CopyStackError, EventId, StoredRecord, MAX_MAX_ITEMS, MIN_MAX_ITEMS};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

struct StoreState {
    /// Newest first
    records: VecDeque<StoredRecord>,
    max_items: u32,
    next_id: EventId,
    /// Last durable write failed; persisted state lags memory
    dirty: bool,
}

pub struct HistoryStore {
    state: RwLock<StoreState>,
    persistence: Arc<dyn HistoryPersistence>,
}

fn validate_max_items(max_items: i64) -> Result<u32, CopyStackError> {
    if (MIN_MAX_ITEMS as i64..=MAX_MAX_ITEMS as i64).contains(&max_items) {
        Ok(max_items as u32)
    } else {
        Err(CopyStackError::InvalidArgument(format!(
            "max_items must be between {} and {}, got {}",
            MIN_MAX_ITEMS, MAX_MAX_ITEMS, max_items
        )))
    }
}

impl HistoryStore {
    /// Load persisted records and trim them to the current capacity.
    ///
    /// `default_max_items` only applies when no capacity was ever persisted.
    pub fn open(persistence: Arc<dyn HistoryPersistence>, default_max_items: u32) -> Result<Self, CopyStackError> {
        let default_max_items = validate_max_items(default_max_items as i64)?;
        let persisted = persistence.load()?;

        let max_items = match persisted.max_items {
            Some(n) if validate_max_items(n as i64).is_ok() => n,
            Some(n) => {
                tracing::warn!(persisted = n, fallback = default_max_items, "ignoring out-of-range persisted capacity");
                default_max_items
            }
            None => default_max_items,
        };

        let highest_id = persisted.records.iter().map(|r| r.id).max().unwrap_or(0);
        let next_id = persisted.next_id.unwrap_or(1).max(highest_id + 1);

        let mut records: VecDeque<StoredRecord> = persisted.records.into();
        let evicted: Vec<EventId> = if records.len() > max_items as usize {
            records.drain(max_items as usize..).map(|r| r.id).collect()
        } else {
            Vec::new()
        };

        let store = Self {
            state: RwLock::new(StoreState {
                records,
                max_items,
                next_id,
                dirty: false,
            }),
            persistence,
        };

        {
            let mut state = store.state.write();
            store.persist(&mut state, Mutation::Capacity { max_items, evicted: &evicted });
        }

        tracing::info!(
            records = store.len(),
            max_items,
            trimmed = evicted.len(),
            "clipboard history loaded"
        );
        Ok(store)
    }

    /// Write one mutation, falling back to a full rewrite while dirty
    fn persist(&self, state: &mut StoreState, mutation: Mutation<'_>) {
        let result = if state.dirty {
            let records = state.records.make_contiguous();
            self.persistence.replace_all(records, state.max_items, state.next_id)
        } else {
            self.persistence.apply(&mutation)
        };

        match result {
            Ok(()) => {
                if state.dirty {
                    tracing::info!("persisted history resynchronized");
                }
                state.dirty = false;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist clipboard history; memory stays authoritative");
                state.dirty = true;
            }
        }
    }

    /// Evict from the tail until within capacity. Returns evicted ids, oldest last.
    fn evict_overflow(state: &mut StoreState) -> Vec<EventId> {
        let max = state.max_items as usize;
        if state.records.len() <= max {
            return Vec::new();
        }
        state.records.drain(max..).map(|r| r.id).collect()
    }

    fn insert_locked(&self, state: &mut StoreState, event: ClipboardEvent) -> StoredRecord {
        let id = state.next_id;
        state.next_id += 1;

        let record = StoredRecord::new(id, event, Utc::now());
        state.records.push_front(record.clone());
        let evicted = Self::evict_overflow(state);
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "evicted oldest clipboard events");
        }

        let next_id = state.next_id;
        self.persist(state, Mutation::Insert { record: &record, evicted: &evicted, next_id });
        record
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Write Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Insert unconditionally. Returns the new record.
    pub fn insert(&self, event: ClipboardEvent) -> StoredRecord {
        let mut state = self.state.write();
        self.insert_locked(&mut state, event)
    }

    /// Insert unless the newest record holds byte-identical content.
    /// The comparison and the insert happen under one lock.
    pub fn insert_if_new(&self, event: ClipboardEvent) -> Option<StoredRecord> {
        let mut state = self.state.write();
        let content_hash = event.content_hash();
        if let Some(newest) = state.records.front() {
            if newest.has_content(&content_hash, &event) {
                tracing::debug!(id = newest.id, "dropping capture identical to newest record");
                return None;
            }
        }
        Some(self.insert_locked(&mut state, event))
    }

    /// Delete by id. Absent ids are a no-op. Returns whether a record was removed.
    pub fn delete(&self, id: EventId) -> bool {
        let mut state = self.state.write();
        let Some(position) = state.records.iter().position(|r| r.id == id) else {
            return false;
        };
        state.records.remove(position);
        self.persist(&mut state, Mutation::Delete { id });
        true
    }

    pub fn clear_all(&self) {
        let mut state = self.state.write();
        state.records.clear();
        self.persist(&mut state, Mutation::Clear);
    }

    /// Change the capacity, evicting the oldest records if it shrank.
    /// Out-of-range values are rejected before any state changes.
    pub fn set_max_items(&self, max_items: i64) -> Result<(), CopyStackError> {
        let max_items = validate_max_items(max_items)?;
        let mut state = self.state.write();
        state.max_items = max_items;
        let evicted = Self::evict_overflow(&mut state);
        self.persist(&mut state, Mutation::Capacity { max_items, evicted: &evicted });
        Ok(())
    }

    /// Make persisted state match memory. Used at teardown.
    pub fn flush(&self) -> Result<(), CopyStackError> {
        let mut state = self.state.write();
        if !state.dirty {
            return Ok(());
        }
        let max_items = state.max_items;
        let next_id = state.next_id;
        let records = state.records.make_contiguous();
        self.persistence.replace_all(records, max_items, next_id)?;
        state.dirty = false;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Read Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Snapshot of all records, newest first
    pub fn list(&self) -> Vec<StoredRecord> {
        self.state.read().records.iter().cloned().collect()
    }

    pub fn get(&self, id: EventId) -> Option<StoredRecord> {
        self.state.read().records.iter().find(|r| r.id == id).cloned()
    }

    pub fn newest(&self) -> Option<StoredRecord> {
        self.state.read().records.front().cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_items(&self) -> u32 {
        self.state.read().max_items
    }

    /// False while a failed durable write has not been recovered
    pub fn is_persisted(&self) -> bool {
        !self.state.read().dirty
    }
}
