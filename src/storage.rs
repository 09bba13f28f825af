//! # In-Memory Storage Double
//!
//! Persistent-state stand-in keyed by `(entity-type name, entity key)`.
//! Values are stored as [`serde_json::Value`] snapshots, so readers always get
//! an isolated copy of what was written, and every row carries an opaque
//! [`Etag`] for optimistic concurrency checks.
//!
//! The double keeps per-operation counters and a last-write snapshot for
//! point-in-time assertions, and reports every operation to the shared
//! [`CallTracker`] so tests can await "N calls have occurred".

use crate::error::{MockError, StorageError};
use crate::key::EntityKey;
use crate::ops::OpId;
use crate::tracker::{CallTracker, ReadinessTicket};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

pub const OP_READ: &str = "read";
pub const OP_WRITE: &str = "write";
pub const OP_CLEAR: &str = "clear";

/// Opaque per-row version token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Etag(String);

impl Etag {
    fn fresh() -> Self {
        Etag(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Etag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored row: the state snapshot and its current version token.
#[derive(Clone, Debug)]
pub struct VersionedState {
    pub state: Value,
    pub etag: Etag,
}

/// Last mutation observed by the provider, for assertions.
#[derive(Clone, Debug)]
pub struct LastWrite {
    pub kind: String,
    pub key: EntityKey,
    /// `None` after a clear.
    pub state: Option<Value>,
}

/// Operation counters since construction or the last history reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub reads: usize,
    pub writes: usize,
    pub clears: usize,
}

/// Named storage-provider seam the silo registers doubles under.
pub trait StateStore: Send + Sync {
    fn name(&self) -> &str;
    fn read_raw(&self, kind: &str, key: &EntityKey) -> Option<VersionedState>;
    fn write_raw(
        &self,
        kind: &str,
        key: &EntityKey,
        state: Value,
        expected: Option<&Etag>,
    ) -> Result<Etag, StorageError>;
    fn clear(&self, kind: &str, key: &EntityKey, expected: Option<&Etag>)
        -> Result<(), StorageError>;
    /// Downcast seam so fixtures can reach double-specific surface.
    fn as_any(&self) -> &dyn Any;
}

/// The in-memory storage double.
pub struct MemoryStorage {
    name: String,
    rows: Mutex<HashMap<(String, EntityKey), VersionedState>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    clears: AtomicUsize,
    last: Mutex<Option<LastWrite>>,
    tracker: Arc<CallTracker>,
    read_op: OpId,
    write_op: OpId,
    clear_op: OpId,
}

impl MemoryStorage {
    /// Constructs a provider wired to the given tracker. Operation ids are
    /// interned here, at registration time.
    pub fn new(name: impl Into<String>, tracker: Arc<CallTracker>) -> Self {
        let ops = tracker.operations();
        let read_op = ops.intern(OP_READ);
        let write_op = ops.intern(OP_WRITE);
        let clear_op = ops.intern(OP_CLEAR);
        Self {
            name: name.into(),
            rows: Mutex::new(HashMap::new()),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
            last: Mutex::new(None),
            tracker,
            read_op,
            write_op,
            clear_op,
        }
    }

    /// Typed read: deserializes the stored snapshot.
    pub fn read<T: DeserializeOwned>(
        &self,
        kind: &str,
        key: &EntityKey,
    ) -> Result<Option<(T, Etag)>, StorageError> {
        match self.read_raw(kind, key) {
            Some(row) => {
                let state = serde_json::from_value(row.state)?;
                Ok(Some((state, row.etag)))
            }
            None => Ok(None),
        }
    }

    /// Typed write: serializes `state` and stores it under a fresh etag.
    ///
    /// When `expected` is given, the write only succeeds if it matches the
    /// currently stored etag; otherwise the row is left untouched and
    /// [`StorageError::EtagMismatch`] is returned.
    pub fn write<T: Serialize>(
        &self,
        kind: &str,
        key: &EntityKey,
        state: &T,
        expected: Option<&Etag>,
    ) -> Result<Etag, StorageError> {
        let value = serde_json::to_value(state)?;
        self.write_raw(kind, key, value, expected)
    }

    pub fn counts(&self) -> OperationCounts {
        OperationCounts {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
        }
    }

    pub fn last_write(&self) -> Option<LastWrite> {
        self.last.lock().unwrap().clone()
    }

    /// Resets counters and the last-write snapshot. Stored rows survive.
    pub fn reset_history(&self) {
        self.reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.clears.store(0, Ordering::Relaxed);
        *self.last.lock().unwrap() = None;
    }

    /// Registers a readiness ticket that fires after `calls` operations of
    /// the given kind against `(kind, key)`.
    pub fn await_operation(
        &self,
        kind: &str,
        key: EntityKey,
        op: &'static str,
        calls: u32,
    ) -> Result<ReadinessTicket, MockError> {
        let op = self.tracker.operations().intern(op);
        self.tracker.ticket(kind, op, key, calls)
    }

    fn check_etag(
        &self,
        kind: &str,
        key: &EntityKey,
        stored: Option<&Etag>,
        expected: Option<&Etag>,
    ) -> Result<(), StorageError> {
        match expected {
            None => Ok(()),
            Some(expected) if stored == Some(expected) => Ok(()),
            Some(expected) => Err(StorageError::EtagMismatch {
                kind: kind.to_string(),
                key: key.clone(),
                expected: expected.to_string(),
                stored: stored.map_or_else(|| "<none>".to_string(), Etag::to_string),
            }),
        }
    }
}

impl StateStore for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_raw(&self, kind: &str, key: &EntityKey) -> Option<VersionedState> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let row = {
            let rows = self.rows.lock().unwrap();
            rows.get(&(kind.to_string(), key.clone())).cloned()
        };
        debug!(provider = %self.name, kind, key = %key, found = row.is_some(), "Read state");
        self.tracker.record(kind, self.read_op, key);
        row
    }

    fn write_raw(
        &self,
        kind: &str,
        key: &EntityKey,
        state: Value,
        expected: Option<&Etag>,
    ) -> Result<Etag, StorageError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let etag = {
            let mut rows = self.rows.lock().unwrap();
            let slot = (kind.to_string(), key.clone());
            self.check_etag(kind, key, rows.get(&slot).map(|r| &r.etag), expected)?;
            let etag = Etag::fresh();
            *self.last.lock().unwrap() = Some(LastWrite {
                kind: kind.to_string(),
                key: key.clone(),
                state: Some(state.clone()),
            });
            rows.insert(
                slot,
                VersionedState {
                    state,
                    etag: etag.clone(),
                },
            );
            etag
        };
        debug!(provider = %self.name, kind, key = %key, "Wrote state");
        self.tracker.record(kind, self.write_op, key);
        Ok(etag)
    }

    fn clear(
        &self,
        kind: &str,
        key: &EntityKey,
        expected: Option<&Etag>,
    ) -> Result<(), StorageError> {
        self.clears.fetch_add(1, Ordering::Relaxed);
        {
            let mut rows = self.rows.lock().unwrap();
            let slot = (kind.to_string(), key.clone());
            self.check_etag(kind, key, rows.get(&slot).map(|r| &r.etag), expected)?;
            rows.remove(&slot);
            *self.last.lock().unwrap() = Some(LastWrite {
                kind: kind.to_string(),
                key: key.clone(),
                state: None,
            });
        }
        debug!(provider = %self.name, kind, key = %key, "Cleared state");
        self.tracker.record(kind, self.clear_op, key);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OperationTable;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        title: String,
        revision: u32,
    }

    fn storage() -> MemoryStorage {
        let ops = Arc::new(OperationTable::new());
        MemoryStorage::new("store", Arc::new(CallTracker::new(ops)))
    }

    #[test]
    fn write_then_read_round_trips_a_snapshot() {
        let storage = storage();
        let key = EntityKey::primary("doc-1");
        let doc = Doc {
            title: "draft".into(),
            revision: 1,
        };

        let etag = storage.write("Doc", &key, &doc, None).unwrap();
        let (read, read_etag) = storage.read::<Doc>("Doc", &key).unwrap().unwrap();
        assert_eq!(read, doc);
        assert_eq!(read_etag, etag);
        assert!(storage.read::<Doc>("Doc", &EntityKey::primary("doc-2")).unwrap().is_none());
    }

    #[test]
    fn stale_etag_is_rejected_without_mutation() {
        let storage = storage();
        let key = EntityKey::primary("doc-1");
        let first = storage
            .write("Doc", &key, &Doc { title: "v1".into(), revision: 1 }, None)
            .unwrap();
        let _second = storage
            .write("Doc", &key, &Doc { title: "v2".into(), revision: 2 }, Some(&first))
            .unwrap();

        // First token is stale now.
        let result = storage.write(
            "Doc",
            &key,
            &Doc { title: "v3".into(), revision: 3 },
            Some(&first),
        );
        assert!(matches!(result, Err(StorageError::EtagMismatch { .. })));

        let (current, _) = storage.read::<Doc>("Doc", &key).unwrap().unwrap();
        assert_eq!(current.title, "v2");
    }

    #[test]
    fn counters_and_last_write_track_history() {
        let storage = storage();
        let key = EntityKey::primary("doc-1");
        let doc = Doc { title: "t".into(), revision: 1 };

        storage.write("Doc", &key, &doc, None).unwrap();
        storage.read::<Doc>("Doc", &key).unwrap();
        storage.clear("Doc", &key, None).unwrap();

        assert_eq!(
            storage.counts(),
            OperationCounts { reads: 1, writes: 1, clears: 1 }
        );
        let last = storage.last_write().unwrap();
        assert_eq!(last.kind, "Doc");
        assert!(last.state.is_none());

        storage.reset_history();
        assert_eq!(storage.counts(), OperationCounts::default());
        assert!(storage.last_write().is_none());
    }
}
