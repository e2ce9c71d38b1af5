//! Per-record serialization of routing actions.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Hands out one async lock per `(subject, record)` pair.
///
/// Actions on different records never contend. Entries are removed once
/// nobody holds or waits on them, so the map only grows with the number of
/// records currently being acted on.
#[derive(Debug, Default)]
pub struct RecordGate {
    locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

/// Holds a record's lock until dropped.
#[derive(Debug)]
pub struct RecordPermit {
    _guard: OwnedMutexGuard<()>,
}

impl RecordGate {
    /// Creates an empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to a record.
    pub async fn acquire(&self, subject_id: &str, record_id: &str) -> RecordPermit {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                locks
                    .entry((subject_id.to_string(), record_id.to_string()))
                    .or_default(),
            )
        };

        RecordPermit {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of records with a live lock entry.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Returns true if no record is locked.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
