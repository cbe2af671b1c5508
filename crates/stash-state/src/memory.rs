//! In-memory `StateStore` backend.
//!
//! Records live in a map from key to a per-record mutex. The map lock is held
//! only long enough to find or insert a record's guard, so operations on
//! different keys never wait on each other. Nothing survives a restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::StateStore;
use crate::types::{StateKey, StateRecord};

type Slot = Arc<Mutex<StateRecord>>;

/// Non-durable store for local use and tests.
#[derive(Default)]
pub struct InMemoryStateStore {
    records: RwLock<HashMap<StateKey, Slot>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all namespaces.
    pub fn len(&self) -> StoreResult<usize> {
        let records = self.records.read().map_err(|_| poisoned("record map"))?;
        Ok(records.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Copy of a record, lock state included.
    pub fn snapshot(&self, namespace: &str, identifier: &str) -> StoreResult<StateRecord> {
        let slot = self.slot(namespace, identifier)?;
        let record = lock_slot(&slot)?;
        Ok(record.clone())
    }

    fn slot(&self, namespace: &str, identifier: &str) -> StoreResult<Slot> {
        let records = self.records.read().map_err(|_| poisoned("record map"))?;
        records
            .get(&StateKey::new(namespace, identifier))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn unlock_inner(
        &self,
        namespace: &str,
        identifier: &str,
        lock_id: &str,
        force: bool,
    ) -> StoreResult<()> {
        let slot = self.slot(namespace, identifier)?;
        let mut record = lock_slot(&slot)?;

        let Some(holder) = record.lock_holder() else {
            return Ok(());
        };

        if !force && !lock_id.is_empty() && lock_id != holder {
            return Err(StoreError::LockedConflict {
                holder: holder.to_string(),
            });
        }

        debug!(%namespace, %identifier, force, "state unlocked");
        record.clear_lock();
        Ok(())
    }
}

impl StateStore for InMemoryStateStore {
    fn get(&self, namespace: &str, identifier: &str) -> StoreResult<Vec<u8>> {
        let slot = self.slot(namespace, identifier)?;
        let record = lock_slot(&slot)?;
        Ok(record.contents.clone())
    }

    fn update(
        &self,
        namespace: &str,
        identifier: &str,
        contents: Vec<u8>,
        lock_id: &str,
    ) -> StoreResult<()> {
        let slot = match self.slot(namespace, identifier) {
            Ok(slot) => slot,
            Err(StoreError::NotFound) => {
                let key = StateKey::new(namespace, identifier);
                let mut records = self.records.write().map_err(|_| poisoned("record map"))?;
                match records.get(&key) {
                    // Created by someone else between our read and write lock.
                    Some(slot) => slot.clone(),
                    None => {
                        let size = contents.len();
                        let record = StateRecord::new(key.clone(), contents);
                        records.insert(key, Arc::new(Mutex::new(record)));
                        debug!(%namespace, %identifier, size, "state created");
                        return Ok(());
                    }
                }
            }
            Err(e) => return Err(e),
        };

        let mut record = lock_slot(&slot)?;
        if !record.permits(lock_id) {
            return Err(StoreError::LockedConflict {
                holder: record.lock_holder().unwrap_or_default().to_string(),
            });
        }
        debug!(%namespace, %identifier, size = contents.len(), "state updated");
        record.contents = contents;
        Ok(())
    }

    fn lock(&self, namespace: &str, identifier: &str, lock_id: &str) -> StoreResult<()> {
        let slot = self.slot(namespace, identifier)?;
        let mut record = lock_slot(&slot)?;

        if let Some(holder) = record.lock_holder() {
            return Err(StoreError::LockedConflict {
                holder: holder.to_string(),
            });
        }

        record.set_lock(lock_id);
        debug!(%namespace, %identifier, %lock_id, "state locked");
        Ok(())
    }

    fn unlock(&self, namespace: &str, identifier: &str, lock_id: &str) -> StoreResult<()> {
        self.unlock_inner(namespace, identifier, lock_id, false)
    }

    fn force_unlock(&self, namespace: &str, identifier: &str) -> StoreResult<()> {
        self.unlock_inner(namespace, identifier, "", true)
    }

    fn delete(&self, _namespace: &str, _identifier: &str) -> StoreResult<()> {
        Err(StoreError::NotImplemented("delete"))
    }
}

fn lock_slot(slot: &Slot) -> StoreResult<MutexGuard<'_, StateRecord>> {
    slot.lock().map_err(|_| poisoned("state record"))
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Internal(format!("{what} lock poisoned"))
}
