//! In-memory payload store, used for degraded mode and tests

use crate::payload::PayloadStore;
use clipnote_common::{Record, RecordId, Result};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Payload store backed by a hash map; nothing survives the process
pub struct MemoryPayloadStore<R> {
    records: RwLock<HashMap<RecordId, R>>,
}

impl<R> MemoryPayloadStore<R> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl<R> Default for MemoryPayloadStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> PayloadStore<R> for MemoryPayloadStore<R> {
    fn save(&self, record: &R) -> Result<()> {
        self.records.write().insert(record.id(), record.clone());
        Ok(())
    }

    fn load(&self, id: &RecordId) -> Result<Option<R>> {
        Ok(self.records.read().get(id).cloned())
    }

    fn delete(&self, id: &RecordId) -> Result<()> {
        self.records.write().remove(id);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<R>> {
        Ok(self.records.read().values().cloned().collect())
    }

    fn ids(&self) -> Result<Vec<RecordId>> {
        Ok(self.records.read().keys().copied().collect())
    }

    fn clear(&self) -> Result<()> {
        self.records.write().clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.read().len()
    }
}
