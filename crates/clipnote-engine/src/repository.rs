//! Repository - coordination of payloads, index and cache for one record kind
//!
//! Mutations run durable-first: payload store, then metadata index, then
//! cache. A payload failure aborts the operation. An index failure after the
//! payload is durable is recorded in the reconciliation ledger and repaired
//! on the next full listing (or an explicit [`Repository::reconcile`]).
//!
//! Store calls block, so they run on tokio's blocking pool. The cache lock is
//! never held across an await.

use clipnote_common::text::normalize_query;
use clipnote_common::{CacheConfig, Error, IndexEntry, Record, RecordId, RecordKind, Result};
use clipnote_meta_store::MetadataIndex;
use clipnote_storage::{CacheManager, CacheStatsSnapshot, PayloadStore};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of [`Repository::delete_batch`]
#[derive(Debug, Default)]
pub struct BatchDeleteReport {
    /// Ids whose delete completed (absent ids included)
    pub deleted: usize,
    pub failed: Vec<(RecordId, Error)>,
}

impl BatchDeleteReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of an index sync against the payload store
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexSyncReport {
    /// Payloads that were missing from the index
    pub added: Vec<RecordId>,
    /// Index entries whose payload no longer exists
    pub removed: Vec<RecordId>,
    /// Payloads that could not be decoded and stay unindexed
    pub skipped: Vec<RecordId>,
}

impl IndexSyncReport {
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Diff payload ids against index ids and repair the index. Blocking.
pub(crate) fn sync_index<R: Record>(
    payloads: &dyn PayloadStore<R>,
    index: &dyn MetadataIndex,
) -> Result<IndexSyncReport> {
    let stored: HashSet<RecordId> = payloads.ids()?.into_iter().collect();
    let indexed: HashSet<RecordId> = index.get_all()?.into_iter().map(|e| e.id).collect();

    let mut report = IndexSyncReport::default();
    for id in stored.difference(&indexed) {
        match payloads.load(id) {
            Ok(Some(record)) => {
                index.upsert(&record.to_index_entry())?;
                report.added.push(*id);
            }
            Ok(None) => {}
            Err(e) if e.is_corrupted() => {
                error!("Leaving {} {} unindexed: {}", R::KIND, id, e);
                report.skipped.push(*id);
            }
            Err(e) => return Err(e),
        }
    }
    for id in indexed.difference(&stored) {
        index.delete(id)?;
        report.removed.push(*id);
    }

    if report.changed() {
        info!(
            "Synced {} index: {} added, {} removed",
            R::KIND,
            report.added.len(),
            report.removed.len()
        );
    }
    Ok(report)
}

/// Point-in-time repository statistics
#[derive(Clone, Debug)]
pub struct RepositoryStats {
    pub kind: RecordKind,
    /// Index entries
    pub indexed: usize,
    /// Stored payloads
    pub payloads: usize,
    /// Ids waiting for an index entry
    pub pending_reconcile: usize,
    pub degraded: bool,
    pub cache: CacheStatsSnapshot,
}

struct Inner<R: Record> {
    payloads: Arc<dyn PayloadStore<R>>,
    index: Arc<dyn MetadataIndex>,
    cache: CacheManager<R>,
    /// Ids with a durable payload but no index entry
    pending: Mutex<HashSet<RecordId>>,
    degraded: bool,
}

/// Storage coordinator for one record kind. Cheap to clone.
pub struct Repository<R: Record> {
    inner: Arc<Inner<R>>,
}

impl<R: Record> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Run blocking store work on the blocking pool
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::internal(format!("blocking task failed: {e}")))?
}

impl<R: Record> Repository<R> {
    pub fn new(
        payloads: Arc<dyn PayloadStore<R>>,
        index: Arc<dyn MetadataIndex>,
        cache: CacheConfig,
    ) -> Self {
        Self::build(payloads, index, cache, false)
    }

    /// Repository over fallback stores, flagged in its statistics
    pub(crate) fn degraded(
        payloads: Arc<dyn PayloadStore<R>>,
        index: Arc<dyn MetadataIndex>,
        cache: CacheConfig,
    ) -> Self {
        Self::build(payloads, index, cache, true)
    }

    fn build(
        payloads: Arc<dyn PayloadStore<R>>,
        index: Arc<dyn MetadataIndex>,
        cache: CacheConfig,
        degraded: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                payloads,
                index,
                cache: CacheManager::new(cache),
                pending: Mutex::new(HashSet::new()),
                degraded,
            }),
        }
    }

    #[must_use]
    pub fn kind(&self) -> RecordKind {
        R::KIND
    }

    /// Store a new record
    pub async fn create(&self, record: R) -> Result<()> {
        self.write(record).await
    }

    /// Replace a record wholesale; an unknown id is stored as new
    pub async fn update(&self, record: R) -> Result<()> {
        self.write(record).await
    }

    async fn write(&self, record: R) -> Result<()> {
        let id = record.id();
        let entry = record.to_index_entry();

        let inner = Arc::clone(&self.inner);
        let record = blocking(move || {
            inner.payloads.save(&record)?;
            Ok(record)
        })
        .await
        .inspect_err(|e| error!("Failed to save {} {}: {}", R::KIND, id, e))?;

        let inner = Arc::clone(&self.inner);
        if let Err(e) = blocking(move || inner.index.upsert(&entry)).await {
            let partial = Error::PartialConsistency {
                id,
                reason: e.to_string(),
            };
            warn!("{}", partial);
            self.inner.pending.lock().insert(id);
        } else {
            self.inner.pending.lock().remove(&id);
        }

        self.inner.cache.refresh(&record);
        debug!("Stored {} {}", R::KIND, id);
        Ok(())
    }

    /// Read a full record. Absent and undecodable payloads read as `None`.
    pub async fn read(&self, id: RecordId) -> Result<Option<R>> {
        if let Some(record) = self.inner.cache.record(&id) {
            return Ok(Some(record));
        }

        let fill = self.inner.cache.begin_fill();
        let inner = Arc::clone(&self.inner);
        match blocking(move || inner.payloads.load(&id)).await {
            Ok(Some(record)) => {
                fill.put_record(record.clone());
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(e) if e.is_corrupted() => {
                error!("Reading {} {} as absent: {}", R::KIND, id, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Read a record that must exist
    pub async fn fetch(&self, id: RecordId) -> Result<R> {
        self.read(id).await?.ok_or(Error::NotFound(id))
    }

    /// Delete a record. Deleting an absent id succeeds.
    pub async fn delete(&self, id: RecordId) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        blocking(move || inner.payloads.delete(&id))
            .await
            .inspect_err(|e| error!("Failed to delete {} {}: {}", R::KIND, id, e))?;

        let inner = Arc::clone(&self.inner);
        if let Err(e) = blocking(move || inner.index.delete(&id)).await {
            warn!(
                "Index entry for deleted {} {} left behind until the next rebuild: {}",
                R::KIND,
                id,
                e
            );
        }

        self.inner.pending.lock().remove(&id);
        self.inner.cache.invalidate(&id);
        debug!("Deleted {} {}", R::KIND, id);
        Ok(())
    }

    /// Delete many records concurrently. There is no cross-id atomicity.
    pub async fn delete_batch(&self, ids: &[RecordId]) -> BatchDeleteReport {
        let results = join_all(ids.iter().map(|id| self.delete(*id))).await;

        let mut report = BatchDeleteReport::default();
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(()) => report.deleted += 1,
                Err(e) => report.failed.push((*id, e)),
            }
        }
        report
    }

    /// Full-text search over index entries, best match first
    pub async fn search(&self, query: &str) -> Result<Vec<IndexEntry>> {
        let key = normalize_query(query);
        if key.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(results) = self.inner.cache.search(&key) {
            return Ok(results.as_ref().clone());
        }

        let fill = self.inner.cache.begin_fill();
        let inner = Arc::clone(&self.inner);
        let query = query.to_string();
        let results = Arc::new(blocking(move || inner.index.search(&query)).await?);
        fill.put_entries(results.iter());
        fill.put_search(key, Arc::clone(&results));
        Ok(results.as_ref().clone())
    }

    /// A page of index entries, newest first
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<IndexEntry>> {
        let inner = Arc::clone(&self.inner);
        blocking(move || inner.index.list(limit, offset)).await
    }

    /// Index entry for one id, served from L2 when cached
    pub async fn entry(&self, id: RecordId) -> Result<Option<IndexEntry>> {
        if let Some(entry) = self.inner.cache.entry(&id) {
            return Ok(Some(entry));
        }
        let fill = self.inner.cache.begin_fill();
        let inner = Arc::clone(&self.inner);
        let entry = blocking(move || inner.index.get(&id)).await?;
        if let Some(entry) = &entry {
            fill.put_entry(entry.clone());
        }
        Ok(entry)
    }

    /// Every index entry, newest first, after repairing pending ids
    pub async fn get_all_indexes(&self) -> Result<Vec<IndexEntry>> {
        if let Err(e) = self.reconcile().await {
            warn!("Reconciliation of {} index failed: {}", R::KIND, e);
        }

        let fill = self.inner.cache.begin_fill();
        let inner = Arc::clone(&self.inner);
        let entries = blocking(move || inner.index.get_all()).await?;

        // Oldest of the leading entries first, so the newest end up most recent
        let warm = entries.len().min(self.inner.cache.entries_capacity());
        fill.put_entries(entries[..warm].iter().rev());
        Ok(entries)
    }

    /// Remove every record of this kind
    pub async fn clear(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        blocking(move || inner.payloads.clear()).await?;

        let inner = Arc::clone(&self.inner);
        let cleared = blocking(move || inner.index.clear()).await;
        self.inner.cache.clear();
        self.inner.pending.lock().clear();
        cleared
    }

    /// Number of index entries
    pub async fn count(&self) -> Result<usize> {
        let inner = Arc::clone(&self.inner);
        blocking(move || inner.index.count()).await
    }

    pub async fn stats(&self) -> Result<RepositoryStats> {
        let inner = Arc::clone(&self.inner);
        let (indexed, payloads) =
            blocking(move || Ok((inner.index.count()?, inner.payloads.len()))).await?;
        Ok(RepositoryStats {
            kind: R::KIND,
            indexed,
            payloads,
            pending_reconcile: self.inner.pending.lock().len(),
            degraded: self.inner.degraded,
            cache: self.inner.cache.stats(),
        })
    }

    /// Re-derive index entries for ids in the ledger; returns how many were
    /// repaired. Ids that still fail stay in the ledger.
    pub async fn reconcile(&self) -> Result<usize> {
        let pending: Vec<RecordId> = self.inner.pending.lock().drain().collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let inner = Arc::clone(&self.inner);
        let repaired = blocking(move || {
            let mut repaired = 0;
            for id in pending {
                let result = inner.payloads.load(&id).and_then(|record| match record {
                    Some(record) => inner.index.upsert(&record.to_index_entry()).map(|()| true),
                    None => Ok(false),
                });
                match result {
                    Ok(true) => repaired += 1,
                    Ok(false) => debug!("Pending {} {} no longer stored", R::KIND, id),
                    Err(e) if e.is_corrupted() => {
                        error!("Dropping pending {} {}: {}", R::KIND, id, e);
                    }
                    Err(e) => {
                        warn!("Pending {} {} still unindexed: {}", R::KIND, id, e);
                        inner.pending.lock().insert(id);
                    }
                }
            }
            Ok(repaired)
        })
        .await?;

        if repaired > 0 {
            self.inner.cache.invalidate_searches();
            debug!("Reconciled {} {} index entries", repaired, R::KIND);
        }
        Ok(repaired)
    }

    /// Bring the index in line with the payload store after a restart: index
    /// payloads that have no entry and drop entries whose payload is gone.
    ///
    /// Unlike [`Self::rebuild_index`] only the differing ids are touched.
    pub async fn sync_index(&self) -> Result<IndexSyncReport> {
        let inner = Arc::clone(&self.inner);
        let report =
            blocking(move || sync_index(inner.payloads.as_ref(), inner.index.as_ref())).await?;

        if report.changed() {
            self.inner.pending.lock().clear();
            self.inner.cache.invalidate_searches();
            for id in &report.removed {
                self.inner.cache.invalidate(id);
            }
        }
        Ok(report)
    }

    /// Rebuild the index from every stored payload; returns the entry count
    pub async fn rebuild_index(&self) -> Result<usize> {
        let inner = Arc::clone(&self.inner);
        let count = blocking(move || {
            // Load first: a failed scan must leave the current index in place
            let records = inner.payloads.load_all()?;
            inner.index.clear()?;
            for record in &records {
                inner.index.upsert(&record.to_index_entry())?;
            }
            Ok(records.len())
        })
        .await?;

        self.inner.pending.lock().clear();
        self.inner.cache.clear();
        info!("Rebuilt {} index: {} entries", R::KIND, count);
        Ok(count)
    }

    /// Compact the index storage
    pub async fn compact(&self) -> Result<bool> {
        let inner = Arc::clone(&self.inner);
        blocking(move || inner.index.compact()).await
    }
}
