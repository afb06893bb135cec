//! Metadata index abstraction

use clipnote_common::{IndexEntry, RecordId, Result};

/// Listing and full-text search over the index entries of one record kind.
///
/// Calls are blocking; async callers run them on a blocking pool.
pub trait MetadataIndex: Send + Sync {
    /// Insert or replace the entry for `entry.id`, search terms included
    fn upsert(&self, entry: &IndexEntry) -> Result<()>;

    fn get(&self, id: &RecordId) -> Result<Option<IndexEntry>>;

    /// Every entry, newest `modified_at` first
    fn get_all(&self) -> Result<Vec<IndexEntry>>;

    /// A page of the `get_all` ordering
    fn list(&self, limit: usize, offset: usize) -> Result<Vec<IndexEntry>>;

    /// Entries matching every query term, best BM25 score first.
    ///
    /// Queries without terms match nothing.
    fn search(&self, query: &str) -> Result<Vec<IndexEntry>>;

    /// Remove an entry. Removing an absent id is not an error.
    fn delete(&self, id: &RecordId) -> Result<()>;

    fn clear(&self) -> Result<()>;

    fn count(&self) -> Result<usize>;

    /// Reclaim unused space; returns whether anything was compacted
    fn compact(&self) -> Result<bool>;
}
