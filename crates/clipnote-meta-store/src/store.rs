//! Persistent metadata index backed by redb.
//!
//! One [`IndexDatabase`] owns the `index.redb` file; each record kind gets a
//! [`RedbIndex`] view over its own tables. Every mutation rewrites the row,
//! ordering key, postings and counters in a single write transaction.

use crate::index::MetadataIndex;
use crate::search::{self, Bm25, TermHits};
use crate::tables::{self, KindTables, reverse_timestamp};
use clipnote_common::text::query_terms;
use clipnote_common::{Error, IndexEntry, RecordId, RecordKind, Result};
use parking_lot::RwLock;
use redb::{Database, ReadableTable, ReadableTableMetadata};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Error type for metadata store operations
#[derive(Debug, thiserror::Error)]
pub enum MetaStoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("redb compaction error: {0}")]
    Compaction(#[from] redb::CompactionError),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<redb::TransactionError> for MetaStoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<MetaStoreError> for Error {
    fn from(e: MetaStoreError) -> Self {
        match e {
            MetaStoreError::Bincode(e) => Self::corrupted("index entry", e),
            MetaStoreError::Io(e) => Self::Io(e),
            other => Self::index(other.to_string()),
        }
    }
}

pub type MetaStoreResult<T> = std::result::Result<T, MetaStoreError>;

/// The shared index database file.
///
/// Transactions run under the read side of the lock; compaction needs the
/// database exclusively and takes the write side.
pub struct IndexDatabase {
    path: PathBuf,
    db: RwLock<Database>,
}

impl IndexDatabase {
    /// Open (or create) the database and every kind's tables.
    ///
    /// Any failure is reported as [`Error::IndexUnavailable`].
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        Self::open_inner(path)
            .map(Arc::new)
            .map_err(|e| Error::IndexUnavailable(format!("{}: {e}", path.display())))
    }

    fn open_inner(path: &Path) -> MetaStoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        for kind in [RecordKind::Note, RecordKind::Clipboard] {
            let t = KindTables::for_kind(kind);
            write_txn.open_table(t.entries)?;
            write_txn.open_table(t.by_modified)?;
            write_txn.open_table(t.postings)?;
            write_txn.open_table(t.totals)?;
        }
        write_txn.commit()?;

        info!("Opened index database at {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            db: RwLock::new(db),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index view for one record kind
    #[must_use]
    pub fn index(self: &Arc<Self>, kind: RecordKind) -> RedbIndex {
        RedbIndex {
            db: Arc::clone(self),
            kind,
            tables: KindTables::for_kind(kind),
        }
    }

    /// Compact the database file, waiting out in-flight transactions
    pub fn compact(&self) -> MetaStoreResult<bool> {
        let mut db = self.db.write();
        let compacted = db.compact()?;
        info!("Compacted index database at {:?}: {}", self.path, compacted);
        Ok(compacted)
    }
}

/// Metadata index for one record kind
pub struct RedbIndex {
    db: Arc<IndexDatabase>,
    kind: RecordKind,
    tables: KindTables,
}

fn total(table: &impl ReadableTable<&'static str, u64>, name: &str) -> MetaStoreResult<u64> {
    Ok(table.get(name)?.map_or(0, |v| v.value()))
}

fn decode(bytes: &[u8]) -> MetaStoreResult<IndexEntry> {
    Ok(bincode::deserialize(bytes)?)
}

impl RedbIndex {
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn upsert_entry(&self, entry: &IndexEntry) -> MetaStoreResult<()> {
        let key = entry.id.as_u128();
        let bytes = bincode::serialize(entry)?;
        let terms = entry.search_terms();

        let db = self.db.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut entries = write_txn.open_table(self.tables.entries)?;
            let mut by_modified = write_txn.open_table(self.tables.by_modified)?;
            let mut postings = write_txn.open_table(self.tables.postings)?;
            let mut totals = write_txn.open_table(self.tables.totals)?;

            let mut docs = total(&totals, tables::DOCS)?;
            let mut tokens = total(&totals, tables::TOKENS)?;

            let previous = entries.get(key)?.map(|v| v.value().to_vec());
            match previous {
                Some(old) => match decode(&old) {
                    Ok(old) => {
                        by_modified.remove((reverse_timestamp(old.modified_at), key))?;
                        for (term, _) in old.search_terms() {
                            postings.remove((term.as_str(), key))?;
                        }
                        tokens = tokens.saturating_sub(u64::from(search::doc_len(&old)));
                    }
                    // Stale postings of the old row are filtered at query time
                    Err(e) => warn!(
                        "Replacing undecodable {} index row {}: {}",
                        self.kind, entry.id, e
                    ),
                },
                None => docs += 1,
            }

            entries.insert(key, bytes.as_slice())?;
            by_modified.insert((reverse_timestamp(entry.modified_at), key), ())?;
            for (term, tf) in &terms {
                postings.insert((term.as_str(), key), *tf)?;
            }
            tokens += terms.iter().map(|(_, tf)| u64::from(*tf)).sum::<u64>();
            totals.insert(tables::DOCS, docs)?;
            totals.insert(tables::TOKENS, tokens)?;
        }
        write_txn.commit()?;
        debug!("Indexed {} {} ({} terms)", self.kind, entry.id, terms.len());
        Ok(())
    }

    pub fn get_entry(&self, id: &RecordId) -> MetaStoreResult<Option<IndexEntry>> {
        let db = self.db.db.read();
        let read_txn = db.begin_read()?;
        let entries = read_txn.open_table(self.tables.entries)?;
        let Some(bytes) = entries.get(id.as_u128())? else {
            return Ok(None);
        };
        decode(bytes.value()).map(Some)
    }

    /// Walk the ordering table, skipping `offset` rows and stopping at `limit`
    pub fn list_entries(&self, limit: usize, offset: usize) -> MetaStoreResult<Vec<IndexEntry>> {
        let db = self.db.db.read();
        let read_txn = db.begin_read()?;
        let by_modified = read_txn.open_table(self.tables.by_modified)?;
        let entries = read_txn.open_table(self.tables.entries)?;

        let mut result = Vec::new();
        for item in by_modified.iter()?.skip(offset) {
            if result.len() >= limit {
                break;
            }
            let (key, _) = item?;
            let (_, id) = key.value();
            let Some(bytes) = entries.get(id)? else {
                continue;
            };
            match decode(bytes.value()) {
                Ok(entry) => result.push(entry),
                Err(e) => error!(
                    "Failed to decode {} index row {}: {}",
                    self.kind,
                    RecordId::from_u128(id),
                    e
                ),
            }
        }
        Ok(result)
    }

    pub fn search_entries(&self, query: &str) -> MetaStoreResult<Vec<IndexEntry>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let db = self.db.db.read();
        let read_txn = db.begin_read()?;
        let postings = read_txn.open_table(self.tables.postings)?;
        let entries = read_txn.open_table(self.tables.entries)?;
        let totals = read_txn.open_table(self.tables.totals)?;

        let mut hits: Vec<TermHits> = Vec::with_capacity(terms.len());
        for term in &terms {
            let text = term.text.as_str();
            let mut matched = TermHits::new();
            if term.prefix {
                for item in postings.range((text, 0u128)..)? {
                    let (key, tf) = item?;
                    let (token, id) = key.value();
                    if !token.starts_with(text) {
                        break;
                    }
                    *matched.entry(RecordId::from_u128(id)).or_insert(0) += tf.value();
                }
            } else {
                for item in postings.range((text, 0u128)..=(text, u128::MAX))? {
                    let (key, tf) = item?;
                    let (_, id) = key.value();
                    matched.insert(RecordId::from_u128(id), tf.value());
                }
            }
            if matched.is_empty() {
                return Ok(Vec::new());
            }
            hits.push(matched);
        }

        let bm25 = Bm25::new(
            total(&totals, tables::DOCS)?,
            total(&totals, tables::TOKENS)?,
        );
        search::rank::<MetaStoreError>(&hits, &bm25, |id| {
            let Some(bytes) = entries.get(id.as_u128())? else {
                return Ok(None);
            };
            match decode(bytes.value()) {
                Ok(entry) => Ok(Some(entry)),
                Err(e) => {
                    error!("Failed to decode {} index row {}: {}", self.kind, id, e);
                    Ok(None)
                }
            }
        })
    }

    pub fn delete_entry(&self, id: &RecordId) -> MetaStoreResult<()> {
        let key = id.as_u128();
        let db = self.db.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut entries = write_txn.open_table(self.tables.entries)?;
            let previous = entries.remove(key)?.map(|v| v.value().to_vec());
            let Some(old) = previous else {
                // Nothing to delete; the empty txn is dropped (aborted)
                return Ok(());
            };

            let mut by_modified = write_txn.open_table(self.tables.by_modified)?;
            let mut postings = write_txn.open_table(self.tables.postings)?;
            let mut totals = write_txn.open_table(self.tables.totals)?;

            let docs = total(&totals, tables::DOCS)?.saturating_sub(1);
            let mut tokens = total(&totals, tables::TOKENS)?;
            match decode(&old) {
                Ok(old) => {
                    by_modified.remove((reverse_timestamp(old.modified_at), key))?;
                    for (term, _) in old.search_terms() {
                        postings.remove((term.as_str(), key))?;
                    }
                    tokens = tokens.saturating_sub(u64::from(search::doc_len(&old)));
                }
                Err(e) => warn!("Deleting undecodable {} index row {}: {}", self.kind, id, e),
            }
            totals.insert(tables::DOCS, docs)?;
            totals.insert(tables::TOKENS, tokens)?;
        }
        write_txn.commit()?;
        debug!("Removed {} {} from index", self.kind, id);
        Ok(())
    }

    pub fn clear_entries(&self) -> MetaStoreResult<()> {
        let db = self.db.db.read();
        let write_txn = db.begin_write()?;
        write_txn.delete_table(self.tables.entries)?;
        write_txn.delete_table(self.tables.by_modified)?;
        write_txn.delete_table(self.tables.postings)?;
        write_txn.delete_table(self.tables.totals)?;
        write_txn.open_table(self.tables.entries)?;
        write_txn.open_table(self.tables.by_modified)?;
        write_txn.open_table(self.tables.postings)?;
        write_txn.open_table(self.tables.totals)?;
        write_txn.commit()?;
        info!("Cleared {} index", self.kind);
        Ok(())
    }

    pub fn count_entries(&self) -> MetaStoreResult<usize> {
        let db = self.db.db.read();
        let read_txn = db.begin_read()?;
        let entries = read_txn.open_table(self.tables.entries)?;
        Ok(usize::try_from(entries.len()?).unwrap_or(usize::MAX))
    }
}

impl MetadataIndex for RedbIndex {
    fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        Ok(self.upsert_entry(entry)?)
    }

    fn get(&self, id: &RecordId) -> Result<Option<IndexEntry>> {
        Ok(self.get_entry(id)?)
    }

    fn get_all(&self) -> Result<Vec<IndexEntry>> {
        Ok(self.list_entries(usize::MAX, 0)?)
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<IndexEntry>> {
        Ok(self.list_entries(limit, offset)?)
    }

    fn search(&self, query: &str) -> Result<Vec<IndexEntry>> {
        Ok(self.search_entries(query)?)
    }

    fn delete(&self, id: &RecordId) -> Result<()> {
        Ok(self.delete_entry(id)?)
    }

    fn clear(&self) -> Result<()> {
        Ok(self.clear_entries()?)
    }

    fn count(&self) -> Result<usize> {
        Ok(self.count_entries()?)
    }

    fn compact(&self) -> Result<bool> {
        Ok(self.db.compact()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipnote_common::{ClipContent, ClipboardItem, Note, Record};
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Arc<IndexDatabase> {
        IndexDatabase::open(dir.path().join("index.redb")).unwrap()
    }

    fn note_entry(title: &str, content: &str, modified_at: u64) -> IndexEntry {
        let mut note = Note::new(RecordId::new(), title, content);
        note.modified_at = modified_at;
        note.to_index_entry()
    }

    #[test]
    fn test_upsert_and_get() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir).index(RecordKind::Note);
        let e = note_entry("Plan", "quarterly plan", 1);

        index.upsert(&e).unwrap();
        assert_eq!(index.get(&e.id).unwrap(), Some(e.clone()));
        assert!(index.get(&RecordId::new()).unwrap().is_none());
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_replaces_row_and_postings() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir).index(RecordKind::Note);
        let mut e = note_entry("draft", "old text", 1);
        index.upsert(&e).unwrap();

        e.title = "final".into();
        e.preview = "new text".into();
        e.modified_at = 2;
        index.upsert(&e).unwrap();

        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.get_all().unwrap(), vec![e.clone()]);
        assert!(index.search("draft").unwrap().is_empty());
        assert!(index.search("old").unwrap().is_empty());
        assert_eq!(index.search("final").unwrap(), vec![e]);
    }

    #[test]
    fn test_list_order_and_paging() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir).index(RecordKind::Note);
        let entries: Vec<IndexEntry> = (0..5)
            .map(|i| note_entry(&format!("n{i}"), "", 100 + i))
            .collect();
        for e in &entries {
            index.upsert(e).unwrap();
        }

        let all = index.get_all().unwrap();
        let times: Vec<u64> = all.iter().map(|e| e.modified_at).collect();
        assert_eq!(times, vec![104, 103, 102, 101, 100]);

        let page = index.list(2, 1).unwrap();
        assert_eq!(page, all[1..3].to_vec());
        assert!(index.list(2, 10).unwrap().is_empty());
        assert!(index.list(0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_search_ranking() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir).index(RecordKind::Note);
        let strong = note_entry("rust rust rust", "rust notes", 1);
        let weak = note_entry(
            "cooking",
            "a note that mentions rust once among many other words here",
            2,
        );
        let other = note_entry("gardening", "tomatoes", 3);
        for e in [&strong, &weak, &other] {
            index.upsert(e).unwrap();
        }

        let results = index.search("Rust").unwrap();
        assert_eq!(results, vec![strong, weak]);
        assert!(index.search("rust gardening").unwrap().is_empty());
        assert!(index.search("").unwrap().is_empty());
        assert!(index.search("nothing-matches-this").unwrap().is_empty());
    }

    #[test]
    fn test_prefix_search() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir).index(RecordKind::Note);
        let e = note_entry("Quarterly planning", "", 1);
        let other = note_entry("quasar", "", 2);
        index.upsert(&e).unwrap();
        index.upsert(&other).unwrap();

        assert_eq!(index.search("plan*").unwrap(), vec![e.clone()]);
        assert!(index.search("plan").unwrap().is_empty());
        assert_eq!(index.search("qua*").unwrap().len(), 2);
        assert_eq!(index.search("quart* plan*").unwrap(), vec![e]);
    }

    #[test]
    fn test_kinds_are_isolated() {
        let dir = TempDir::new().unwrap();
        let db = open(&dir);
        let notes = db.index(RecordKind::Note);
        let clips = db.index(RecordKind::Clipboard);

        let note = note_entry("shared word", "", 1);
        let clip = ClipboardItem::new(RecordId::new(), ClipContent::Text("shared word".into()))
            .to_index_entry();
        notes.upsert(&note).unwrap();
        clips.upsert(&clip).unwrap();

        assert_eq!(notes.search("shared").unwrap(), vec![note]);
        assert_eq!(clips.search("shared").unwrap(), vec![clip]);
        notes.clear().unwrap();
        assert_eq!(notes.count().unwrap(), 0);
        assert_eq!(clips.count().unwrap(), 1);
    }

    #[test]
    fn test_delete_idempotent() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir).index(RecordKind::Note);
        let e = note_entry("gone", "soon", 1);
        index.upsert(&e).unwrap();

        index.delete(&e.id).unwrap();
        index.delete(&e.id).unwrap();
        assert!(index.get(&e.id).unwrap().is_none());
        assert!(index.search("gone").unwrap().is_empty());
        assert!(index.get_all().unwrap().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let e = note_entry("durable", "entry", 7);
        {
            let index = open(&dir).index(RecordKind::Note);
            index.upsert(&e).unwrap();
        }
        let db = open(&dir);
        let index = db.index(RecordKind::Note);
        assert_eq!(index.search("durable").unwrap(), vec![e]);
        assert!(index.compact().is_ok());
    }

    #[test]
    fn test_open_garbage_file_unavailable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.redb");
        std::fs::write(&path, vec![0x5a; 4096]).unwrap();

        let err = IndexDatabase::open(&path).err().unwrap();
        assert!(matches!(err, Error::IndexUnavailable(_)));
    }
}
