//! Storage factory
//!
//! Builds one repository per record kind over a base directory:
//!
//! ```text
//! <base>/
//! ├── index.redb
//! ├── notes/       # sharded note payloads
//! └── clipboard/   # sharded clipboard payloads
//! ```
//!
//! When the index database cannot be opened the factory falls back to
//! in-memory stores for the rest of the process and says so once.
//!
//! At open, a kind whose index entry count differs from its payload count
//! (an index write lost in an earlier process, or a payload removed by
//! hand) is synced against the payload store.

use crate::repository::{Repository, sync_index};
use clipnote_common::{ClipboardItem, Config, Note, Record, Result};
use clipnote_meta_store::{IndexDatabase, MemoryIndex, MetadataIndex};
use clipnote_storage::{MemoryPayloadStore, PayloadStore, ShardedStore};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Index database file name under the base directory
pub const INDEX_FILE: &str = "index.redb";

/// How the storage was opened
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageMode {
    /// Persistent payloads and index
    Normal,
    /// In-memory only; nothing written survives the process
    Degraded { reason: String },
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Degraded { reason } => write!(f, "degraded ({reason})"),
        }
    }
}

/// Repositories for both record kinds
#[derive(Clone)]
pub struct Storage {
    pub notes: Repository<Note>,
    pub clipboard: Repository<ClipboardItem>,
    pub mode: StorageMode,
}

impl Storage {
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self.mode, StorageMode::Degraded { .. })
    }
}

/// Opens [`Storage`] from configuration
pub struct StorageFactory {
    config: Config,
}

impl StorageFactory {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Open persistent storage, falling back to memory if the index is
    /// unavailable. Payload directory failures are returned.
    ///
    /// Blocking; call it before serving requests.
    pub fn open(&self) -> Result<Storage> {
        self.config.validate()?;
        let base = &self.config.storage.base_dir;
        std::fs::create_dir_all(base)?;

        let db = match IndexDatabase::open(base.join(INDEX_FILE)) {
            Ok(db) => db,
            Err(e) => {
                warn!("Falling back to in-memory storage: {}", e);
                return Ok(Self::memory_storage(
                    &self.config,
                    StorageMode::Degraded {
                        reason: e.to_string(),
                    },
                ));
            }
        };

        let notes = self.open_repository::<Note>(&db)?;
        let clipboard = self.open_repository::<ClipboardItem>(&db)?;

        info!("Opened storage at {:?}", base);
        Ok(Storage {
            notes,
            clipboard,
            mode: StorageMode::Normal,
        })
    }

    fn open_repository<R: Record>(&self, db: &Arc<IndexDatabase>) -> Result<Repository<R>> {
        let payloads: Arc<dyn PayloadStore<R>> = Arc::new(ShardedStore::<R>::open(
            self.config.storage.base_dir.join(R::KIND.dir_name()),
            self.config.sharding_for(R::KIND),
        )?);
        let index: Arc<dyn MetadataIndex> = Arc::new(db.index(R::KIND));

        let (indexed, stored) = (index.count()?, payloads.len());
        if indexed != stored {
            warn!(
                "{} index has {} entries for {} payloads, syncing",
                R::KIND,
                indexed,
                stored
            );
            if let Err(e) = sync_index(payloads.as_ref(), index.as_ref()) {
                warn!("Index sync for {} failed: {}", R::KIND, e);
            }
        }

        Ok(Repository::new(payloads, index, self.config.cache))
    }

    /// Storage that lives only in memory
    #[must_use]
    pub fn in_memory(config: &Config) -> Storage {
        Self::memory_storage(config, StorageMode::Normal)
    }

    fn memory_storage(config: &Config, mode: StorageMode) -> Storage {
        let degraded = matches!(mode, StorageMode::Degraded { .. });
        Storage {
            notes: memory_repository(config, degraded),
            clipboard: memory_repository(config, degraded),
            mode,
        }
    }
}

fn memory_repository<R: Record>(config: &Config, degraded: bool) -> Repository<R> {
    let payloads = Arc::new(MemoryPayloadStore::<R>::new());
    let index = Arc::new(MemoryIndex::new());
    if degraded {
        Repository::degraded(payloads, index, config.cache)
    } else {
        Repository::new(payloads, index, config.cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipnote_common::{ClipContent, RecordId, ShardingStrategy};
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.base_dir = dir.path().join("data");
        config
    }

    #[tokio::test]
    async fn test_open_creates_layout() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let storage = StorageFactory::new(config.clone()).open().unwrap();
        assert_eq!(storage.mode, StorageMode::Normal);

        let note = Note::new(RecordId::new(), "Plan", "quarterly plan");
        let clip = ClipboardItem::new(RecordId::new(), ClipContent::Text("copied".into()));
        storage.notes.create(note.clone()).await.unwrap();
        storage.clipboard.create(clip.clone()).await.unwrap();

        let base = &config.storage.base_dir;
        assert!(base.join(INDEX_FILE).is_file());
        assert!(base.join("notes/items").join(format!("{}.rec", note.id)).is_file());
        assert!(base.join("notes").join(clipnote_storage::MAP_FILE).is_file());
        assert!(base.join("clipboard").join(clipnote_storage::MAP_FILE).is_file());
        assert_eq!(storage.notes.search("quarterly").await.unwrap().len(), 1);
        assert!(storage.clipboard.search("quarterly").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.clipboard.sharding = Some(ShardingStrategy::ByHashBucket { buckets: 16 });
        let clip = ClipboardItem::new(RecordId::new(), ClipContent::Text("durable".into()));
        {
            let storage = StorageFactory::new(config.clone()).open().unwrap();
            storage.clipboard.create(clip.clone()).await.unwrap();
        }

        let storage = StorageFactory::new(config).open().unwrap();
        assert_eq!(storage.clipboard.read(clip.id).await.unwrap(), Some(clip));
        assert_eq!(storage.clipboard.search("durable").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_syncs_index_with_payloads() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        let removed = Note::new(RecordId::new(), "Removed", "deleted by hand");
        {
            let storage = StorageFactory::new(config.clone()).open().unwrap();
            storage.notes.create(removed.clone()).await.unwrap();
        }

        // Between runs: one payload lost its index write, one was removed
        let base = &config.storage.base_dir;
        let unindexed = Note::new(RecordId::new(), "Orphan", "quarterly plan");
        {
            let payloads: ShardedStore<Note> = ShardedStore::open(
                base.join(Note::KIND.dir_name()),
                config.sharding_for(Note::KIND),
            )
            .unwrap();
            payloads.save(&unindexed).unwrap();
            payloads.save(&Note::new(RecordId::new(), "Extra", "second orphan")).unwrap();
            payloads.delete(&removed.id).unwrap();
        }

        let storage = StorageFactory::new(config).open().unwrap();
        assert_eq!(storage.notes.count().await.unwrap(), 2);
        let found = storage.notes.search("quarterly").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, unindexed.id);
        assert!(storage.notes.search("deleted").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unusable_index_falls_back_to_memory() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        std::fs::create_dir_all(&config.storage.base_dir).unwrap();
        std::fs::write(config.storage.base_dir.join(INDEX_FILE), vec![0x5a; 4096]).unwrap();

        let storage = StorageFactory::new(config).open().unwrap();
        assert!(storage.is_degraded());
        assert!(storage.mode.to_string().starts_with("degraded"));

        let note = Note::new(RecordId::new(), "Scratch", "kept in memory");
        storage.notes.create(note.clone()).await.unwrap();
        assert_eq!(storage.notes.read(note.id).await.unwrap(), Some(note));
        assert!(storage.notes.stats().await.unwrap().degraded);
        assert!(!dir.path().join("data/notes").exists());
    }

    #[tokio::test]
    async fn test_in_memory() {
        let storage = StorageFactory::in_memory(&Config::default());
        assert!(!storage.is_degraded());
        let clip = ClipboardItem::new(RecordId::new(), ClipContent::Text("ephemeral".into()));
        storage.clipboard.create(clip).await.unwrap();
        assert_eq!(storage.clipboard.count().await.unwrap(), 1);
        assert_eq!(storage.notes.count().await.unwrap(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.notes.sharding = Some(ShardingStrategy::ByCountBucket { buckets: 0 });
        assert!(StorageFactory::new(config).open().is_err());
    }
}
