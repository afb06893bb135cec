//! Sharded file payload store
//!
//! One file per record, grouped into shard directories by a
//! [`ShardPlacer`]. Layout under the store root:
//!
//! ```text
//! <root>/
//! ├── shards.map        # id → shard directory
//! ├── <shard>/<id>.rec  # bincode-encoded record
//! └── ...
//! ```
//!
//! Writes go to a hidden temp file in the target shard and are renamed into
//! place. The shard map only serializes the map update and its rewrite, not
//! the payload I/O.

use crate::payload::PayloadStore;
use crate::shard_map::{ShardMap, write_atomic};
use clipnote_common::{Error, Record, RecordId, Result, ShardingStrategy, now_millis};
use clipnote_placement::ShardPlacer;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Shard map file name
pub const MAP_FILE: &str = "shards.map";

/// Payload file extension
pub const PAYLOAD_EXT: &str = "rec";

/// File-per-record payload store
pub struct ShardedStore<R> {
    root: PathBuf,
    map_path: PathBuf,
    placer: ShardPlacer,
    map: Mutex<ShardMap>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> ShardedStore<R> {
    /// Open (or create) a store rooted at `root`.
    ///
    /// A missing or unreadable shard map is rebuilt from the directory tree.
    pub fn open(root: impl AsRef<Path>, strategy: ShardingStrategy) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let placer = ShardPlacer::new(strategy)?;
        let map_path = root.join(MAP_FILE);

        let store = Self {
            root,
            map_path,
            placer,
            map: Mutex::new(ShardMap::default()),
            _record: PhantomData,
        };

        match ShardMap::load(&store.map_path) {
            Ok(Some(map)) => {
                info!(
                    "Opened {} payload store at {:?} ({} records, {})",
                    R::KIND,
                    store.root,
                    map.len(),
                    strategy
                );
                *store.map.lock() = map;
            }
            Ok(None) => {
                let count = store.rebuild_map()?;
                info!(
                    "Created shard map for {} payload store at {:?} ({} records, {})",
                    R::KIND,
                    store.root,
                    count,
                    strategy
                );
            }
            Err(e) => {
                warn!("Shard map at {:?} unreadable, rebuilding: {}", store.map_path, e);
                store.rebuild_map()?;
            }
        }

        Ok(store)
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Placement strategy of the store
    pub fn strategy(&self) -> ShardingStrategy {
        self.placer.strategy()
    }

    /// Rebuild the shard map by scanning every shard directory
    pub fn rebuild_map(&self) -> Result<usize> {
        let mut map = ShardMap::default();
        for (shard, dir) in self.shard_dirs()? {
            for path in payload_files(&dir)? {
                if let Some(id) = id_from_path(&path) {
                    map.insert(id, shard.clone());
                }
            }
        }
        let count = map.len();
        let mut current = self.map.lock();
        map.persist(&self.map_path)?;
        *current = map;
        debug!("Rebuilt shard map at {:?}: {} records", self.map_path, count);
        Ok(count)
    }

    fn file_name(id: &RecordId) -> String {
        format!("{id}.{PAYLOAD_EXT}")
    }

    fn payload_path(&self, shard: &str, id: &RecordId) -> PathBuf {
        self.root.join(shard).join(Self::file_name(id))
    }

    /// Shard directories currently on disk
    fn shard_dirs(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.file_type()?.is_dir() {
                continue;
            }
            dirs.push((name, entry.path()));
        }
        Ok(dirs)
    }

    /// Check each shard directory for the id's payload file
    fn scan_for(&self, id: &RecordId) -> Result<Option<String>> {
        let file_name = Self::file_name(id);
        for (shard, dir) in self.shard_dirs()? {
            if dir.join(&file_name).is_file() {
                return Ok(Some(shard));
            }
        }
        Ok(None)
    }

    /// Find the shard holding `id`, backfilling or pruning the map
    fn locate(&self, id: &RecordId) -> Result<Option<String>> {
        let mapped = self.map.lock().get(id).map(str::to_owned);
        if let Some(shard) = mapped {
            if self.payload_path(&shard, id).is_file() {
                return Ok(Some(shard));
            }
            debug!("Stale shard map entry for {} in {}", id, shard);
            let mut map = self.map.lock();
            if map.get(id) == Some(shard.as_str()) {
                map.remove(id);
                map.persist(&self.map_path)?;
            }
        }

        let Some(shard) = self.scan_for(id)? else {
            return Ok(None);
        };
        debug!("Found {} by scan in {}, backfilling map", id, shard);
        let mut map = self.map.lock();
        if map.insert(*id, shard.clone()) {
            map.persist(&self.map_path)?;
        }
        Ok(Some(shard))
    }

    fn read_payload(&self, path: &Path) -> Result<Option<R>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| Error::corrupted(format!("payload {}", path.display()), e))
    }
}

impl<R: Record> PayloadStore<R> for ShardedStore<R> {
    fn save(&self, record: &R) -> Result<()> {
        let id = record.id();
        let bytes = bincode::serialize(record)?;

        // Time buckets depend on the write time, so an existing payload keeps
        // its directory instead of being duplicated into a newer bucket.
        let existing = self.locate(&id)?;
        let shard = match &existing {
            Some(shard) if self.placer.is_time_based() => shard.clone(),
            _ => self.placer.shard_for(&id, now_millis()),
        };

        let dir = self.root.join(&shard);
        fs::create_dir_all(&dir)?;
        write_atomic(&dir.join(Self::file_name(&id)), &bytes)?;

        {
            let mut map = self.map.lock();
            if map.insert(id, shard.clone()) {
                map.persist(&self.map_path)?;
            }
        }

        // Placed by an earlier strategy: the new copy is durable, drop the old
        if let Some(old) = existing.filter(|old| *old != shard) {
            match fs::remove_file(self.payload_path(&old, &id)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            debug!("Moved {} payload {} from {} to {}", R::KIND, id, old, shard);
        }
        debug!("Saved {} payload {} ({} bytes)", R::KIND, id, bytes.len());
        Ok(())
    }

    fn load(&self, id: &RecordId) -> Result<Option<R>> {
        match self.locate(id)? {
            Some(shard) => self.read_payload(&self.payload_path(&shard, id)),
            None => Ok(None),
        }
    }

    fn delete(&self, id: &RecordId) -> Result<()> {
        if let Some(shard) = self.locate(id)? {
            match fs::remove_file(self.payload_path(&shard, id)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        let mut map = self.map.lock();
        if map.remove(id).is_some() {
            map.persist(&self.map_path)?;
        }
        debug!("Deleted {} payload {}", R::KIND, id);
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<R>> {
        let dirs: Vec<PathBuf> = self.shard_dirs()?.into_iter().map(|(_, p)| p).collect();
        if dirs.is_empty() {
            return Ok(Vec::new());
        }
        let workers = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1)
            .min(dirs.len());
        let per_worker = dirs.len().div_ceil(workers);

        std::thread::scope(|scope| {
            let handles: Vec<_> = dirs
                .chunks(per_worker)
                .map(|group| scope.spawn(move || self.load_dirs(group)))
                .collect();

            let mut records = Vec::new();
            for handle in handles {
                let loaded = handle
                    .join()
                    .map_err(|_| Error::internal("payload scan worker panicked"))??;
                records.extend(loaded);
            }
            Ok(records)
        })
    }

    fn ids(&self) -> Result<Vec<RecordId>> {
        let mut ids = HashSet::new();
        for (_, dir) in self.shard_dirs()? {
            ids.extend(payload_files(&dir)?.iter().filter_map(|p| id_from_path(p)));
        }
        Ok(ids.into_iter().collect())
    }

    fn clear(&self) -> Result<()> {
        let mut map = self.map.lock();
        for (_, dir) in self.shard_dirs()? {
            fs::remove_dir_all(&dir)?;
        }
        match fs::remove_file(&self.map_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        map.clear();
        info!("Cleared {} payload store at {:?}", R::KIND, self.root);
        Ok(())
    }

    fn len(&self) -> usize {
        self.map.lock().len()
    }
}

impl<R: Record> ShardedStore<R> {
    /// Decode every payload in `dirs`; undecodable files are logged and skipped
    fn load_dirs(&self, dirs: &[PathBuf]) -> Result<Vec<R>> {
        let mut records = Vec::new();
        for dir in dirs {
            for path in payload_files(dir)? {
                match self.read_payload(&path) {
                    Ok(Some(record)) => records.push(record),
                    Ok(None) => {}
                    Err(e) if e.is_corrupted() => error!("Skipping payload: {}", e),
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(records)
    }
}

/// Payload files (by extension) directly inside `dir`
fn payload_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let path = entry?.path();
        let is_payload = path.extension().is_some_and(|ext| ext == PAYLOAD_EXT);
        let hidden = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('.'));
        if is_payload && !hidden {
            files.push(path);
        }
    }
    Ok(files)
}

fn id_from_path(path: &Path) -> Option<RecordId> {
    path.file_stem()?.to_str()?.parse().ok()
}
