//! Shard-location map
//!
//! Maps record ids to the shard directory holding their payload. The map is
//! a cache of what the directory tree already says: it is rewritten
//! wholesale on every change and rebuilt by scanning when missing.

use clipnote_common::{Error, RecordId, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `bytes` to `path` through a temporary file and an atomic rename.
///
/// Readers see either the old file or the complete new one.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp_path = temp_path_for(path);
    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

/// Hidden sibling used while writing `path`
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// In-memory id → shard map with whole-file persistence
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMap {
    locations: HashMap<RecordId, String>,
}

impl ShardMap {
    /// Load the map file. `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| Error::corrupted(format!("shard map {}", path.display()), e))
    }

    /// Rewrite the map file
    pub fn persist(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    pub fn get(&self, id: &RecordId) -> Option<&str> {
        self.locations.get(id).map(String::as_str)
    }

    /// Record a location; returns true when the map changed
    pub fn insert(&mut self, id: RecordId, shard: String) -> bool {
        self.locations.insert(id, shard.clone()).as_ref() != Some(&shard)
    }

    pub fn remove(&mut self, id: &RecordId) -> Option<String> {
        self.locations.remove(id)
    }

    pub fn clear(&mut self) {
        self.locations.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_persist_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shards.map");

        let mut map = ShardMap::default();
        let id = RecordId::new();
        assert!(map.insert(id, "2026-10".into()));
        assert!(!map.insert(id, "2026-10".into()));
        map.persist(&path).unwrap();

        let loaded = ShardMap::load(&path).unwrap().unwrap();
        assert_eq!(loaded, map);
        assert_eq!(loaded.get(&id), Some("2026-10"));
        // No temp file left behind
        assert!(!dir.path().join(".shards.map.tmp").exists());
    }

    #[test]
    fn test_load_missing_and_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shards.map");
        assert!(ShardMap::load(&path).unwrap().is_none());

        fs::write(&path, [0xff, 0xff, 0xff]).unwrap();
        let err = ShardMap::load(&path).unwrap_err();
        assert!(err.is_corrupted());
    }

    #[test]
    fn test_write_atomic_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("payload.rec");
        write_atomic(&path, b"old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }
}
