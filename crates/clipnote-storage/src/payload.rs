//! Payload store abstraction
//!
//! A payload store persists one full record per id. It knows nothing about
//! search or caching; the repository layers those on top.

use clipnote_common::{Record, RecordId, Result};

/// Durable storage of full record bodies.
///
/// Calls are blocking; async callers run them on a blocking pool.
pub trait PayloadStore<R: Record>: Send + Sync {
    /// Persist `record`, replacing any previous payload with the same id.
    ///
    /// Either the whole new payload becomes visible or the old one stays.
    fn save(&self, record: &R) -> Result<()>;

    /// Load a payload. `Ok(None)` when the id has no payload.
    fn load(&self, id: &RecordId) -> Result<Option<R>>;

    /// Remove a payload. Removing an absent id is not an error.
    fn delete(&self, id: &RecordId) -> Result<()>;

    /// Every stored payload, in no particular order (maintenance only)
    fn load_all(&self) -> Result<Vec<R>>;

    /// Ids of every stored payload, without decoding them
    fn ids(&self) -> Result<Vec<RecordId>>;

    /// Remove every payload
    fn clear(&self) -> Result<()>;

    /// Number of stored payloads
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
