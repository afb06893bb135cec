//! clipnote storage - payload persistence and caching
//!
//! This crate implements the payload side of the engine:
//! - Payload store trait and a file-per-record sharded implementation
//! - Shard-location map with atomic snapshot writes
//! - In-memory payload store for degraded mode
//! - O(1) LRU tier and the three-tier record cache

pub mod cache;
pub mod memory;
pub mod payload;
pub mod shard_map;
pub mod sharded;
pub mod tiered;

// Re-exports
pub use cache::{AccessInfo, LruCache, TierStats};
pub use memory::MemoryPayloadStore;
pub use payload::PayloadStore;
pub use shard_map::{ShardMap, write_atomic};
pub use sharded::{MAP_FILE, PAYLOAD_EXT, ShardedStore};
pub use tiered::{CacheManager, CacheStatsSnapshot, Fill};
