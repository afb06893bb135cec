//! clipnote placement - shard placement for payload files
//!
//! This crate decides which shard directory a record's payload lives in.
//! Hash-based strategies use xxh64 over the record id bytes, so the same id
//! maps to the same shard in every process and every build.
//!
//! # Example
//! ```ignore
//! use clipnote_placement::ShardPlacer;
//!
//! let placer = ShardPlacer::new(ShardingStrategy::ByHashBucket { buckets: 16 })?;
//! let dir = placer.shard_for(&record_id, now_millis());
//! ```

pub mod strategy;

pub use strategy::{ShardPlacer, hash_id, INDIVIDUAL_DIR};
