//! clipnote meta-store - metadata index for listing and search
//!
//! This crate keeps a searchable projection (`IndexEntry`) of every stored
//! record. The persistent implementation lives in a single redb file shared
//! by both record kinds; an in-memory implementation backs degraded mode.

pub mod index;
pub mod memory;
pub mod search;
pub mod store;
pub mod tables;

// Re-exports
pub use index::MetadataIndex;
pub use memory::MemoryIndex;
pub use search::Bm25;
pub use store::{IndexDatabase, MetaStoreError, MetaStoreResult, RedbIndex};
