//! clipnote engine - local hybrid storage for notes and clipboard history
//!
//! Full records live as sharded files, their searchable metadata in a redb
//! index, and hot data in a three-tier LRU cache. The [`Repository`] keeps
//! the three consistent; the [`StorageFactory`] wires them together.
//!
//! # Example
//! ```ignore
//! use clipnote_engine::StorageFactory;
//!
//! let storage = StorageFactory::new(Config::load("clipnote.toml")?).open()?;
//! storage.notes.create(Note::new(RecordId::new(), "Plan", "quarterly plan")).await?;
//! let hits = storage.notes.search("quarterly").await?;
//! ```

pub mod factory;
pub mod repository;

// Re-exports
pub use factory::{INDEX_FILE, Storage, StorageFactory, StorageMode};
pub use repository::{BatchDeleteReport, IndexSyncReport, Repository, RepositoryStats};
