//! Redb table definitions for the metadata index.
//!
//! Both record kinds share one database file; every kind gets its own set of
//! four tables so listing and search never filter by kind.

use clipnote_common::RecordKind;
use redb::TableDefinition;

/// Row table. Key: record id, Value: bincode-encoded `IndexEntry`
pub type EntriesTable = TableDefinition<'static, u128, &'static [u8]>;
/// Ordering table. Key: (reverse modified_at, record id)
pub type ByModifiedTable = TableDefinition<'static, (u64, u128), ()>;
/// Inverted index. Key: (term, record id), Value: term frequency
pub type PostingsTable = TableDefinition<'static, (&'static str, u128), u32>;
/// Corpus counters, see [`DOCS`] and [`TOKENS`]
pub type TotalsTable = TableDefinition<'static, &'static str, u64>;

/// Number of indexed entries
pub const DOCS: &str = "docs";
/// Sum of indexed document lengths (in terms)
pub const TOKENS: &str = "tokens";

// Notes
pub const NOTE_ENTRIES: EntriesTable = TableDefinition::new("note_entries");
pub const NOTE_BY_MODIFIED: ByModifiedTable = TableDefinition::new("note_by_modified");
pub const NOTE_POSTINGS: PostingsTable = TableDefinition::new("note_postings");
pub const NOTE_TOTALS: TotalsTable = TableDefinition::new("note_totals");

// Clipboard
pub const CLIPBOARD_ENTRIES: EntriesTable = TableDefinition::new("clipboard_entries");
pub const CLIPBOARD_BY_MODIFIED: ByModifiedTable = TableDefinition::new("clipboard_by_modified");
pub const CLIPBOARD_POSTINGS: PostingsTable = TableDefinition::new("clipboard_postings");
pub const CLIPBOARD_TOTALS: TotalsTable = TableDefinition::new("clipboard_totals");

/// The four tables of one record kind
#[derive(Clone, Copy)]
pub struct KindTables {
    pub entries: EntriesTable,
    pub by_modified: ByModifiedTable,
    pub postings: PostingsTable,
    pub totals: TotalsTable,
}

impl KindTables {
    #[must_use]
    pub const fn for_kind(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Note => Self {
                entries: NOTE_ENTRIES,
                by_modified: NOTE_BY_MODIFIED,
                postings: NOTE_POSTINGS,
                totals: NOTE_TOTALS,
            },
            RecordKind::Clipboard => Self {
                entries: CLIPBOARD_ENTRIES,
                by_modified: CLIPBOARD_BY_MODIFIED,
                postings: CLIPBOARD_POSTINGS,
                totals: CLIPBOARD_TOTALS,
            },
        }
    }
}

/// Ordering key component that sorts newest first
#[must_use]
pub const fn reverse_timestamp(modified_at: u64) -> u64 {
    u64::MAX - modified_at
}
