//! Core type definitions for clipnote
//!
//! This module defines the record identifiers, the two record kinds (notes and
//! clipboard items), the index entry projection used for listing and search,
//! and the sharding strategy selector shared by configuration and placement.

use crate::text;
use derive_more::{From, Into};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Current wall-clock time in unix milliseconds
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Unique identifier for a record (caller-generated, 128-bit)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, From, Into)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a new random record ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create from the 128-bit integer form used as an index key
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Get as bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Get as a 128-bit integer
    #[must_use]
    pub const fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The kinds of record the engine stores
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Note,
    Clipboard,
}

impl RecordKind {
    /// Directory (under the base directory) holding this kind's payloads
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Note => "notes",
            Self::Clipboard => "clipboard",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Note => write!(f, "note"),
            Self::Clipboard => write!(f, "clipboard"),
        }
    }
}

/// Payload placement strategy for a sharded store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShardingStrategy {
    /// Year-month directory from the wall clock at first write
    ByTimeBucket,
    /// `xxh64(id) mod buckets`, decimal directory names
    ByCountBucket { buckets: u32 },
    /// One flat directory
    Individual,
    /// `xxh64(id) mod buckets`, hex directory names
    ByHashBucket { buckets: u32 },
}

impl fmt::Display for ShardingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ByTimeBucket => write!(f, "by-time-bucket"),
            Self::ByCountBucket { buckets } => write!(f, "by-count-bucket({buckets})"),
            Self::Individual => write!(f, "individual"),
            Self::ByHashBucket { buckets } => write!(f, "by-hash-bucket({buckets})"),
        }
    }
}

/// Behaviour shared by every storable record kind.
///
/// Records are replaced wholesale on update; the index entry is always
/// derived from the record and never edited on its own.
pub trait Record:
    Serialize + DeserializeOwned + Clone + fmt::Debug + PartialEq + Send + Sync + 'static
{
    /// Kind tag, selects directories and index tables
    const KIND: RecordKind;

    fn id(&self) -> RecordId;

    /// Modification time in unix milliseconds
    fn modified_at(&self) -> u64;

    /// Project the record's metadata into an index entry
    fn to_index_entry(&self) -> IndexEntry;
}

/// A markdown note
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: RecordId,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub is_favorite: bool,
    pub created_at: u64,
    pub modified_at: u64,
}

impl Note {
    /// Create a note stamped with the current time
    pub fn new(id: RecordId, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id,
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            is_favorite: false,
            created_at: now,
            modified_at: now,
        }
    }
}

impl Record for Note {
    const KIND: RecordKind = RecordKind::Note;

    fn id(&self) -> RecordId {
        self.id
    }

    fn modified_at(&self) -> u64 {
        self.modified_at
    }

    fn to_index_entry(&self) -> IndexEntry {
        IndexEntry {
            id: self.id,
            kind: RecordKind::Note,
            title: self.title.clone(),
            tags: self.tags.clone(),
            is_favorite: self.is_favorite,
            created_at: self.created_at,
            modified_at: self.modified_at,
            preview: text::preview(&self.content),
            word_count: text::word_count(&self.content),
            byte_len: self.content.len() as u64,
            source_app: None,
        }
    }
}

/// Clipboard payload
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipContent {
    Text(String),
    Image { format: String, bytes: Vec<u8> },
    File { path: PathBuf },
}

impl ClipContent {
    /// Size of the payload body in bytes
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        match self {
            Self::Text(s) => s.len() as u64,
            Self::Image { bytes, .. } => bytes.len() as u64,
            Self::File { path } => path.as_os_str().len() as u64,
        }
    }

    /// Text used for preview and search
    #[must_use]
    pub fn searchable_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Image { format, bytes } => format!("[{format} image, {} bytes]", bytes.len()),
            Self::File { path } => path.display().to_string(),
        }
    }
}

// Image bodies would flood logs
impl fmt::Debug for ClipContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Image { format, bytes } => f
                .debug_struct("Image")
                .field("format", format)
                .field("len", &bytes.len())
                .finish(),
            Self::File { path } => f.debug_struct("File").field("path", path).finish(),
        }
    }
}

/// A clipboard history item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardItem {
    pub id: RecordId,
    pub content: ClipContent,
    /// Application the item was copied from
    pub source_app: Option<String>,
    pub tags: Vec<String>,
    pub is_favorite: bool,
    /// Number of times the item was pasted back
    pub use_count: u32,
    pub created_at: u64,
    pub modified_at: u64,
}

impl ClipboardItem {
    /// Create a clipboard item stamped with the current time
    #[must_use]
    pub fn new(id: RecordId, content: ClipContent) -> Self {
        let now = now_millis();
        Self {
            id,
            content,
            source_app: None,
            tags: Vec::new(),
            is_favorite: false,
            use_count: 0,
            created_at: now,
            modified_at: now,
        }
    }
}

impl Record for ClipboardItem {
    const KIND: RecordKind = RecordKind::Clipboard;

    fn id(&self) -> RecordId {
        self.id
    }

    fn modified_at(&self) -> u64 {
        self.modified_at
    }

    fn to_index_entry(&self) -> IndexEntry {
        let body = self.content.searchable_text();
        let title = match &self.content {
            ClipContent::Text(s) => text::title_line(s),
            ClipContent::Image { format, .. } => format!("{format} image"),
            ClipContent::File { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        };
        IndexEntry {
            id: self.id,
            kind: RecordKind::Clipboard,
            title,
            tags: self.tags.clone(),
            is_favorite: self.is_favorite,
            created_at: self.created_at,
            modified_at: self.modified_at,
            preview: text::preview(&body),
            word_count: text::word_count(&body),
            byte_len: self.content.byte_len(),
            source_app: self.source_app.clone(),
        }
    }
}

/// Metadata projection of a record, used for listing and search
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: RecordId,
    pub kind: RecordKind,
    pub title: String,
    pub tags: Vec<String>,
    pub is_favorite: bool,
    pub created_at: u64,
    pub modified_at: u64,
    /// Whitespace-collapsed head of the body text
    pub preview: String,
    pub word_count: u32,
    pub byte_len: u64,
    pub source_app: Option<String>,
}

impl IndexEntry {
    /// Terms indexed for full-text search, with their frequencies
    #[must_use]
    pub fn search_terms(&self) -> Vec<(String, u32)> {
        let mut counts: std::collections::BTreeMap<String, u32> = std::collections::BTreeMap::new();
        let fields = [self.title.as_str(), self.preview.as_str()];
        for token in fields
            .into_iter()
            .chain(self.tags.iter().map(String::as_str))
            .flat_map(text::tokenize)
        {
            *counts.entry(token).or_insert(0) += 1;
        }
        counts.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_roundtrip_u128() {
        let id = RecordId::new();
        assert_eq!(RecordId::from_u128(id.as_u128()), id);
        let parsed: RecordId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_note_index_entry() {
        let mut note = Note::new(RecordId::new(), "Plan", "quarterly   plan\nfor the team");
        note.tags = vec!["work".into()];
        let entry = note.to_index_entry();
        assert_eq!(entry.kind, RecordKind::Note);
        assert_eq!(entry.title, "Plan");
        assert_eq!(entry.preview, "quarterly plan for the team");
        assert_eq!(entry.word_count, 5);
        assert_eq!(entry.byte_len, note.content.len() as u64);
    }

    #[test]
    fn test_clipboard_index_entry_variants() {
        let text = ClipboardItem::new(RecordId::new(), ClipContent::Text("hello\nworld".into()));
        assert_eq!(text.to_index_entry().title, "hello");

        let image = ClipboardItem::new(
            RecordId::new(),
            ClipContent::Image {
                format: "png".into(),
                bytes: vec![0; 42],
            },
        );
        let entry = image.to_index_entry();
        assert_eq!(entry.title, "png image");
        assert_eq!(entry.byte_len, 42);
        assert!(entry.preview.contains("42 bytes"));

        let file = ClipboardItem::new(
            RecordId::new(),
            ClipContent::File {
                path: PathBuf::from("/tmp/report.pdf"),
            },
        );
        assert_eq!(file.to_index_entry().title, "report.pdf");
    }

    #[test]
    fn test_search_terms_counts() {
        let note = Note::new(RecordId::new(), "Plan plan", "quarterly plan");
        let terms = note.to_index_entry().search_terms();
        assert!(terms.contains(&("plan".to_string(), 3)));
        assert!(terms.contains(&("quarterly".to_string(), 1)));
    }

    #[test]
    fn test_sharding_strategy_serde() {
        let s: ShardingStrategy =
            serde_json::from_str(r#"{"type":"by_hash_bucket","buckets":16}"#).unwrap();
        assert_eq!(s, ShardingStrategy::ByHashBucket { buckets: 16 });
        assert_eq!(s.to_string(), "by-hash-bucket(16)");
    }
}
