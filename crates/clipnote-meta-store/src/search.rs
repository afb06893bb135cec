//! BM25 ranking shared by the redb and in-memory indexes.
//!
//! Both indexes gather per-term postings (`id → tf`); this module intersects
//! them and orders the survivors.

use clipnote_common::{IndexEntry, RecordId};
use std::collections::HashMap;

/// Postings matched by one query term: record id → term frequency.
///
/// A prefix term sums the frequencies of every token it matched.
pub type TermHits = HashMap<RecordId, u32>;

/// Okapi BM25 parameters and corpus statistics
#[derive(Clone, Copy, Debug)]
pub struct Bm25 {
    docs: f64,
    avg_len: f64,
}

impl Bm25 {
    pub const K1: f64 = 1.2;
    pub const B: f64 = 0.75;

    /// Statistics from the number of documents and their summed length
    #[must_use]
    pub fn new(docs: u64, tokens: u64) -> Self {
        let avg_len = if docs == 0 {
            1.0
        } else {
            (tokens as f64 / docs as f64).max(1.0)
        };
        Self {
            docs: docs as f64,
            avg_len,
        }
    }

    /// Inverse document frequency, never negative
    #[must_use]
    pub fn idf(&self, df: usize) -> f64 {
        let df = df as f64;
        (1.0 + (self.docs - df + 0.5) / (df + 0.5)).ln()
    }

    #[must_use]
    pub fn term_score(&self, tf: u32, df: usize, doc_len: u32) -> f64 {
        let tf = f64::from(tf);
        let norm = 1.0 - Self::B + Self::B * f64::from(doc_len) / self.avg_len;
        self.idf(df) * (tf * (Self::K1 + 1.0)) / (tf + Self::K1 * norm)
    }
}

/// Document length in indexed terms
#[must_use]
pub fn doc_len(entry: &IndexEntry) -> u32 {
    entry.search_terms().iter().map(|(_, tf)| tf).sum()
}

/// Intersect term hits and rank matching entries.
///
/// Ids missing from `lookup` (stale postings) are skipped. Ties in score are
/// broken by `modified_at` descending.
pub fn rank<E>(
    hits: &[TermHits],
    bm25: &Bm25,
    mut lookup: impl FnMut(&RecordId) -> Result<Option<IndexEntry>, E>,
) -> Result<Vec<IndexEntry>, E> {
    let Some(smallest) = hits.iter().min_by_key(|h| h.len()) else {
        return Ok(Vec::new());
    };

    let mut scored = Vec::new();
    for id in smallest.keys() {
        if !hits.iter().all(|h| h.contains_key(id)) {
            continue;
        }
        let Some(entry) = lookup(id)? else {
            continue;
        };
        let len = doc_len(&entry);
        let score: f64 = hits
            .iter()
            .filter_map(|h| h.get(id).map(|tf| bm25.term_score(*tf, h.len(), len)))
            .sum();
        scored.push((score, entry));
    }

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.total_cmp(sa)
            .then_with(|| b.modified_at.cmp(&a.modified_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    Ok(scored.into_iter().map(|(_, entry)| entry).collect())
}
