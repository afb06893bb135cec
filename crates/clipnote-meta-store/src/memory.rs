//! In-memory metadata index, used for degraded mode and tests

use crate::index::MetadataIndex;
use crate::search::{self, Bm25, TermHits};
use clipnote_common::text::query_terms;
use clipnote_common::{IndexEntry, RecordId, Result};
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;

#[derive(Default)]
struct State {
    entries: HashMap<RecordId, IndexEntry>,
    postings: BTreeMap<String, HashMap<RecordId, u32>>,
    tokens: u64,
}

impl State {
    fn remove(&mut self, id: &RecordId) -> Option<IndexEntry> {
        let old = self.entries.remove(id)?;
        for (term, _) in old.search_terms() {
            if let Some(ids) = self.postings.get_mut(&term) {
                ids.remove(id);
                if ids.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
        self.tokens = self.tokens.saturating_sub(u64::from(search::doc_len(&old)));
        Some(old)
    }

    fn sorted(&self) -> Vec<&IndexEntry> {
        let mut entries: Vec<&IndexEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| (Reverse(e.modified_at), e.id));
        entries
    }
}

/// Index held in a hash map plus a sorted inverted index
#[derive(Default)]
pub struct MemoryIndex {
    state: RwLock<State>,
}

impl MemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataIndex for MemoryIndex {
    fn upsert(&self, entry: &IndexEntry) -> Result<()> {
        let mut state = self.state.write();
        state.remove(&entry.id);
        let terms = entry.search_terms();
        for (term, tf) in &terms {
            state
                .postings
                .entry(term.clone())
                .or_default()
                .insert(entry.id, *tf);
        }
        state.tokens += terms.iter().map(|(_, tf)| u64::from(*tf)).sum::<u64>();
        state.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    fn get(&self, id: &RecordId) -> Result<Option<IndexEntry>> {
        Ok(self.state.read().entries.get(id).cloned())
    }

    fn get_all(&self) -> Result<Vec<IndexEntry>> {
        Ok(self.state.read().sorted().into_iter().cloned().collect())
    }

    fn list(&self, limit: usize, offset: usize) -> Result<Vec<IndexEntry>> {
        Ok(self
            .state
            .read()
            .sorted()
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn search(&self, query: &str) -> Result<Vec<IndexEntry>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.state.read();
        let mut hits: Vec<TermHits> = Vec::with_capacity(terms.len());
        for term in &terms {
            let mut matched = TermHits::new();
            if term.prefix {
                for (token, ids) in state.postings.range(term.text.clone()..) {
                    if !token.starts_with(&term.text) {
                        break;
                    }
                    for (id, tf) in ids {
                        *matched.entry(*id).or_insert(0) += tf;
                    }
                }
            } else if let Some(ids) = state.postings.get(&term.text) {
                matched.extend(ids.iter().map(|(id, tf)| (*id, *tf)));
            }
            if matched.is_empty() {
                return Ok(Vec::new());
            }
            hits.push(matched);
        }

        let bm25 = Bm25::new(state.entries.len() as u64, state.tokens);
        let ranked = search::rank(&hits, &bm25, |id| {
            Ok::<_, Infallible>(state.entries.get(id).cloned())
        });
        Ok(ranked.unwrap_or_default())
    }

    fn delete(&self, id: &RecordId) -> Result<()> {
        self.state.write().remove(id);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.state.write() = State::default();
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.state.read().entries.len())
    }

    fn compact(&self) -> Result<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipnote_common::{Note, Record};

    fn entry(title: &str, content: &str, modified_at: u64) -> IndexEntry {
        let mut note = Note::new(RecordId::new(), title, content);
        note.modified_at = modified_at;
        note.to_index_entry()
    }

    #[test]
    fn test_upsert_replaces_terms() {
        let index = MemoryIndex::new();
        let mut e = entry("draft", "old words", 1);
        index.upsert(&e).unwrap();
        e.title = "final".into();
        e.preview = "new words".into();
        index.upsert(&e).unwrap();

        assert_eq!(index.count().unwrap(), 1);
        assert!(index.search("draft").unwrap().is_empty());
        assert_eq!(index.search("final").unwrap(), vec![e.clone()]);
        assert_eq!(index.search("words").unwrap(), vec![e]);
    }

    #[test]
    fn test_list_newest_first() {
        let index = MemoryIndex::new();
        let a = entry("a", "", 10);
        let b = entry("b", "", 30);
        let c = entry("c", "", 20);
        for e in [&a, &b, &c] {
            index.upsert(e).unwrap();
        }
        assert_eq!(index.get_all().unwrap(), vec![b.clone(), c.clone(), a.clone()]);
        assert_eq!(index.list(1, 1).unwrap(), vec![c]);
        assert!(index.list(5, 3).unwrap().is_empty());
    }

    #[test]
    fn test_prefix_and_blank_queries() {
        let index = MemoryIndex::new();
        let e = entry("Quarterly plan", "planning for q3", 1);
        index.upsert(&e).unwrap();

        assert_eq!(index.search("plan*").unwrap(), vec![e.clone()]);
        assert_eq!(index.search("quart*").unwrap(), vec![e]);
        assert!(index.search("quart").unwrap().is_empty());
        assert!(index.search("   ").unwrap().is_empty());
    }

    #[test]
    fn test_delete_and_clear() {
        let index = MemoryIndex::new();
        let e = entry("temp", "", 1);
        index.upsert(&e).unwrap();
        index.delete(&e.id).unwrap();
        index.delete(&e.id).unwrap();
        assert!(index.get(&e.id).unwrap().is_none());
        assert!(index.search("temp").unwrap().is_empty());

        index.upsert(&e).unwrap();
        index.clear().unwrap();
        assert_eq!(index.count().unwrap(), 0);
    }
}
