//! Bounded, deduplicated search history.
//!
//! The in-memory list is authoritative; persistence is best-effort JSON in
//! the key-value store. Entries are newest-first, deduplicated by exact
//! query text, and capped at [`crate::MAX_SEARCH_HISTORY`].

use serde::{Deserialize, Serialize};

use crate::MAX_SEARCH_HISTORY;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEntry {
    /// Time-derived unique id; a sequence number disambiguates entries
    /// created within the same millisecond.
    pub id: String,
    pub query: String,
    #[serde(default)]
    pub parking_lot_id: Option<u64>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHistory {
    entries: Vec<SearchEntry>,
    max_len: usize,
    next_seq: u64,
}

impl Default for SearchHistory {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            max_len: MAX_SEARCH_HISTORY,
            next_seq: 0,
        }
    }
}

impl SearchHistory {
    #[must_use]
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            max_len,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[SearchEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records a query. Empty (after trimming) queries are a no-op. An entry
    /// with exactly the same query text is removed first, so the new entry
    /// lands at index 0 and the list stays duplicate-free; anything beyond
    /// the cap falls off the old end. Returns whether the list changed.
    pub fn add(&mut self, query: &str, parking_lot_id: Option<u64>, now_ms: u64) -> bool {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return false;
        }

        self.entries.retain(|entry| entry.query != trimmed);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            0,
            SearchEntry {
                id: format!("{now_ms}-{seq}"),
                query: trimmed.to_string(),
                parking_lot_id,
                timestamp: now_ms,
            },
        );
        self.entries.truncate(self.max_len);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Serializes the full list for persistence. `None` means the list could
    /// not be encoded; the in-memory state is still correct.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        match serde_json::to_string(&self.entries) {
            Ok(json) => Some(json),
            Err(error) => {
                tracing::error!(%error, "could not encode search history");
                None
            }
        }
    }

    /// Restores the list from a persisted blob. Unparseable blobs are logged
    /// and leave the history empty; this never fails outward.
    pub fn restore(&mut self, stored: &str) {
        match serde_json::from_str::<Vec<SearchEntry>>(stored) {
            Ok(mut entries) => {
                entries.truncate(self.max_len);
                self.entries = entries;
            }
            Err(error) => {
                tracing::warn!(%error, "discarding unparseable search history");
                self.entries.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> SearchHistory {
        SearchHistory::default()
    }

    #[test]
    fn add_puts_query_at_front() {
        let mut h = history();
        assert!(h.add("library", None, 1_000));
        assert!(h.add("gym", Some(4), 2_000));

        assert_eq!(h.len(), 2);
        assert_eq!(h.entries()[0].query, "gym");
        assert_eq!(h.entries()[0].parking_lot_id, Some(4));
        assert_eq!(h.entries()[1].query, "library");
    }

    #[test]
    fn add_trims_and_ignores_empty() {
        let mut h = history();
        assert!(!h.add("", None, 1_000));
        assert!(!h.add("   \t  ", None, 1_000));
        assert!(h.is_empty());

        assert!(h.add("  stadium  ", None, 1_000));
        assert_eq!(h.entries()[0].query, "stadium");
    }

    #[test]
    fn duplicate_query_moves_to_front_without_duplicating() {
        let mut h = history();
        h.add("library", None, 1_000);
        h.add("gym", None, 2_000);
        h.add("library", Some(9), 3_000);

        assert_eq!(h.len(), 2);
        assert_eq!(h.entries()[0].query, "library");
        assert_eq!(h.entries()[0].parking_lot_id, Some(9));
        assert_eq!(h.entries()[1].query, "gym");
    }

    #[test]
    fn length_is_capped_oldest_dropped() {
        let mut h = SearchHistory::with_max_len(3);
        for (i, q) in ["a", "b", "c", "d"].iter().enumerate() {
            h.add(q, None, i as u64);
        }
        assert_eq!(h.len(), 3);
        let queries: Vec<_> = h.entries().iter().map(|e| e.query.as_str()).collect();
        assert_eq!(queries, ["d", "c", "b"]);
    }

    #[test]
    fn same_millisecond_ids_stay_unique() {
        let mut h = history();
        h.add("a", None, 5_000);
        h.add("b", None, 5_000);
        assert_ne!(h.entries()[0].id, h.entries()[1].id);
    }

    #[test]
    fn restore_round_trips() {
        let mut h = history();
        h.add("library", Some(1), 1_000);
        h.add("gym", None, 2_000);
        let json = h.to_json().unwrap();

        let mut restored = history();
        restored.restore(&json);
        assert_eq!(restored.entries(), h.entries());
    }

    #[test]
    fn restore_of_garbage_leaves_history_empty() {
        let mut h = history();
        h.add("library", None, 1_000);
        h.restore("not json at all {{{");
        assert!(h.is_empty());
    }

    #[test]
    fn restore_truncates_oversized_blobs() {
        let entries: Vec<SearchEntry> = (0..30)
            .map(|i| SearchEntry {
                id: format!("{i}-0"),
                query: format!("q{i}"),
                parking_lot_id: None,
                timestamp: i,
            })
            .collect();
        let json = serde_json::to_string(&entries).unwrap();

        let mut h = history();
        h.restore(&json);
        assert_eq!(h.len(), MAX_SEARCH_HISTORY);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn length_never_exceeds_cap(queries in proptest::collection::vec(".{0,20}", 0..60)) {
                let mut h = SearchHistory::default();
                for (i, q) in queries.iter().enumerate() {
                    h.add(q, None, i as u64);
                }
                prop_assert!(h.len() <= MAX_SEARCH_HISTORY);
            }

            #[test]
            fn non_empty_add_lands_at_index_zero(
                queries in proptest::collection::vec("[a-z]{1,8}", 1..40),
            ) {
                let mut h = SearchHistory::default();
                for (i, q) in queries.iter().enumerate() {
                    h.add(q, None, i as u64);
                }
                let last = queries.last().unwrap();
                prop_assert_eq!(h.entries()[0].query.as_str(), last.as_str());
                let occurrences = h
                    .entries()
                    .iter()
                    .filter(|e| &e.query == last)
                    .count();
                prop_assert_eq!(occurrences, 1);
            }
        }
    }
}
