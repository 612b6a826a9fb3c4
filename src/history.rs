//! Session-scoped log of completed generation runs, newest first.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::assets::AdCopy;

/// One completed full-generation run. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub image_prompt: String,
    /// 128x128 JPEG previews as data URIs, one per rendered image.
    pub thumbnails: Vec<String>,
    pub ad_copies: Vec<AdCopy>,
}

#[derive(Debug, Default)]
pub struct HistoryStore {
    items: Vec<HistoryItem>,
}

impl HistoryStore {
    pub fn record(&mut self, item: HistoryItem) {
        self.items.insert(0, item);
    }

    pub fn items(&self) -> &[HistoryItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Wholesale wipe, on logout.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str) -> HistoryItem {
        HistoryItem {
            id: id.to_string(),
            timestamp: Utc::now(),
            image_prompt: "A professional studio product shot. Style: Plain White Background."
                .to_string(),
            thumbnails: Vec::new(),
            ad_copies: Vec::new(),
        }
    }

    #[test]
    fn newest_run_comes_first() {
        let mut store = HistoryStore::default();
        store.record(item("first"));
        store.record(item("second"));
        store.record(item("third"));
        let ids: Vec<&str> = store.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["third", "second", "first"]);
    }

    #[test]
    fn clear_empties_the_log() {
        let mut store = HistoryStore::default();
        store.record(item("only"));
        assert_eq!(store.len(), 1);
        store.clear();
        assert!(store.is_empty());
    }
}
