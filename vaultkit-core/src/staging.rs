//! In-memory staging area for a session's pending entries.

use crate::types::PendingEntry;

/// Ordered map of staged entries, keyed by tag.
///
/// Insertion order is preserved; re-staging an existing tag replaces the
/// entry in place and keeps its original position.
#[derive(Debug, Default)]
pub(crate) struct StagingMap {
    entries: Vec<PendingEntry>,
}

impl StagingMap {
    /// Stages an entry, replacing any existing entry with the same tag.
    pub(crate) fn insert(&mut self, entry: PendingEntry) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.tag == entry.tag) {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    /// Removes the entry with the given tag. Returns whether one existed.
    pub(crate) fn remove(&mut self, tag: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.tag != tag);
        self.entries.len() != before
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &PendingEntry> {
        self.entries.iter()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tag: &str, content_id: &str) -> PendingEntry {
        PendingEntry {
            tag: tag.into(),
            content_id: content_id.into(),
            descriptor_json: None,
            extension: None,
            file_type: None,
        }
    }

    #[test]
    fn preserves_insertion_order() {
        let mut map = StagingMap::default();
        map.insert(entry("b", "1"));
        map.insert(entry("a", "2"));
        map.insert(entry("c", "3"));
        let tags: Vec<_> = map.iter().map(|e| e.tag.clone()).collect();
        assert_eq!(tags, ["b", "a", "c"]);
    }

    #[test]
    fn restaging_replaces_in_place() {
        let mut map = StagingMap::default();
        map.insert(entry("a", "old"));
        map.insert(entry("b", "keep"));
        map.insert(entry("a", "new"));
        assert_eq!(map.len(), 2);
        let first = map.iter().next().unwrap();
        assert_eq!(first.tag, "a");
        assert_eq!(first.content_id, "new");
    }

    #[test]
    fn remove_reports_presence() {
        let mut map = StagingMap::default();
        map.insert(entry("a", "1"));
        assert!(map.remove("a"));
        assert!(!map.remove("a"));
        assert!(map.is_empty());
    }
}
