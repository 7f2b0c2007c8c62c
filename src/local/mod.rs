// Local preference store
//
// Device-owned persistence of bookmark and star records. Reads never fail:
// an unavailable medium or an unreadable entry degrades to an empty list.

pub mod medium;

pub use medium::{FileMedium, MemoryMedium, StorageMedium};

use crate::error::Result;
use crate::record::{Collection, PreferenceRecord};
use std::sync::{Arc, Mutex};

const FIRST_SYNC_KEY_PREFIX: &str = "conference-first-sync:";

/// Bookmark and star records persisted on this device
pub struct LocalPreferenceStore {
    medium: Option<Arc<dyn StorageMedium>>,
    // Serializes read-modify-write cycles against the medium
    write_lock: Mutex<()>,
}

impl LocalPreferenceStore {
    pub fn new(medium: Arc<dyn StorageMedium>) -> Self {
        Self {
            medium: Some(medium),
            write_lock: Mutex::new(()),
        }
    }

    /// Store with no backing medium: every read is empty, every write dropped
    pub fn unavailable() -> Self {
        Self {
            medium: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryMedium::new()))
    }

    pub fn is_available(&self) -> bool {
        self.medium.is_some()
    }

    /// Records of one collection in insertion order
    pub fn records(&self, collection: Collection) -> Vec<PreferenceRecord> {
        match self.try_read(collection) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Failed to read local {}: {}. Using empty list.", collection, e);
                Vec::new()
            }
        }
    }

    pub fn contains(&self, collection: Collection, session_id: &str) -> bool {
        self.records(collection)
            .iter()
            .any(|r| r.session_id == session_id)
    }

    /// Append a record stamped now; returns false if it was already present
    pub fn add(&self, collection: Collection, session_id: &str, title: Option<&str>) -> bool {
        let _guard = self.lock();
        let mut records = self.records(collection);
        if records.iter().any(|r| r.session_id == session_id) {
            return false;
        }

        records.push(PreferenceRecord::new(session_id).with_title(title.map(str::to_string)));
        self.write_or_warn(collection, &records)
    }

    /// Remove a record; returns its former position and value
    pub fn remove(&self, collection: Collection, session_id: &str) -> Option<(usize, PreferenceRecord)> {
        let _guard = self.lock();
        let mut records = self.records(collection);
        let position = records.iter().position(|r| r.session_id == session_id)?;
        let removed = records.remove(position);

        if self.write_or_warn(collection, &records) {
            Some((position, removed))
        } else {
            None
        }
    }

    /// Put a removed record back at (or as close as possible to) its old position
    pub fn restore(&self, collection: Collection, record: PreferenceRecord, position: usize) {
        let _guard = self.lock();
        let mut records = self.records(collection);
        if records.iter().any(|r| r.session_id == record.session_id) {
            return;
        }

        let position = position.min(records.len());
        records.insert(position, record);
        self.write_or_warn(collection, &records);
    }

    pub fn get_bookmarks(&self) -> Vec<PreferenceRecord> {
        self.records(Collection::Bookmarks)
    }

    pub fn add_bookmark(&self, session_id: &str) {
        self.add(Collection::Bookmarks, session_id, None);
    }

    pub fn remove_bookmark(&self, session_id: &str) {
        self.remove(Collection::Bookmarks, session_id);
    }

    pub fn is_bookmarked(&self, session_id: &str) -> bool {
        self.contains(Collection::Bookmarks, session_id)
    }

    pub fn get_starred(&self) -> Vec<PreferenceRecord> {
        self.records(Collection::Starred)
    }

    pub fn add_starred(&self, session_id: &str) {
        self.add(Collection::Starred, session_id, None);
    }

    pub fn remove_starred(&self, session_id: &str) {
        self.remove(Collection::Starred, session_id);
    }

    pub fn is_starred(&self, session_id: &str) -> bool {
        self.contains(Collection::Starred, session_id)
    }

    /// Wipe both collections. First-sync flags are kept.
    pub fn clear(&self) {
        let _guard = self.lock();
        if let Err(e) = self.try_clear() {
            tracing::warn!("Failed to clear local preferences: {}", e);
        }
    }

    /// Clear both collections and replay the given records
    ///
    /// Unlike the other writes this reports failure, so the sync engine can
    /// fall back to whatever the device still holds.
    pub fn replace_all(
        &self,
        bookmarks: &[PreferenceRecord],
        starred: &[PreferenceRecord],
    ) -> Result<()> {
        let _guard = self.lock();
        if self.medium.is_none() {
            return Ok(());
        }

        self.try_clear()?;
        self.try_write(Collection::Bookmarks, bookmarks)?;
        self.try_write(Collection::Starred, starred)?;
        Ok(())
    }

    pub fn first_sync_done(&self, identity: &str) -> bool {
        let Some(medium) = &self.medium else {
            return false;
        };

        match medium.get_item(&first_sync_key(identity)) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(e) => {
                tracing::warn!("Failed to read first-sync flag for {}: {}", identity, e);
                false
            }
        }
    }

    pub fn mark_first_sync(&self, identity: &str) {
        if let Some(medium) = &self.medium {
            if let Err(e) = medium.set_item(&first_sync_key(identity), "true") {
                tracing::warn!("Failed to persist first-sync flag for {}: {}", identity, e);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn try_read(&self, collection: Collection) -> Result<Vec<PreferenceRecord>> {
        let Some(medium) = &self.medium else {
            return Ok(Vec::new());
        };

        match medium.get_item(collection.storage_key())? {
            Some(stored) => Ok(serde_json::from_str(&stored)?),
            None => Ok(Vec::new()),
        }
    }

    fn try_write(&self, collection: Collection, records: &[PreferenceRecord]) -> Result<()> {
        let Some(medium) = &self.medium else {
            return Ok(());
        };

        let serialized = serde_json::to_string(records)?;
        medium.set_item(collection.storage_key(), &serialized)
    }

    fn try_clear(&self) -> Result<()> {
        let Some(medium) = &self.medium else {
            return Ok(());
        };

        for collection in Collection::ALL {
            medium.remove_item(collection.storage_key())?;
        }
        Ok(())
    }

    fn write_or_warn(&self, collection: Collection, records: &[PreferenceRecord]) -> bool {
        match self.try_write(collection, records) {
            Ok(()) => self.medium.is_some(),
            Err(e) => {
                tracing::warn!("Failed to write local {}: {}", collection, e);
                false
            }
        }
    }
}

fn first_sync_key(identity: &str) -> String {
    format!("{}{}", FIRST_SYNC_KEY_PREFIX, identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn ids(records: &[PreferenceRecord]) -> Vec<&str> {
        records.iter().map(|r| r.session_id.as_str()).collect()
    }

    #[test]
    fn test_add_and_get_in_insertion_order() {
        let store = LocalPreferenceStore::in_memory();
        store.add_bookmark("s2");
        store.add_bookmark("s1");
        store.add_starred("s3");

        assert_eq!(ids(&store.get_bookmarks()), vec!["s2", "s1"]);
        assert_eq!(ids(&store.get_starred()), vec!["s3"]);
        assert!(store.is_bookmarked("s1"));
        assert!(!store.is_starred("s1"));
    }

    #[test]
    fn test_add_is_idempotent() {
        let store = LocalPreferenceStore::in_memory();
        assert!(store.add(Collection::Bookmarks, "s1", None));
        assert!(!store.add(Collection::Bookmarks, "s1", None));
        assert_eq!(store.get_bookmarks().len(), 1);
    }

    #[test]
    fn test_remove_returns_position() {
        let store = LocalPreferenceStore::in_memory();
        store.add_starred("a");
        store.add_starred("b");
        store.add_starred("c");

        let (position, record) = store.remove(Collection::Starred, "b").unwrap();
        assert_eq!(position, 1);
        assert_eq!(record.session_id, "b");
        assert_eq!(ids(&store.get_starred()), vec!["a", "c"]);

        assert!(store.remove(Collection::Starred, "missing").is_none());
    }

    #[test]
    fn test_restore_keeps_position_and_timestamp() {
        let store = LocalPreferenceStore::in_memory();
        store.add_bookmark("a");
        store.add_bookmark("b");
        store.add_bookmark("c");

        let (position, record) = store.remove(Collection::Bookmarks, "a").unwrap();
        store.restore(Collection::Bookmarks, record.clone(), position);

        let records = store.get_bookmarks();
        assert_eq!(ids(&records), vec!["a", "b", "c"]);
        assert_eq!(records[0].timestamp.timestamp_millis(), record.timestamp.timestamp_millis());

        // Restoring something already present is a no-op
        store.restore(Collection::Bookmarks, record, 2);
        assert_eq!(store.get_bookmarks().len(), 3);
    }

    #[test]
    fn test_clear_keeps_first_sync_flags() {
        let store = LocalPreferenceStore::in_memory();
        store.add_bookmark("s1");
        store.add_starred("s2");
        store.mark_first_sync("user-1");

        store.clear();

        assert!(store.get_bookmarks().is_empty());
        assert!(store.get_starred().is_empty());
        assert!(store.first_sync_done("user-1"));
        assert!(!store.first_sync_done("user-2"));
    }

    #[test]
    fn test_unavailable_degrades_to_empty() {
        let store = LocalPreferenceStore::unavailable();
        store.add_bookmark("s1");
        store.mark_first_sync("user-1");

        assert!(!store.is_available());
        assert!(store.get_bookmarks().is_empty());
        assert!(!store.is_bookmarked("s1"));
        assert!(!store.first_sync_done("user-1"));
        assert!(store.remove(Collection::Bookmarks, "s1").is_none());
        assert!(store.replace_all(&[PreferenceRecord::new("x")], &[]).is_ok());
    }

    #[test]
    fn test_corrupted_entry_reads_empty() {
        let medium = Arc::new(MemoryMedium::new());
        medium.set_item("conference-bookmarks", "{broken").unwrap();
        let store = LocalPreferenceStore::new(medium);

        assert!(store.get_bookmarks().is_empty());
    }

    #[test]
    fn test_replace_all() {
        let store = LocalPreferenceStore::in_memory();
        store.add_bookmark("stale");
        store.add_starred("stale-star");

        store
            .replace_all(&[PreferenceRecord::new("fresh")], &[])
            .unwrap();

        assert_eq!(ids(&store.get_bookmarks()), vec!["fresh"]);
        assert!(store.get_starred().is_empty());
    }

    #[test]
    fn test_file_backed_store() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prefs.json");

        let store = LocalPreferenceStore::new(Arc::new(FileMedium::new(&path)));
        store.add(Collection::Bookmarks, "s1", Some("Opening keynote"));

        let reopened = LocalPreferenceStore::new(Arc::new(FileMedium::new(&path)));
        let records = reopened.get_bookmarks();
        assert_eq!(ids(&records), vec!["s1"]);
        assert_eq!(records[0].session_title.as_deref(), Some("Opening keynote"));
    }

    proptest! {
        #[test]
        fn prop_adds_never_duplicate(ops in proptest::collection::vec("[a-e]", 0..40)) {
            let store = LocalPreferenceStore::in_memory();
            for id in &ops {
                store.add_bookmark(id);
            }

            let records = store.get_bookmarks();
            let mut seen = std::collections::HashSet::new();
            for record in &records {
                prop_assert!(seen.insert(record.session_id.clone()));
            }
            for id in &ops {
                prop_assert!(store.is_bookmarked(id));
            }
        }
    }
}
