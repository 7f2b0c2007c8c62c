use crate::record::Collection;
use serde::Serialize;

/// In-memory view of the user's preferences, owned by the sync engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    pub bookmark_ids: Vec<String>,
    pub starred_ids: Vec<String>,
    pub is_loading: bool,
    pub is_authenticated: bool,
    /// Last authenticated identity seen by a load
    pub previous_identity: Option<String>,
}

impl SyncState {
    pub fn loading() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    pub fn ids(&self, collection: Collection) -> &[String] {
        match collection {
            Collection::Bookmarks => &self.bookmark_ids,
            Collection::Starred => &self.starred_ids,
        }
    }

    pub fn ids_mut(&mut self, collection: Collection) -> &mut Vec<String> {
        match collection {
            Collection::Bookmarks => &mut self.bookmark_ids,
            Collection::Starred => &mut self.starred_ids,
        }
    }

    pub fn contains(&self, collection: Collection, session_id: &str) -> bool {
        self.ids(collection).iter().any(|id| id == session_id)
    }

    /// Append an id unless present; returns whether it was added
    pub fn insert(&mut self, collection: Collection, session_id: &str) -> bool {
        if self.contains(collection, session_id) {
            return false;
        }
        self.ids_mut(collection).push(session_id.to_string());
        true
    }

    /// Remove an id; returns the position it held
    pub fn remove(&mut self, collection: Collection, session_id: &str) -> Option<usize> {
        let ids = self.ids_mut(collection);
        let position = ids.iter().position(|id| id == session_id)?;
        ids.remove(position);
        Some(position)
    }

    /// Put an id back where it was, unless it reappeared meanwhile
    pub fn reinsert(&mut self, collection: Collection, session_id: &str, position: usize) {
        if self.contains(collection, session_id) {
            return;
        }
        let ids = self.ids_mut(collection);
        let position = position.min(ids.len());
        ids.insert(position, session_id.to_string());
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            bookmarks: self.bookmark_ids.clone(),
            starred: self.starred_ids.clone(),
            loading: self.is_loading,
            is_authenticated: self.is_authenticated,
        }
    }
}

/// What the presentation layer reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSnapshot {
    pub bookmarks: Vec<String>,
    pub starred: Vec<String>,
    pub loading: bool,
    pub is_authenticated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_no_duplicates() {
        let mut state = SyncState::default();
        assert!(state.insert(Collection::Bookmarks, "s1"));
        assert!(!state.insert(Collection::Bookmarks, "s1"));
        assert_eq!(state.bookmark_ids, vec!["s1"]);
        assert!(state.starred_ids.is_empty());
    }

    #[test]
    fn test_remove_and_reinsert_restores_order() {
        let mut state = SyncState::default();
        for id in ["a", "b", "c"] {
            state.insert(Collection::Starred, id);
        }

        let position = state.remove(Collection::Starred, "b").unwrap();
        assert_eq!(state.starred_ids, vec!["a", "c"]);

        state.reinsert(Collection::Starred, "b", position);
        assert_eq!(state.starred_ids, vec!["a", "b", "c"]);

        // Already present: nothing happens
        state.reinsert(Collection::Starred, "b", 0);
        assert_eq!(state.starred_ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_missing() {
        let mut state = SyncState::default();
        assert_eq!(state.remove(Collection::Bookmarks, "nope"), None);
    }

    #[test]
    fn test_snapshot() {
        let mut state = SyncState::loading();
        state.insert(Collection::Bookmarks, "s1");

        let snapshot = state.snapshot();
        assert!(snapshot.loading);
        assert_eq!(snapshot.bookmarks, vec!["s1"]);
        assert!(!snapshot.is_authenticated);
    }
}
