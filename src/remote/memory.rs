use super::{DocumentBackend, RemoteDocument, UserProfile};
use crate::error::{Result, SyncError};
use crate::record::{Collection, PreferenceRecord};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

type CollectionKey = (String, Collection);

/// In-process document store
///
/// Behaves like a remote backend (server-side timestamps, overwrite on
/// upsert) and can be told to fail, which is how rollback and degraded-read
/// paths get exercised without a network.
#[derive(Default)]
pub struct MemoryBackend {
    documents: Mutex<HashMap<CollectionKey, Vec<RemoteDocument>>>,
    profiles: Mutex<HashMap<String, UserProfile>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    failing_sessions: Mutex<HashSet<String>>,
    write_calls: AtomicUsize,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every list and profile lookup fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every upsert, delete and profile creation fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make writes touching one session id fail
    pub fn fail_session(&self, session_id: &str) {
        guard(&self.failing_sessions).insert(session_id.to_string());
    }

    /// Number of upsert/delete calls attempted, failed ones included
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Insert documents directly, bypassing failure injection
    pub fn seed(&self, identity: &str, collection: Collection, session_ids: &[&str]) {
        let mut documents = guard(&self.documents);
        let docs = documents
            .entry((identity.to_string(), collection))
            .or_default();
        for id in session_ids {
            if !docs.iter().any(|d| d.session_id == *id) {
                docs.push(RemoteDocument::new(id, None));
            }
        }
    }

    /// Session ids currently stored, in insertion order
    pub fn ids(&self, identity: &str, collection: Collection) -> Vec<String> {
        guard(&self.documents)
            .get(&(identity.to_string(), collection))
            .map(|docs| docs.iter().map(|d| d.session_id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn profile(&self, identity: &str) -> Option<UserProfile> {
        guard(&self.profiles).get(identity).cloned()
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::Backend("simulated read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self, session_id: Option<&str>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::Backend("simulated write failure".to_string()));
        }
        if let Some(id) = session_id {
            if guard(&self.failing_sessions).contains(id) {
                return Err(SyncError::Backend(format!(
                    "simulated write failure for {}",
                    id
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn list(&self, identity: &str, collection: Collection) -> Result<Vec<PreferenceRecord>> {
        self.check_read()?;
        let documents = guard(&self.documents);
        Ok(documents
            .get(&(identity.to_string(), collection))
            .map(|docs| docs.iter().cloned().map(PreferenceRecord::from).collect())
            .unwrap_or_default())
    }

    async fn upsert(
        &self,
        identity: &str,
        collection: Collection,
        session_id: &str,
        title: Option<&str>,
    ) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write(Some(session_id))?;

        let mut documents = guard(&self.documents);
        let docs = documents
            .entry((identity.to_string(), collection))
            .or_default();
        let doc = RemoteDocument::new(session_id, title);
        match docs.iter_mut().find(|d| d.session_id == session_id) {
            Some(existing) => *existing = doc,
            None => docs.push(doc),
        }
        Ok(())
    }

    async fn delete(&self, identity: &str, collection: Collection, session_id: &str) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write(Some(session_id))?;

        if let Some(docs) = guard(&self.documents).get_mut(&(identity.to_string(), collection)) {
            docs.retain(|d| d.session_id != session_id);
        }
        Ok(())
    }

    async fn profile_exists(&self, identity: &str) -> Result<bool> {
        self.check_read()?;
        Ok(guard(&self.profiles).contains_key(identity))
    }

    async fn create_profile(&self, identity: &str, email: Option<&str>) -> Result<()> {
        self.check_write(None)?;
        guard(&self.profiles)
            .entry(identity.to_string())
            .or_insert_with(|| UserProfile::new(email));
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_overwrites_in_place() {
        let backend = MemoryBackend::new();
        backend.seed("u1", Collection::Starred, &["a", "b"]);

        backend
            .upsert("u1", Collection::Starred, "a", Some("Renamed"))
            .await
            .unwrap();

        let records = backend.list("u1", Collection::Starred).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].session_id, "a");
        assert_eq!(records[0].session_title.as_deref(), Some("Renamed"));
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let backend = MemoryBackend::new();
        backend.seed("u1", Collection::Bookmarks, &["a"]);

        assert!(backend
            .list("u2", Collection::Bookmarks)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(backend.ids("u1", Collection::Bookmarks), vec!["a"]);
    }

    #[tokio::test]
    async fn test_failing_session_only_affects_that_id() {
        let backend = MemoryBackend::new();
        backend.fail_session("bad");

        assert!(backend
            .upsert("u1", Collection::Bookmarks, "bad", None)
            .await
            .is_err());
        assert!(backend
            .upsert("u1", Collection::Bookmarks, "good", None)
            .await
            .is_ok());
        assert_eq!(backend.ids("u1", Collection::Bookmarks), vec!["good"]);
        assert_eq!(backend.write_calls(), 2);
    }
}
