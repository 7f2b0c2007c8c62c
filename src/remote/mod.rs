pub mod memory;
pub mod s3;
pub mod sqlite;

pub use memory::MemoryBackend;
pub use s3::S3Backend;
pub use sqlite::SqliteBackend;

use crate::error::{Result, SyncError};
use crate::record::{Collection, PreferenceRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user document store behind a network boundary
///
/// Layout: `users/{identity}` holds a profile document, and the
/// `users/{identity}/bookmarks` and `users/{identity}/starred` collections
/// hold one document per session, keyed by session id.
///
/// Every method reports failure; `RemotePreferenceStore` decides which
/// failures callers get to see.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// All documents of a user's collection
    async fn list(&self, identity: &str, collection: Collection) -> Result<Vec<PreferenceRecord>>;

    /// Create or overwrite the document for `session_id`
    ///
    /// The timestamp is assigned by the backend at write time.
    async fn upsert(
        &self,
        identity: &str,
        collection: Collection,
        session_id: &str,
        title: Option<&str>,
    ) -> Result<()>;

    /// Delete the document for `session_id` (deleting a missing one succeeds)
    async fn delete(&self, identity: &str, collection: Collection, session_id: &str) -> Result<()>;

    async fn profile_exists(&self, identity: &str) -> Result<bool>;

    async fn create_profile(&self, identity: &str, email: Option<&str>) -> Result<()>;

    /// Short backend name for logs and status output
    fn kind(&self) -> &'static str;
}

#[async_trait]
impl<T: DocumentBackend + ?Sized> DocumentBackend for std::sync::Arc<T> {
    async fn list(&self, identity: &str, collection: Collection) -> Result<Vec<PreferenceRecord>> {
        (**self).list(identity, collection).await
    }

    async fn upsert(
        &self,
        identity: &str,
        collection: Collection,
        session_id: &str,
        title: Option<&str>,
    ) -> Result<()> {
        (**self).upsert(identity, collection, session_id, title).await
    }

    async fn delete(&self, identity: &str, collection: Collection, session_id: &str) -> Result<()> {
        (**self).delete(identity, collection, session_id).await
    }

    async fn profile_exists(&self, identity: &str) -> Result<bool> {
        (**self).profile_exists(identity).await
    }

    async fn create_profile(&self, identity: &str, email: Option<&str>) -> Result<()> {
        (**self).create_profile(identity, email).await
    }

    fn kind(&self) -> &'static str {
        (**self).kind()
    }
}

/// Document stored per session in a remote collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    pub session_id: String,
    #[serde(default)]
    pub session_title: String,
    pub timestamp: DateTime<Utc>,
}

impl RemoteDocument {
    pub fn new(session_id: &str, title: Option<&str>) -> Self {
        Self {
            session_id: session_id.to_string(),
            session_title: title.unwrap_or_default().to_string(),
            timestamp: Utc::now(),
        }
    }
}

impl From<RemoteDocument> for PreferenceRecord {
    fn from(doc: RemoteDocument) -> Self {
        PreferenceRecord::new(doc.session_id)
            .with_title(Some(doc.session_title))
            .with_timestamp(doc.timestamp)
    }
}

/// The `users/{identity}` profile document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(email: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            email: email.unwrap_or_default().to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Remote preference store with the caller-facing error contract
///
/// - reads log and return an empty list on failure
/// - writes return `SyncError::Write` so the caller can roll back
/// - profile creation is best-effort and never fails
pub struct RemotePreferenceStore {
    backend: Box<dyn DocumentBackend>,
}

impl RemotePreferenceStore {
    pub fn new(backend: Box<dyn DocumentBackend>) -> Self {
        Self { backend }
    }

    pub fn kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub async fn records(&self, identity: &str, collection: Collection) -> Vec<PreferenceRecord> {
        match self.backend.list(identity, collection).await {
            Ok(records) => {
                tracing::debug!(
                    "Fetched {} remote {} for {}",
                    records.len(),
                    collection,
                    identity
                );
                records
            }
            Err(e) => {
                let err = SyncError::Read {
                    collection,
                    message: e.to_string(),
                };
                tracing::error!("{}", err);
                Vec::new()
            }
        }
    }

    pub async fn add(
        &self,
        identity: &str,
        collection: Collection,
        session_id: &str,
        title: Option<&str>,
    ) -> Result<()> {
        self.backend
            .upsert(identity, collection, session_id, title)
            .await
            .map_err(|e| {
                tracing::error!("Error adding remote {} entry {}: {}", collection, session_id, e);
                SyncError::write(collection, session_id, e)
            })
    }

    pub async fn remove(&self, identity: &str, collection: Collection, session_id: &str) -> Result<()> {
        self.backend
            .delete(identity, collection, session_id)
            .await
            .map_err(|e| {
                tracing::error!(
                    "Error removing remote {} entry {}: {}",
                    collection,
                    session_id,
                    e
                );
                SyncError::write(collection, session_id, e)
            })
    }

    pub async fn contains(&self, identity: &str, collection: Collection, session_id: &str) -> bool {
        self.records(identity, collection)
            .await
            .iter()
            .any(|r| r.session_id == session_id)
    }

    /// Create `users/{identity}` if it does not exist yet
    pub async fn ensure_user_profile(&self, identity: &str, email: Option<&str>) {
        if let Err(e) = self.try_ensure_user_profile(identity, email).await {
            let err = SyncError::ProfileEnsure {
                message: e.to_string(),
            };
            tracing::error!("{}", err);
        }
    }

    async fn try_ensure_user_profile(&self, identity: &str, email: Option<&str>) -> Result<()> {
        if self.backend.profile_exists(identity).await? {
            return Ok(());
        }

        tracing::debug!("Creating user profile for {}", identity);
        self.backend.create_profile(identity, email).await
    }

    pub async fn get_bookmarks(&self, identity: &str) -> Vec<PreferenceRecord> {
        self.records(identity, Collection::Bookmarks).await
    }

    pub async fn add_bookmark(&self, identity: &str, session_id: &str, title: Option<&str>) -> Result<()> {
        self.add(identity, Collection::Bookmarks, session_id, title).await
    }

    pub async fn remove_bookmark(&self, identity: &str, session_id: &str) -> Result<()> {
        self.remove(identity, Collection::Bookmarks, session_id).await
    }

    pub async fn is_bookmarked(&self, identity: &str, session_id: &str) -> bool {
        self.contains(identity, Collection::Bookmarks, session_id).await
    }

    pub async fn get_starred(&self, identity: &str) -> Vec<PreferenceRecord> {
        self.records(identity, Collection::Starred).await
    }

    pub async fn add_starred(&self, identity: &str, session_id: &str, title: Option<&str>) -> Result<()> {
        self.add(identity, Collection::Starred, session_id, title).await
    }

    pub async fn remove_starred(&self, identity: &str, session_id: &str) -> Result<()> {
        self.remove(identity, Collection::Starred, session_id).await
    }

    pub async fn is_starred(&self, identity: &str, session_id: &str) -> bool {
        self.contains(identity, Collection::Starred, session_id).await
    }
}
