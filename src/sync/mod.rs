pub mod merge;
pub mod state;

pub use merge::{plan_merge, MergePlan};
pub use state::{SyncSnapshot, SyncState};

use crate::error::Result;
use crate::identity::{AuthState, Identity};
use crate::local::LocalPreferenceStore;
use crate::record::{ids_of, Collection, PreferenceRecord};
use crate::remote::RemotePreferenceStore;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

/// What a call to `load_data` ended up doing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// Identity still resolving; nothing was read
    Deferred,
    /// No usable identity or remote: device data only
    LocalOnly,
    /// First load for this identity: local records were backfilled
    FirstSync {
        identity: String,
        backfilled: usize,
        failed: usize,
    },
    /// Returning identity: the device now mirrors the remote
    Mirrored { identity: String },
    /// The load path failed; device data is shown instead
    Fallback,
}

/// Reconciles the device store with the remote store
///
/// Mutations are optimistic: memory and the device store change first, the
/// remote write follows, and a failed remote write reverts both. Mutations
/// on the same session id are not serialized against each other.
pub struct PreferenceSync {
    local: LocalPreferenceStore,
    remote: Option<RemotePreferenceStore>,
    auth: watch::Receiver<AuthState>,
    state: Mutex<SyncState>,
    snapshots: watch::Sender<SyncSnapshot>,
}

impl PreferenceSync {
    pub fn new(
        local: LocalPreferenceStore,
        remote: Option<RemotePreferenceStore>,
        auth: watch::Receiver<AuthState>,
    ) -> Self {
        if !local.is_available() {
            tracing::warn!("No device storage available, preferences will not persist");
        }

        let state = SyncState::loading();
        let (snapshots, _) = watch::channel(state.snapshot());
        Self {
            local,
            remote,
            auth,
            state: Mutex::new(state),
            snapshots,
        }
    }

    pub fn local(&self) -> &LocalPreferenceStore {
        &self.local
    }

    pub fn remote(&self) -> Option<&RemotePreferenceStore> {
        self.remote.as_ref()
    }

    pub fn bookmarks(&self) -> Vec<String> {
        self.lock().bookmark_ids.clone()
    }

    pub fn starred(&self) -> Vec<String> {
        self.lock().starred_ids.clone()
    }

    pub fn loading(&self) -> bool {
        self.lock().is_loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().is_authenticated
    }

    pub fn previous_identity(&self) -> Option<String> {
        self.lock().previous_identity.clone()
    }

    pub fn is_bookmarked(&self, session_id: &str) -> bool {
        self.lock().contains(Collection::Bookmarks, session_id)
    }

    pub fn is_starred(&self, session_id: &str) -> bool {
        self.lock().contains(Collection::Starred, session_id)
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        self.lock().snapshot()
    }

    /// Receive a fresh snapshot after every state change
    pub fn subscribe(&self) -> watch::Receiver<SyncSnapshot> {
        self.snapshots.subscribe()
    }

    pub async fn add_bookmark(&self, session_id: &str, title: Option<&str>) -> Result<()> {
        self.add(Collection::Bookmarks, session_id, title).await
    }

    pub async fn remove_bookmark(&self, session_id: &str) -> Result<()> {
        self.remove(Collection::Bookmarks, session_id).await
    }

    pub async fn add_starred(&self, session_id: &str, title: Option<&str>) -> Result<()> {
        self.add(Collection::Starred, session_id, title).await
    }

    pub async fn remove_starred(&self, session_id: &str) -> Result<()> {
        self.remove(Collection::Starred, session_id).await
    }

    /// Re-run the full load path
    pub async fn refresh(&self) -> LoadOutcome {
        self.load_data().await
    }

    /// Load whenever the identity bridge publishes a change
    ///
    /// Runs one load up front; returns once the bridge is dropped.
    pub async fn follow_identity(&self) {
        let mut auth = self.auth.clone();
        auth.borrow_and_update();
        self.load_data().await;

        while auth.changed().await.is_ok() {
            self.load_data().await;
        }
        tracing::debug!("Identity bridge closed, no longer following");
    }

    /// Bring memory and the device store in line with the current identity
    ///
    /// Never leaves `loading` set once it has started: any failure falls
    /// back to what the device store holds.
    pub async fn load_data(&self) -> LoadOutcome {
        let auth = self.auth.borrow().clone();
        if auth.loading {
            tracing::debug!("Identity still resolving, deferring load");
            return LoadOutcome::Deferred;
        }

        self.update(|s| s.is_loading = true);

        let outcome = match self.try_load(&auth).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Failed to load preferences: {}. Using device data.", e);
                // Still signed in: later mutations keep writing to the remote
                self.expose_local(auth.identity.is_some() && self.remote.is_some());
                LoadOutcome::Fallback
            }
        };

        self.update(|s| s.is_loading = false);
        tracing::info!("Preferences loaded: {:?}", outcome);
        outcome
    }

    async fn try_load(&self, auth: &AuthState) -> Result<LoadOutcome> {
        let Some(identity) = auth.identity.as_ref() else {
            self.expose_local(false);
            return Ok(LoadOutcome::LocalOnly);
        };

        let Some(remote) = self.remote.as_ref() else {
            tracing::warn!(
                "Signed in as {} but no remote store is configured, using device data only",
                identity.uid
            );
            self.track_identity(identity);
            self.expose_local(false);
            return Ok(LoadOutcome::LocalOnly);
        };

        self.track_identity(identity);

        if self.local.first_sync_done(&identity.uid) {
            self.mirror_remote(remote, identity).await
        } else {
            self.first_sync(remote, identity).await
        }
    }

    /// Record the identity this load runs for, noting switches
    fn track_identity(&self, identity: &Identity) {
        let previous = self.update(|s| s.previous_identity.replace(identity.uid.clone()));
        if let Some(previous) = previous {
            if previous != identity.uid {
                tracing::info!("Identity changed from {} to {}", previous, identity.uid);
            }
        }
    }

    /// First load for an identity: backfill device records, then converge
    async fn first_sync(
        &self,
        remote: &RemotePreferenceStore,
        identity: &Identity,
    ) -> Result<LoadOutcome> {
        let uid = identity.uid.as_str();
        tracing::info!("First sync for {}, merging device preferences", uid);

        remote.ensure_user_profile(uid, identity.email.as_deref()).await;

        let local_bookmarks = self.local.get_bookmarks();
        let local_starred = self.local.get_starred();
        let (remote_bookmarks, remote_starred) =
            tokio::join!(remote.get_bookmarks(uid), remote.get_starred(uid));

        let bookmarks = plan_merge(&local_bookmarks, &remote_bookmarks);
        let starred = plan_merge(&local_starred, &remote_starred);

        let backfill = bookmarks
            .missing
            .iter()
            .map(|r| (Collection::Bookmarks, r))
            .chain(starred.missing.iter().map(|r| (Collection::Starred, r)))
            .map(|(collection, record)| async move {
                let result = remote
                    .add(
                        uid,
                        collection,
                        &record.session_id,
                        record.session_title.as_deref(),
                    )
                    .await;
                (collection, record, result)
            });

        let results = futures::future::join_all(backfill).await;
        let mut failed = 0;
        for (collection, record, result) in &results {
            if let Err(e) = result {
                failed += 1;
                tracing::warn!(
                    "Failed to backfill {} entry {}: {}",
                    collection,
                    record.session_id,
                    e
                );
            }
        }
        let backfilled = results.len() - failed;

        self.local.mark_first_sync(uid);
        self.local.replace_all(&bookmarks.merged, &starred.merged)?;
        self.expose(&bookmarks.merged, &starred.merged, true);

        Ok(LoadOutcome::FirstSync {
            identity: uid.to_string(),
            backfilled,
            failed,
        })
    }

    /// Returning identity: the remote wins outright
    async fn mirror_remote(
        &self,
        remote: &RemotePreferenceStore,
        identity: &Identity,
    ) -> Result<LoadOutcome> {
        let uid = identity.uid.as_str();
        let (bookmarks, starred) =
            tokio::join!(remote.get_bookmarks(uid), remote.get_starred(uid));

        self.local.replace_all(&bookmarks, &starred)?;
        self.expose(&bookmarks, &starred, true);

        Ok(LoadOutcome::Mirrored {
            identity: uid.to_string(),
        })
    }

    fn expose_local(&self, authenticated: bool) {
        let bookmarks = self.local.get_bookmarks();
        let starred = self.local.get_starred();
        self.expose(&bookmarks, &starred, authenticated);
    }

    fn expose(&self, bookmarks: &[PreferenceRecord], starred: &[PreferenceRecord], authenticated: bool) {
        let bookmark_ids = ids_of(bookmarks);
        let starred_ids = ids_of(starred);
        self.update(|s| {
            s.bookmark_ids = bookmark_ids;
            s.starred_ids = starred_ids;
            s.is_authenticated = authenticated;
        });
    }

    async fn add(&self, collection: Collection, session_id: &str, title: Option<&str>) -> Result<()> {
        let added_in_memory = self.update(|s| s.insert(collection, session_id));
        let added_locally = self.local.add(collection, session_id, title);

        let Some((uid, remote)) = self.remote_target() else {
            return Ok(());
        };

        if let Err(e) = remote.add(&uid, collection, session_id, title).await {
            if added_in_memory {
                self.update(|s| s.remove(collection, session_id));
            }
            if added_locally {
                self.local.remove(collection, session_id);
            }
            tracing::warn!("Reverted {} add of {}", collection, session_id);
            return Err(e);
        }

        tracing::debug!("Added {} entry {}", collection, session_id);
        Ok(())
    }

    async fn remove(&self, collection: Collection, session_id: &str) -> Result<()> {
        let removed_at = self.update(|s| s.remove(collection, session_id));
        let removed_locally = self.local.remove(collection, session_id);

        let Some((uid, remote)) = self.remote_target() else {
            return Ok(());
        };

        if let Err(e) = remote.remove(&uid, collection, session_id).await {
            if let Some(position) = removed_at {
                self.update(|s| s.reinsert(collection, session_id, position));
            }
            if let Some((position, record)) = removed_locally {
                self.local.restore(collection, record, position);
            }
            tracing::warn!("Reverted {} removal of {}", collection, session_id);
            return Err(e);
        }

        tracing::debug!("Removed {} entry {}", collection, session_id);
        Ok(())
    }

    /// Identity and store for remote writes, if signed in with a remote
    fn remote_target(&self) -> Option<(String, &RemotePreferenceStore)> {
        let uid = self.auth.borrow().uid()?.to_string();
        let remote = self.remote.as_ref()?;
        Some((uid, remote))
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mutate state under the lock and publish the new snapshot
    fn update<T>(&self, f: impl FnOnce(&mut SyncState) -> T) -> T {
        let mut state = self.lock();
        let result = f(&mut state);
        self.snapshots.send_replace(state.snapshot());
        result
    }
}
