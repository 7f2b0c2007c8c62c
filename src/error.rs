use crate::record::Collection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to read {collection}: {message}")]
    Read {
        collection: Collection,
        message: String,
    },

    #[error("Failed to write {collection} entry '{session_id}': {message}\nThe change was reverted on this device.")]
    Write {
        collection: Collection,
        session_id: String,
        message: String,
    },

    #[error("Failed to ensure user profile: {message}")]
    ProfileEnsure { message: String },

    #[error("Credential exchange failed: {0}")]
    Auth(String),

    #[error("Remote backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Wrap a backend failure as the write error surfaced to mutation callers
    pub fn write(collection: Collection, session_id: &str, source: SyncError) -> Self {
        match source {
            // Already a write error from a nested layer, keep it as is
            e @ SyncError::Write { .. } => e,
            other => SyncError::Write {
                collection,
                session_id: session_id.to_string(),
                message: other.to_string(),
            },
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, SyncError::Write { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
