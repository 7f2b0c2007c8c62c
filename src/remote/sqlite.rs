// SQLite document backend
//
// Keeps the per-user collections in a single database file. Useful as a
// self-hosted remote shared by several devices on one machine or network
// share, and as a durable backend for integration tests.

use super::DocumentBackend;
use crate::error::{Result, SyncError};
use crate::record::{Collection, PreferenceRecord};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteBackend {
    /// Database schema version
    const SCHEMA_VERSION: i32 = 1;

    /// Open or create the document database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        tracing::debug!("Opened SQLite remote store at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS preferences (
                user_id TEXT NOT NULL,
                collection TEXT NOT NULL,
                session_id TEXT NOT NULL,
                session_title TEXT NOT NULL DEFAULT '',
                timestamp INTEGER NOT NULL,
                PRIMARY KEY (user_id, collection, session_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                email TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        // Version tracking
        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', ?1)",
            params![Self::SCHEMA_VERSION.to_string()],
        )?;

        Ok(())
    }

    /// Run a blocking closure against the connection off the async runtime
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| SyncError::Backend("SQLite connection lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| SyncError::Backend(format!("SQLite task failed: {}", e)))?
    }
}

#[async_trait]
impl DocumentBackend for SqliteBackend {
    async fn list(&self, identity: &str, collection: Collection) -> Result<Vec<PreferenceRecord>> {
        let identity = identity.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, session_title, timestamp
                 FROM preferences
                 WHERE user_id = ?1 AND collection = ?2
                 ORDER BY rowid",
            )?;

            let rows = stmt.query_map(params![identity, collection.as_str()], |row| {
                let session_id: String = row.get(0)?;
                let title: String = row.get(1)?;
                let millis: i64 = row.get(2)?;
                Ok((session_id, title, millis))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (session_id, title, millis) = row?;
                let timestamp = Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .unwrap_or_else(Utc::now);
                records.push(
                    PreferenceRecord::new(session_id)
                        .with_title(Some(title))
                        .with_timestamp(timestamp),
                );
            }
            Ok(records)
        })
        .await
    }

    async fn upsert(
        &self,
        identity: &str,
        collection: Collection,
        session_id: &str,
        title: Option<&str>,
    ) -> Result<()> {
        let identity = identity.to_string();
        let session_id = session_id.to_string();
        let title = title.unwrap_or_default().to_string();
        let now = Utc::now().timestamp_millis();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO preferences (user_id, collection, session_id, session_title, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (user_id, collection, session_id)
                 DO UPDATE SET session_title = excluded.session_title,
                               timestamp = excluded.timestamp",
                params![identity, collection.as_str(), session_id, title, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, identity: &str, collection: Collection, session_id: &str) -> Result<()> {
        let identity = identity.to_string();
        let session_id = session_id.to_string();

        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM preferences
                 WHERE user_id = ?1 AND collection = ?2 AND session_id = ?3",
                params![identity, collection.as_str(), session_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn profile_exists(&self, identity: &str) -> Result<bool> {
        let identity = identity.to_string();
        self.with_conn(move |conn| {
            let found: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM users WHERE user_id = ?1",
                    params![identity],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn create_profile(&self, identity: &str, email: Option<&str>) -> Result<()> {
        let identity = identity.to_string();
        let email = email.unwrap_or_default().to_string();
        let now = Utc::now().timestamp_millis();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO users (user_id, email, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![identity, email, now],
            )?;
            Ok(())
        })
        .await
    }

    fn kind(&self) -> &'static str {
        "sqlite"
    }
}
