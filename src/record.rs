use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which preference collection a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Bookmarks,
    Starred,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Bookmarks, Collection::Starred];

    /// Remote collection name under `users/{identity}/`
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Bookmarks => "bookmarks",
            Collection::Starred => "starred",
        }
    }

    /// Key of the local storage entry holding this collection
    pub fn storage_key(&self) -> &'static str {
        match self {
            Collection::Bookmarks => "conference-bookmarks",
            Collection::Starred => "conference-starred",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bookmark or star entry for one session
///
/// Serialized the way the local store keeps it: camelCase keys, timestamp as
/// epoch milliseconds, title only when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRecord {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_title: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl PreferenceRecord {
    /// Create a record stamped with the current time
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            session_title: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.session_title = title.filter(|t| !t.is_empty());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Project a record list onto its session ids, keeping first occurrences
pub fn ids_of(records: &[PreferenceRecord]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::with_capacity(records.len());
    for record in records {
        if !ids.contains(&record.session_id) {
            ids.push(record.session_id.clone());
        }
    }
    ids
}
