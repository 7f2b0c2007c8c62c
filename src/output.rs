use crate::record::Collection;
use crate::sync::{LoadOutcome, SyncSnapshot};
use serde::Serialize;

/// JSON output mode for machine-readable events
/// Uses NDJSON format (newline-delimited JSON)
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Loaded {
        outcome: LoadOutcome,
    },
    Added {
        collection: Collection,
        session_id: String,
    },
    Removed {
        collection: Collection,
        session_id: String,
    },
    Reverted {
        collection: Collection,
        session_id: String,
        error: String,
    },
    Check {
        session_id: String,
        bookmarked: bool,
        starred: bool,
    },
    List {
        #[serde(flatten)]
        snapshot: SyncSnapshot,
    },
    Status {
        identity: Option<String>,
        remote: Option<String>,
        local_path: String,
        first_sync_done: bool,
        bookmarks: usize,
        starred: usize,
    },
    Cleared,
}

impl Event {
    /// Emit this event as JSON to stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }
}
