pub mod config;
pub mod error;
pub mod identity;
pub mod local;
pub mod output;
pub mod record;
pub mod remote;
pub mod sync;

pub use error::{Result, SyncError};
pub use identity::{AuthState, CredentialExchange, DirectExchange, Identity, IdentityBridge, PrimarySession};
pub use local::{FileMedium, LocalPreferenceStore, MemoryMedium, StorageMedium};
pub use record::{Collection, PreferenceRecord};
pub use remote::{DocumentBackend, MemoryBackend, RemotePreferenceStore};
pub use sync::{LoadOutcome, PreferenceSync, SyncSnapshot};
