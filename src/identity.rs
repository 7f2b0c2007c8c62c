// Identity bridge
//
// Turns a primary auth session (whoever signed the user in) into an identity
// the remote store accepts, and publishes the result on a watch channel.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

/// Authenticated user as the remote store knows them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub uid: String,
    pub email: Option<String>,
}

/// Session handed over by the external sign-in provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimarySession {
    pub user_id: String,
    pub email: Option<String>,
}

impl PrimarySession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthState {
    pub identity: Option<Identity>,
    pub loading: bool,
    pub error: Option<String>,
}

impl AuthState {
    fn resolving() -> Self {
        Self {
            identity: None,
            loading: true,
            error: None,
        }
    }

    fn resolved(identity: Option<Identity>, error: Option<String>) -> Self {
        Self {
            identity,
            loading: false,
            error,
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.uid.as_str())
    }
}

/// Exchange a primary session for a remote-store identity
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    async fn exchange(&self, session: &PrimarySession) -> Result<Identity>;
}

/// Trust the primary session as is: its user id becomes the identity
///
/// Fits backends the user controls directly (a local database, their own
/// bucket) where there is no separate credential to mint.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectExchange;

#[async_trait]
impl CredentialExchange for DirectExchange {
    async fn exchange(&self, session: &PrimarySession) -> Result<Identity> {
        let uid = session.user_id.trim();
        if uid.is_empty() {
            return Err(SyncError::Auth("primary session has an empty user id".to_string()));
        }

        Ok(Identity {
            uid: uid.to_string(),
            email: session.email.clone(),
        })
    }
}

/// Publishes `{identity, loading}` and runs the credential exchange
///
/// The exchange runs at most once per primary user id: calling
/// `set_primary_session` again with the same user is a no-op, and
/// concurrent calls queue behind the one in flight.
pub struct IdentityBridge {
    exchange: Box<dyn CredentialExchange>,
    state: watch::Sender<AuthState>,
    // Outer None: no session seen yet. Inner None: signed out.
    last_primary: Mutex<Option<Option<String>>>,
}

impl IdentityBridge {
    pub fn new(exchange: Box<dyn CredentialExchange>) -> Self {
        let (state, _) = watch::channel(AuthState::resolving());
        Self {
            exchange,
            state,
            last_primary: Mutex::new(None),
        }
    }

    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Feed the latest primary session (None when signed out)
    pub async fn set_primary_session(&self, session: Option<PrimarySession>) {
        let mut last = self.last_primary.lock().await;
        let user_id = session.as_ref().map(|s| s.user_id.clone());
        if last.as_ref() == Some(&user_id) {
            tracing::debug!("Primary session unchanged, skipping credential exchange");
            return;
        }
        *last = Some(user_id);

        let Some(session) = session else {
            tracing::debug!("No primary session, identity cleared");
            self.state.send_replace(AuthState::resolved(None, None));
            return;
        };

        self.state.send_replace(AuthState::resolving());

        match self.exchange.exchange(&session).await {
            Ok(identity) => {
                tracing::info!("Signed in as {}", identity.uid);
                self.state
                    .send_replace(AuthState::resolved(Some(identity), None));
            }
            Err(e) => {
                tracing::error!("Credential exchange failed for {}: {}", session.user_id, e);
                self.state
                    .send_replace(AuthState::resolved(None, Some(e.to_string())));
            }
        }
    }
}
