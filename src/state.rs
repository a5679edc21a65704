//! Session State Module
//!
//! The single observable fact about the session, held by the application
//! root. Observers subscribe and are notified of every transition.

use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

/// Which state the session is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Loading,
    LoggedOut,
    NeedSecurityQuestion,
    LoggedIn,
    Error,
}

impl SessionState {
    /// Static user-facing description
    pub fn description(&self) -> &'static str {
        match self {
            SessionState::Loading => "Loading...",
            SessionState::LoggedOut => "Logged out.",
            SessionState::NeedSecurityQuestion => "Need to answer security question.",
            SessionState::LoggedIn => "Logged in.",
            SessionState::Error => "An error occurred while logging in.",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Holder of the current session state
///
/// Writes are last-writer-wins; a stale in-flight check can overwrite a
/// newer transition.
#[derive(Debug)]
pub struct SessionStateHolder {
    tx: watch::Sender<SessionState>,
}

impl SessionStateHolder {
    /// Start in `Loading`; the real state is derived by a session check
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Loading);
        Self { tx }
    }

    pub fn current(&self) -> SessionState {
        *self.tx.borrow()
    }

    /// Observe transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Publish a new state, returning the previous one
    pub fn set(&self, state: SessionState) -> SessionState {
        let previous = self.tx.send_replace(state);
        if previous != state {
            info!("Session state: {:?} -> {:?}", previous, state);
        }
        previous
    }
}

impl Default for SessionStateHolder {
    fn default() -> Self {
        Self::new()
    }
}
