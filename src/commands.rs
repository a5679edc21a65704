//! Commands Module
//!
//! Operations exposed to the UI. They run the protocol calls and publish
//! the resulting session transitions.

use std::sync::atomic::Ordering;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::auth::SecurityQuestion;
use crate::state::SessionState;
use crate::vehicle::EngineStartRequest;
use crate::AppState;

/// Result of a guarded vehicle command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandStatus {
    /// The request was sent and has finished
    Completed,
    /// Another command was still in flight; nothing was sent
    Busy,
}

/// Re-derive the session state from the server
pub async fn refresh_session(state: &AppState) -> SessionState {
    state.session.set(SessionState::Loading);
    let result = state.auth.check_session_state().await;
    state.session.set(result);
    result
}

/// Log in, then re-check the session to learn whether a challenge is pending
pub async fn log_in(state: &AppState, username: &str, password: &str) -> SessionState {
    if state.auth.log_in(username, password).await {
        refresh_session(state).await
    } else {
        state.session.set(SessionState::LoggedOut);
        SessionState::LoggedOut
    }
}

/// Fetch the challenge to display
///
/// When none can be retrieved the session is re-checked instead.
pub async fn load_security_question(state: &AppState) -> Option<SecurityQuestion> {
    let question = state.auth.get_security_question().await;
    if question.is_none() {
        warn!("No security question available, re-checking session");
        refresh_session(state).await;
    }
    question
}

/// Submit a challenge answer
///
/// On `false` the state stays `NeedSecurityQuestion` and the caller should
/// clear its answer input.
pub async fn submit_security_answer(state: &AppState, question_id: i64, answer: &str) -> bool {
    let accepted = state.auth.answer_security_question(question_id, answer).await;
    if accepted {
        refresh_session(state).await;
    } else {
        debug!("Security answer rejected");
    }
    accepted
}

/// Whether a vehicle command is in flight
pub fn command_pending(state: &AppState) -> bool {
    state.command_pending.load(Ordering::SeqCst)
}

pub async fn start_engine(state: &AppState, request: EngineStartRequest) -> CommandStatus {
    let Some(_guard) = PendingGuard::acquire(state) else {
        return CommandStatus::Busy;
    };
    state.vehicle.start_engine(request).await;
    CommandStatus::Completed
}

pub async fn stop_engine(state: &AppState, pin: &str) -> CommandStatus {
    let Some(_guard) = PendingGuard::acquire(state) else {
        return CommandStatus::Busy;
    };
    state.vehicle.stop_engine(pin).await;
    CommandStatus::Completed
}

pub async fn lock_doors(state: &AppState, pin: &str) -> CommandStatus {
    let Some(_guard) = PendingGuard::acquire(state) else {
        return CommandStatus::Busy;
    };
    state.vehicle.lock_doors(pin).await;
    CommandStatus::Completed
}

pub async fn unlock_doors(state: &AppState, pin: &str) -> CommandStatus {
    let Some(_guard) = PendingGuard::acquire(state) else {
        return CommandStatus::Busy;
    };
    state.vehicle.unlock_doors(pin).await;
    CommandStatus::Completed
}

/// Holds the pending flag; released on drop
struct PendingGuard<'a> {
    state: &'a AppState,
}

impl<'a> PendingGuard<'a> {
    fn acquire(state: &'a AppState) -> Option<Self> {
        match state
            .command_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => Some(Self { state }),
            Err(_) => {
                info!("Vehicle command already in flight");
                None
            }
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.state.command_pending.store(false, Ordering::SeqCst);
    }
}
