//! Authentication Module
//!
//! Login, session verification and the security-question challenge.
//!
//! The API reports authentication through side channels rather than
//! response bodies: login success is the `JSESSIONID` cookie being set,
//! and an expired session is a 302 redirect to the login page.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::http::{ApiRequest, Transport, SESSION_COOKIE};
use crate::state::SessionState;
use crate::storage::{CredentialStore, SessionToken};

const VERIFY_DEVICE_PATH: &str = "/profile/verifyDeviceAuthentication.json";
const LOGIN_PATH: &str = "/login";
const SECURITY_QUESTION_PATH: &str = "/profile/getSecurityQuestion.json";
const SECURITY_ANSWER_PATH: &str = "/account/securityAnswer.json";

/// Name this client registers the device under when answering a challenge
pub const DEVICE_NAME: &str = "Subito";

/// Challenge question issued by the server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SecurityQuestion {
    #[serde(rename = "challengeQuestionKey")]
    pub id: i64,
    #[serde(rename = "groupNum")]
    pub group_id: i64,
    pub text: String,
}

/// Auth protocol handler
pub struct AuthClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialStore>,
}

impl AuthClient {
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            transport,
            credentials,
        }
    }

    /// Derive the session state from the stored token and the server's view of it
    pub async fn check_session_state(&self) -> SessionState {
        let token = match self.credentials.load_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("No stored session token");
                return SessionState::LoggedOut;
            }
            Err(e) => {
                warn!("Could not read stored session token: {}", e);
                return SessionState::LoggedOut;
            }
        };

        if let Err(e) = self.transport.install_session_cookie(&token) {
            error!("Couldn't set session cookie: {}", e);
            return SessionState::Error;
        }

        let response = match self
            .transport
            .request(ApiRequest::get(VERIFY_DEVICE_PATH))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Session check failed: {}", e);
                return SessionState::Error;
            }
        };

        // Stale sessions are redirected to the login page. The stored token is
        // kept as is.
        if response.status.as_u16() == 302 {
            info!("Session check redirected, treating as logged out");
            return SessionState::LoggedOut;
        }

        match verify_success(response.json()) {
            Some(true) => SessionState::LoggedIn,
            Some(false) => SessionState::NeedSecurityQuestion,
            None => {
                error!(
                    "Unexpected session check response ({}): {}",
                    response.status,
                    response.body_text()
                );
                SessionState::Error
            }
        }
    }

    /// Log in and persist the session token
    ///
    /// Returns `true` when the server issued a session cookie. This does not
    /// mean the session is fully authenticated: a security question may
    /// still be pending, which only a session check reveals.
    pub async fn log_in(&self, username: &str, password: &str) -> bool {
        info!("Logging in");

        let request = ApiRequest::post(LOGIN_PATH)
            .param("username", username)
            .param("password", password);

        let response = match self.transport.request(request).await {
            Ok(response) => response,
            Err(e) => {
                error!("Login request failed: {}", e);
                return false;
            }
        };

        let Some(value) = response.set_cookie(SESSION_COOKIE) else {
            warn!("Login response ({}) did not set a session cookie", response.status);
            return false;
        };

        if let Err(e) = self.credentials.save_token(&SessionToken::new(value)) {
            error!("Failed to save session token: {}", e);
            return false;
        }

        info!("Login issued a new session token");
        true
    }

    /// Fetch the pending challenge question, `None` on any failure
    pub async fn get_security_question(&self) -> Option<SecurityQuestion> {
        let response = match self
            .transport
            .request(ApiRequest::get(SECURITY_QUESTION_PATH))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Security question request failed: {}", e);
                return None;
            }
        };

        let question = parse_security_question(response.json());
        if question.is_none() {
            error!(
                "Unexpected security question response ({}): {}",
                response.status,
                response.body_text()
            );
        }
        question
    }

    /// Answer the challenge; `true` only if the server replies with a bare JSON `true`
    pub async fn answer_security_question(&self, question_id: i64, answer: &str) -> bool {
        let request = ApiRequest::post(SECURITY_ANSWER_PATH)
            .param("questionId", question_id)
            .param("answer", answer)
            .param("deviceName", DEVICE_NAME);

        let response = match self.transport.request(request).await {
            Ok(response) => response,
            Err(e) => {
                error!("Security answer request failed: {}", e);
                return false;
            }
        };

        match response.json() {
            Some(Value::Bool(accepted)) => {
                info!("Security answer accepted: {}", accepted);
                accepted
            }
            _ => {
                error!(
                    "Unexpected security answer response ({}): {}",
                    response.status,
                    response.body_text()
                );
                false
            }
        }
    }
}

fn verify_success(body: Option<Value>) -> Option<bool> {
    body?.as_object()?.get("success")?.as_bool()
}

fn parse_security_question(body: Option<Value>) -> Option<SecurityQuestion> {
    let body = body.filter(Value::is_object)?;
    serde_json::from_value(body).ok()
}
