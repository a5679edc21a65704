//! HTTP Session Module
//!
//! Cookie-aware transport bound to the STARLINK host. Redirects are never
//! followed: a 302 from the API means "not authenticated".

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, SET_COOKIE};
use reqwest::{Method, StatusCode, Url};
use tracing::{debug, error};

use crate::device::DeviceId;
use crate::storage::SessionToken;

/// Name of the identity cookie carrying the session token
pub const SESSION_COOKIE: &str = "JSESSIONID";

/// A request against the remote API, relative to the session's host
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl ApiRequest {
    pub fn get(path: &'static str) -> Self {
        Self {
            method: Method::GET,
            path,
            params: Vec::new(),
        }
    }

    pub fn post(path: &'static str) -> Self {
        Self {
            method: Method::POST,
            path,
            params: Vec::new(),
        }
    }

    /// Append a parameter
    pub fn param(mut self, name: &'static str, value: impl ToString) -> Self {
        self.params.push((name, value.to_string()));
        self
    }

    /// First value of a parameter
    pub fn param_value(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Raw response as received, redirects included
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Best-effort JSON parse of the body
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Value of the first `Set-Cookie` header naming `name`
    pub fn set_cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|header| parse_set_cookie(header, name))
    }
}

fn parse_set_cookie(header: &str, name: &str) -> Option<String> {
    let pair = header.split(';').next()?;
    let (cookie_name, value) = pair.split_once('=')?;
    if cookie_name.trim() != name {
        return None;
    }

    let value = value.trim().trim_matches('"');
    // An empty value is the server expiring the cookie, not issuing one
    (!value.is_empty()).then(|| value.to_string())
}

/// Request-in, response-out seam around the shared cookie jar
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request; the device id is added to its parameters
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;

    /// Place the session cookie into the jar for the remote host
    fn install_session_cookie(&self, token: &SessionToken) -> Result<(), TransportError>;
}

/// reqwest-backed session shared by every component
pub struct HttpSession {
    base_url: String,
    host: Url,
    device_id: DeviceId,
    client: reqwest::Client,
    cookies: Arc<Jar>,
}

impl HttpSession {
    /// Create a session bound to `base_url`
    pub fn new(base_url: &str, device_id: DeviceId) -> Result<Self, TransportError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let host = Url::parse(&base_url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

        let cookies = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        debug!("HTTP session bound to: {}", base_url);

        Ok(Self {
            base_url,
            host,
            device_id,
            client,
            cookies,
        })
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))
    }
}

impl std::fmt::Debug for HttpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSession")
            .field("base_url", &self.base_url)
            .field("device_id", &self.device_id)
            .finish()
    }
}

#[async_trait]
impl Transport for HttpSession {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url(request.path)?;

        let mut params = request.params;
        params.push(("deviceId", self.device_id.to_string()));

        debug!("{} {}", request.method, url);

        let builder = self.client.request(request.method.clone(), url);
        let builder = if request.method == Method::GET {
            builder.query(&params)
        } else {
            builder.form(&params)
        };

        let response = builder.send().await.map_err(|e| {
            error!("Request to {} failed: {}", request.path, e);
            TransportError::Network(e.to_string())
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        debug!(
            "{} {} -> {} ({} bytes)",
            request.method,
            request.path,
            status,
            body.len()
        );

        Ok(ApiResponse::new(status, headers, body.to_vec()))
    }

    fn install_session_cookie(&self, token: &SessionToken) -> Result<(), TransportError> {
        let value = token.as_str();
        if value.is_empty()
            || value
                .chars()
                .any(|c| c.is_control() || c.is_whitespace() || c == ';' || c == ',')
        {
            return Err(TransportError::InvalidCookie(
                "token is not a valid cookie value".into(),
            ));
        }

        let mut cookie = format!("{}={}; Path=/", SESSION_COOKIE, value);
        if self.host.scheme() == "https" {
            cookie.push_str("; Secure");
        }

        self.cookies.add_cookie_str(&cookie, &self.host);
        debug!("Installed session cookie for {}", self.base_url);
        Ok(())
    }
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Client error: {0}")]
    Client(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid cookie: {0}")]
    InvalidCookie(String),
}


#[cfg(test)]
mod tests {
    use super::mock::with_cookies;
    use super::*;

    #[test]
    fn finds_named_cookie_among_several() {
        let response = with_cookies(
            200,
            &[
                "AWSALB=xyz; Path=/",
                "JSESSIONID=abc123; Path=/; Secure; HttpOnly",
            ],
        );

        assert_eq!(response.set_cookie(SESSION_COOKIE), Some("abc123".into()));
        assert_eq!(response.set_cookie("missing"), None);
    }

    #[test]
    fn first_matching_cookie_wins() {
        let response = with_cookies(200, &["JSESSIONID=first", "JSESSIONID=second"]);
        assert_eq!(response.set_cookie(SESSION_COOKIE), Some("first".into()));
    }

    #[test]
    fn expired_cookie_is_ignored() {
        let response = with_cookies(200, &["JSESSIONID=; Max-Age=0; Path=/"]);
        assert_eq!(response.set_cookie(SESSION_COOKIE), None);
    }

    #[test]
    fn cookie_name_must_match_exactly() {
        let response = with_cookies(200, &["XJSESSIONID=abc", "JSESSIONIDX=def"]);
        assert_eq!(response.set_cookie(SESSION_COOKIE), None);
    }

    #[test]
    fn json_is_best_effort() {
        assert_eq!(
            super::mock::json(200, "true").json(),
            Some(serde_json::Value::Bool(true))
        );
        assert_eq!(super::mock::json(200, "<html>").json(), None);
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            HttpSession::new("not a url", DeviceId::new("device")),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn rejects_tokens_that_cannot_be_cookie_values() {
        let session = HttpSession::new("https://example.test", DeviceId::new("device")).unwrap();

        assert!(session
            .install_session_cookie(&SessionToken::new("abc123"))
            .is_ok());
        assert!(session
            .install_session_cookie(&SessionToken::new("bad; Path=/evil"))
            .is_err());
        assert!(session.install_session_cookie(&SessionToken::new("")).is_err());
    }

    #[test]
    fn request_builder_collects_params() {
        let request = ApiRequest::post("/login")
            .param("username", "driver")
            .param("questionId", 42);

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.param_value("username"), Some("driver"));
        assert_eq!(request.param_value("questionId"), Some("42"));
        assert_eq!(request.param_value("deviceId"), None);
    }
}
