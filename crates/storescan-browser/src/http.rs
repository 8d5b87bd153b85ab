//! Privileged, state-changing requests issued on behalf of the automated session.

use crate::actions::{cookie_header, SessionCookie};
use crate::error::{BrowserError, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE, COOKIE, ORIGIN, REFERER, SET_COOKIE, USER_AGENT};
use std::time::Duration;

/// Location switch request.
///
/// Sent as `PUT` with body `{"storeId": "<id>"}` and the anti-forgery header.
#[derive(Debug, Clone)]
pub struct SwitchRequest {
    pub url: String,
    pub header_name: String,
    pub token: String,
    pub store_id: String,
    pub cookies: Vec<SessionCookie>,
}

impl SwitchRequest {
    /// JSON body with the store id encoded as a string.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({ "storeId": self.store_id })
    }
}

/// Status and cookies returned by a switch request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchResponse {
    pub status: u16,
    /// `Set-Cookie` values; the new location only exists in these until they
    /// are installed in the browser session
    pub cookies: Vec<SessionCookie>,
}

impl SwitchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Capability that issues privileged requests with the session's credentials.
#[async_trait::async_trait]
pub trait PrivilegedClient: Send + Sync {
    /// Send the switch request.
    async fn send_switch(&self, request: &SwitchRequest) -> Result<SwitchResponse>;
}

/// `scheme://host[:port]` of `url`.
pub fn request_origin(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL: {}", e)))?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return Err(BrowserError::NavigationError(format!("No origin for {url}")));
    }
    Ok(origin.ascii_serialization())
}

/// Name and value of one `Set-Cookie` header; attributes are dropped.
pub fn parse_set_cookie(header: &str) -> Option<SessionCookie> {
    let pair = header.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(SessionCookie {
        name: name.to_string(),
        value: value.trim().to_string(),
    })
}

/// reqwest-backed privileged client that replays the browser session cookies.
pub struct HttpPrivilegedClient {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpPrivilegedClient {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrowserError::Http(format!("build client: {e}")))?;
        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }
}

#[async_trait::async_trait]
impl PrivilegedClient for HttpPrivilegedClient {
    async fn send_switch(&self, request: &SwitchRequest) -> Result<SwitchResponse> {
        let origin = request_origin(&request.url)?;

        let response = self
            .client
            .put(&request.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json, text/plain, */*")
            .header("x-requested-with", "XMLHttpRequest")
            .header(USER_AGENT, &self.user_agent)
            .header(ORIGIN, &origin)
            .header(REFERER, format!("{origin}/"))
            .header(COOKIE, cookie_header(&request.cookies))
            .header(request.header_name.as_str(), &request.token)
            .json(&request.body())
            .send()
            .await?;

        let status = response.status().as_u16();
        let cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(parse_set_cookie)
            .collect::<Vec<_>>();
        tracing::debug!(
            "Switch request to {} returned HTTP {} with {} cookies",
            request.url,
            status,
            cookies.len()
        );
        Ok(SwitchResponse { status, cookies })
    }
}
