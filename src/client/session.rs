//! The authenticated session wrapping the blocking HTTP transport
//!
//! One session is created per workflow invocation and reused for every API
//! call that invocation issues. The session attaches the product User-Agent
//! and a bearer token to each request and translates every transport-level
//! failure into [`GcpError::Transport`]. Non-2xx statuses are returned as
//! data; callers opt into failure via [`ApiResponse::raise_for_status`].

use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::auth::Credential;
use crate::errors::{GcpError, Result};

/// Prefix of the User-Agent attached to every call; the product tag is
/// appended per session.
const USER_AGENT_PREFIX: &str = "Google-Ansible-MM";

/// A raw API response: status, headers, and unparsed body.
///
/// Returned by all four verbs without any status interpretation, so callers
/// can treat expected non-2xx outcomes (a 404 probe, say) as data.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// The explicit status check: fails with [`GcpError::Api`] when the
    /// response indicates failure. Never invoked implicitly by the session.
    pub fn raise_for_status(&self) -> Result<&Self> {
        if self.status >= 400 {
            return Err(GcpError::Api {
                status: self.status,
                body: self.body.clone(),
            });
        }
        Ok(self)
    }
}

/// Issues authenticated GET/POST/PUT/DELETE calls for one workflow
/// invocation.
#[derive(Debug)]
pub struct AuthenticatedSession {
    client: Client,
    credential: Credential,
    product: String,
}

impl AuthenticatedSession {
    /// Build a session around a resolved credential and a product tag.
    pub fn new(credential: Credential, product: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| GcpError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            credential,
            product: product.into(),
        })
    }

    pub fn get(&self, url: &str, body: Option<&Value>) -> Result<ApiResponse> {
        self.request(Method::GET, url, body)
    }

    pub fn post(&self, url: &str, body: Option<&Value>) -> Result<ApiResponse> {
        self.request(Method::POST, url, body)
    }

    pub fn put(&self, url: &str, body: Option<&Value>) -> Result<ApiResponse> {
        self.request(Method::PUT, url, body)
    }

    pub fn delete(&self, url: &str, body: Option<&Value>) -> Result<ApiResponse> {
        self.request(Method::DELETE, url, body)
    }

    fn request(&self, method: Method, url: &str, body: Option<&Value>) -> Result<ApiResponse> {
        let url = Url::parse(url).map_err(|e| GcpError::Transport(format!("invalid URL: {e}")))?;
        let token = self.credential.access_token(&self.client)?;

        debug!(method = %method, url = %url, "issuing API request");
        let mut request = self
            .client
            .request(method, url)
            .header("User-Agent", self.user_agent())
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .map_err(|e| GcpError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .text()
            .map_err(|e| GcpError::Transport(e.to_string()))?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    fn user_agent(&self) -> String {
        format!("{USER_AGENT_PREFIX}-{}", self.product)
    }
}
