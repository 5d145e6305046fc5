//! JSON resource access over HTTP.
//!
//! Every call returns a [`Resource`] carrying whatever status the server
//! sent. Non-2xx statuses are data for the caller to interpret; only
//! failures below HTTP semantics (connect, timeout, unreadable body) are
//! errors.

use crate::auth::AccessToken;
use crate::config::ForgeConfig;
use crate::errors::{ForgeError, ForgeResult};
use crate::observability::TracingHooks;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Instant;
use url::Url;

/// Rate limit information sent by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Maximum requests allowed.
    pub limit: u32,
    /// Remaining requests in current window.
    pub remaining: u32,
    /// Time when the rate limit resets.
    pub reset_at: DateTime<Utc>,
    /// Retry-After header value in seconds (if present).
    pub retry_after: Option<u64>,
}

impl RateLimitInfo {
    /// Extracts rate limit headers, accepting both the `x-ratelimit-*`
    /// (GitHub, Bitbucket) and `ratelimit-*` (GitLab) spellings.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let read = |name: &str| -> Option<i64> {
            headers
                .get(format!("x-{}", name))
                .or_else(|| headers.get(name))
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
        };

        let limit = u32::try_from(read("ratelimit-limit")?).ok()?;
        let remaining = u32::try_from(read("ratelimit-remaining")?).ok()?;
        let reset_at = DateTime::from_timestamp(read("ratelimit-reset")?, 0)?;
        let retry_after = headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Some(Self {
            limit,
            remaining,
            reset_at,
            retry_after,
        })
    }

    /// Returns true if no requests remain in the window.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Normalized response of one HTTP call.
#[derive(Debug, Clone)]
pub struct Resource {
    status: u16,
    body: Value,
    headers: HeaderMap,
    rate_limit: Option<RateLimitInfo>,
}

impl Resource {
    /// Creates a resource from a status and body.
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            headers: HeaderMap::new(),
            rate_limit: None,
        }
    }

    /// Attaches response headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.rate_limit = RateLimitInfo::from_headers(&headers);
        self.headers = headers;
        self
    }

    /// Gets the HTTP status code.
    pub fn status_code(&self) -> u16 {
        self.status
    }

    /// Gets the parsed body; `null` when the server sent none.
    pub fn json(&self) -> &Value {
        &self.body
    }

    /// Consumes the resource and returns the body.
    pub fn into_json(self) -> Value {
        self.body
    }

    /// Gets the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Gets a header as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Gets the rate limit snapshot, if the provider sent one.
    pub fn rate_limit(&self) -> Option<&RateLimitInfo> {
        self.rate_limit.as_ref()
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Authenticated JSON access to one provider.
#[async_trait]
pub trait JsonResources: Send + Sync {
    /// The access token calls are made with, if any.
    fn access_token(&self) -> Option<&AccessToken>;

    /// Makes a GET request.
    async fn get(&self, uri: &Url) -> ForgeResult<Resource>;

    /// Makes a POST request with a JSON body.
    async fn post(&self, uri: &Url, body: &Value) -> ForgeResult<Resource>;

    /// Makes a PATCH request with a JSON body.
    async fn patch(&self, uri: &Url, body: &Value) -> ForgeResult<Resource>;

    /// Makes a DELETE request.
    async fn delete(&self, uri: &Url) -> ForgeResult<Resource>;
}

/// [`JsonResources`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpJsonResources {
    http: Client,
    token: Option<AccessToken>,
    user_agent: String,
}

impl HttpJsonResources {
    /// Creates a client; `token` is `None` for anonymous access.
    pub fn new(config: &ForgeConfig, token: Option<AccessToken>) -> ForgeResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| {
                ForgeError::configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            token,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Returns a copy of this client authenticated with another token.
    pub fn with_token(&self, token: AccessToken) -> Self {
        Self {
            http: self.http.clone(),
            token: Some(token),
            user_agent: self.user_agent.clone(),
        }
    }

    async fn execute(&self, method: Method, uri: &Url, body: Option<&Value>) -> ForgeResult<Resource> {
        TracingHooks::on_request_start(method.as_str(), uri.as_str());
        let started = Instant::now();

        let mut request = self
            .http
            .request(method.clone(), uri.clone())
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json");

        if let Some(token) = &self.token {
            request = token.apply(request);
        }

        if let Some(json) = body {
            let bytes = serde_json::to_vec(json).map_err(|e| {
                ForgeError::invalid_parameter(format!("Failed to serialize request body: {}", e))
            })?;
            request = request.header(CONTENT_TYPE, "application/json").body(bytes);
        }

        // reqwest's message carries the full URL, which holds the token under
        // the query scheme.
        let response = request.send().await.map_err(|e| {
            let (timeout, connect) = (e.is_timeout(), e.is_connect());
            let e = e.without_url();
            let error = if timeout {
                ForgeError::timeout(format!("Request timed out: {}", e))
            } else if connect {
                ForgeError::transport(format!("Connection failed: {}", e))
            } else {
                ForgeError::transport(format!("Request failed: {}", e))
            };
            TracingHooks::on_transport_error(method.as_str(), uri.as_str(), &error);
            error.with_endpoint(uri.as_str())
        })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(|e| {
            let timeout = e.is_timeout();
            let e = e.without_url();
            let error = if timeout {
                ForgeError::timeout(format!("Timed out reading response body: {}", e))
            } else {
                ForgeError::transport(format!("Failed to read response body: {}", e))
            };
            TracingHooks::on_transport_error(method.as_str(), uri.as_str(), &error);
            error.with_endpoint(uri.as_str())
        })?;

        let json = parse_body(&bytes).map_err(|error| {
            TracingHooks::on_transport_error(method.as_str(), uri.as_str(), &error);
            error.with_status(status).with_endpoint(uri.as_str())
        })?;

        let resource = Resource::new(status, json).with_headers(headers);
        TracingHooks::on_request_complete(method.as_str(), uri.as_str(), status, started.elapsed());
        if let Some(info) = resource.rate_limit() {
            TracingHooks::on_rate_limit_update(info);
        }
        Ok(resource)
    }
}

#[async_trait]
impl JsonResources for HttpJsonResources {
    fn access_token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    async fn get(&self, uri: &Url) -> ForgeResult<Resource> {
        self.execute(Method::GET, uri, None).await
    }

    async fn post(&self, uri: &Url, body: &Value) -> ForgeResult<Resource> {
        self.execute(Method::POST, uri, Some(body)).await
    }

    async fn patch(&self, uri: &Url, body: &Value) -> ForgeResult<Resource> {
        self.execute(Method::PATCH, uri, Some(body)).await
    }

    async fn delete(&self, uri: &Url) -> ForgeResult<Resource> {
        self.execute(Method::DELETE, uri, None).await
    }
}

/// Parses a response body; an empty or whitespace-only body is `null`.
fn parse_body(bytes: &[u8]) -> ForgeResult<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(|e| {
        ForgeError::transport(format!("Malformed response body: {}", e)).with_cause(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ForgeErrorKind;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_parse_empty_body() {
        assert_eq!(parse_body(b"").unwrap(), Value::Null);
        assert_eq!(parse_body(b"  \n").unwrap(), Value::Null);
    }

    #[test]
    fn test_parse_malformed_body_is_transport_error() {
        let err = parse_body(b"<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.kind(), ForgeErrorKind::Transport);
    }

    #[test]
    fn test_parse_array_body() {
        assert_eq!(parse_body(br#"[{"uuid":"{123}"}]"#).unwrap(), json!([{ "uuid": "{123}" }]));
    }

    #[test]
    fn test_github_rate_limit_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-limit", HeaderValue::from_static("5000"));
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000000"));

        let resource = Resource::new(403, Value::Null).with_headers(headers);
        let info = resource.rate_limit().unwrap();
        assert_eq!(info.limit, 5000);
        assert!(info.is_exhausted());
    }

    #[test]
    fn test_gitlab_rate_limit_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("ratelimit-limit", HeaderValue::from_static("600"));
        headers.insert("ratelimit-remaining", HeaderValue::from_static("599"));
        headers.insert("ratelimit-reset", HeaderValue::from_static("1700000000"));
        headers.insert("retry-after", HeaderValue::from_static("30"));

        let info = RateLimitInfo::from_headers(&headers).unwrap();
        assert_eq!(info.remaining, 599);
        assert_eq!(info.retry_after, Some(30));
    }

    #[test]
    fn test_resource_success_range() {
        assert!(Resource::new(201, Value::Null).is_success());
        assert!(!Resource::new(404, Value::Null).is_success());
        assert!(!Resource::new(500, Value::Null).is_success());
    }
}
