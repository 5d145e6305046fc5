//! Transport-neutral webhook endpoint.
//!
//! Callbacks are served at `{webhook_base_url}/{provider}/{repo_full_name}`.
//! [`WebhookEndpoint::handle`] turns one delivery into a status code and a
//! short message; it never fails and never echoes secrets.

use super::{EventRouter, RouteOutcome};
use crate::errors::{ForgeError, ForgeErrorKind};
use crate::observability::redact_header;
use crate::types::Provider;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

/// One inbound delivery as received by an HTTP server.
#[derive(Clone)]
pub struct InboundWebhook {
    /// Provider path segment, e.g. `github`.
    pub provider: String,
    /// Repository full name from the remaining path segments.
    pub repo_full_name: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Raw request body.
    pub body: Bytes,
}

impl std::fmt::Debug for InboundWebhook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let headers: Vec<(&str, String)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                let value = value.to_str().unwrap_or("<binary>");
                (name.as_str(), redact_header(name.as_str(), value))
            })
            .collect();
        f.debug_struct("InboundWebhook")
            .field("provider", &self.provider)
            .field("repo_full_name", &self.repo_full_name)
            .field("headers", &headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl InboundWebhook {
    /// Creates a delivery.
    pub fn new(
        provider: impl Into<String>,
        repo_full_name: impl Into<String>,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            provider: provider.into(),
            repo_full_name: repo_full_name.into(),
            headers,
            body: body.into(),
        }
    }

    /// Creates a delivery from a callback path like `/gitlab/john/test`.
    ///
    /// Every segment after the provider belongs to the repository, so nested
    /// GitLab groups such as `/gitlab/group/sub/project` are kept whole.
    /// Returns `None` unless there is a provider followed by at least an owner
    /// and a repository, with no empty segment in between.
    pub fn from_path(path: &str, headers: HeaderMap, body: impl Into<Bytes>) -> Option<Self> {
        let (provider, repo_full_name) = path.trim_matches('/').split_once('/')?;
        let segments: Vec<&str> = repo_full_name.split('/').collect();
        if provider.is_empty() || segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(Self::new(provider, repo_full_name, headers, body))
    }
}

/// Reply to a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    /// HTTP status to answer with.
    pub status: StatusCode,
    /// Short plain-text message.
    pub message: String,
}

impl WebhookResponse {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Answers webhook deliveries using an [`EventRouter`].
#[derive(Debug, Clone)]
pub struct WebhookEndpoint {
    router: EventRouter,
}

impl WebhookEndpoint {
    /// Creates an endpoint.
    pub fn new(router: EventRouter) -> Self {
        Self { router }
    }

    /// Gets the router.
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Handles one delivery.
    pub async fn handle(&self, webhook: InboundWebhook) -> WebhookResponse {
        let provider: Provider = match webhook.provider.parse() {
            Ok(provider) => provider,
            Err(_) => {
                tracing::warn!(provider = %webhook.provider, "Webhook for unknown provider");
                return WebhookResponse::new(StatusCode::BAD_REQUEST, "Unknown provider");
            }
        };

        let outcome = self
            .router
            .route(
                provider,
                &webhook.repo_full_name,
                &webhook.headers,
                &webhook.body,
            )
            .await;

        match outcome {
            Ok(RouteOutcome::Dispatched(event_type)) => {
                WebhookResponse::new(StatusCode::OK, format!("Event {} dispatched", event_type))
            }
            Ok(RouteOutcome::Unresolved(_)) => {
                WebhookResponse::new(StatusCode::OK, "Event recognized, nothing to apply")
            }
            Ok(RouteOutcome::Ignored) => WebhookResponse::new(StatusCode::OK, "Event ignored"),
            Err(error) => {
                tracing::warn!(
                    provider = %provider,
                    repo = %webhook.repo_full_name,
                    kind = %error.kind(),
                    "Webhook delivery failed"
                );
                error_response(&error)
            }
        }
    }
}

fn error_response(error: &ForgeError) -> WebhookResponse {
    let status = match error.kind() {
        ForgeErrorKind::PayloadParseError | ForgeErrorKind::InvalidParameter => {
            StatusCode::BAD_REQUEST
        }
        ForgeErrorKind::Authentication => StatusCode::UNAUTHORIZED,
        ForgeErrorKind::ProjectNotFound => StatusCode::NOT_FOUND,
        ForgeErrorKind::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        ForgeErrorKind::UnexpectedStatus
        | ForgeErrorKind::MalformedResponse
        | ForgeErrorKind::ProtocolViolation => StatusCode::BAD_GATEWAY,
        ForgeErrorKind::Transport | ForgeErrorKind::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        ForgeErrorKind::InvalidConfiguration => StatusCode::INTERNAL_SERVER_ERROR,
    };

    // Authentication details stay in the logs.
    let message = match error.kind() {
        ForgeErrorKind::Authentication => "Webhook credential rejected".to_string(),
        _ => error.message().to_string(),
    };
    WebhookResponse::new(status, message)
}
