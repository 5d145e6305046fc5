//! Structured logging hooks.

use crate::client::RateLimitInfo;
use crate::errors::ForgeError;
use crate::events::{Classification, EventType};
use crate::types::Provider;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Tracing hooks for provider calls and inbound webhooks.
pub struct TracingHooks;

impl TracingHooks {
    /// Logs the start of a provider request.
    #[instrument(skip(method, url))]
    pub fn on_request_start(method: &str, url: &str) {
        debug!(
            method = %method,
            url = %url,
            "Provider request started"
        );
    }

    /// Logs the completion of a provider request, whatever the status.
    #[instrument(skip(method, url, status, duration))]
    pub fn on_request_complete(method: &str, url: &str, status: u16, duration: Duration) {
        info!(
            method = %method,
            url = %url,
            status = status,
            duration_ms = duration.as_millis() as u64,
            "Provider request completed"
        );
    }

    /// Logs a failure below HTTP semantics.
    #[instrument(skip(method, url, error))]
    pub fn on_transport_error(method: &str, url: &str, error: &ForgeError) {
        warn!(
            method = %method,
            url = %url,
            kind = %error.kind(),
            error = %error.message(),
            "Provider request failed"
        );
    }

    /// Logs rate limit info.
    #[instrument(skip(info))]
    pub fn on_rate_limit_update(info: &RateLimitInfo) {
        if info.is_exhausted() {
            warn!(
                limit = info.limit,
                reset_at = %info.reset_at,
                "Rate limit exhausted"
            );
        } else {
            debug!(
                limit = info.limit,
                remaining = info.remaining,
                reset_at = %info.reset_at,
                "Rate limit updated"
            );
        }
    }

    /// Logs a rejected webhook registration.
    #[instrument(skip(provider, repo, status))]
    pub fn on_webhook_rejected(provider: Provider, repo: &str, status: u16) {
        warn!(
            provider = %provider,
            repo = %repo,
            status = status,
            "Webhook registration rejected, expected 201 CREATED"
        );
    }

    /// Logs inbound webhook authentication.
    #[instrument(skip(provider, repo, success))]
    pub fn on_webhook_verified(provider: Provider, repo: &str, success: bool) {
        if success {
            debug!(
                provider = %provider,
                repo = %repo,
                "Webhook credential verified"
            );
        } else {
            warn!(
                provider = %provider,
                repo = %repo,
                "Webhook credential verification failed"
            );
        }
    }

    /// Logs the classification of an inbound webhook.
    #[instrument(skip(provider, repo, classification))]
    pub fn on_event_classified(provider: Provider, repo: &str, classification: &Classification) {
        match classification {
            Classification::Event(event_type) => info!(
                provider = %provider,
                repo = %repo,
                event_type = %event_type,
                "Webhook classified"
            ),
            Classification::Unresolved(rule) => info!(
                provider = %provider,
                repo = %repo,
                pending = ?rule,
                "Webhook shape recognized, no rule to apply"
            ),
            Classification::Ignored => debug!(
                provider = %provider,
                repo = %repo,
                "Webhook ignored"
            ),
        }
    }

    /// Logs a dispatched event.
    pub fn on_event_dispatched(provider: Provider, repo: &str, event_type: EventType) {
        debug!(
            provider = %provider,
            repo = %repo,
            event_type = %event_type,
            "Event dispatched to project manager"
        );
    }
}

/// Headers whose values must never reach logs or responses.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "private-token",
    "x-gitlab-token",
    "x-hub-signature",
    "x-hub-signature-256",
    "cookie",
    "set-cookie",
];

/// Redacts sensitive values in headers.
pub fn redact_header(name: &str, value: &str) -> String {
    if SENSITIVE_HEADERS.contains(&name.to_lowercase().as_str()) {
        "[REDACTED]".to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_header() {
        assert_eq!(redact_header("Authorization", "token ghp_abc"), "[REDACTED]");
        assert_eq!(redact_header("X-Gitlab-Token", "s3cr3t"), "[REDACTED]");
        assert_eq!(redact_header("X-Hub-Signature-256", "sha256=ab"), "[REDACTED]");
        assert_eq!(redact_header("Content-Type", "application/json"), "application/json");
    }
}
