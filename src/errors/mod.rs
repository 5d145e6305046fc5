//! Error types for the forge integration core.

use std::fmt;
use thiserror::Error;

/// Result type alias for forge operations.
pub type ForgeResult<T> = Result<T, ForgeError>;

/// Error kinds for categorizing forge errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForgeErrorKind {
    // Configuration errors
    /// Invalid configuration.
    InvalidConfiguration,
    /// Invalid parameter passed by the caller.
    InvalidParameter,

    // Authentication errors
    /// Unauthenticated caller or webhook secret mismatch.
    Authentication,

    // Response errors
    /// The provider answered with a status other than the one required.
    UnexpectedStatus,
    /// Provider JSON is missing an expected key.
    MalformedResponse,
    /// The provider broke a protocol invariant (e.g. a looping page link).
    ProtocolViolation,

    // Network errors
    /// Connection, request or body parsing failure below the HTTP semantics layer.
    Transport,
    /// Request timeout.
    Timeout,

    // Webhook errors
    /// Inbound webhook payload could not be parsed.
    PayloadParseError,
    /// No project is registered under the webhook's key.
    ProjectNotFound,

    // Capability errors
    /// Operation declared by the contract but not supported by the provider.
    NotImplemented,
}

impl fmt::Display for ForgeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration => write!(f, "invalid_configuration"),
            Self::InvalidParameter => write!(f, "invalid_parameter"),
            Self::Authentication => write!(f, "authentication"),
            Self::UnexpectedStatus => write!(f, "unexpected_status"),
            Self::MalformedResponse => write!(f, "malformed_response"),
            Self::ProtocolViolation => write!(f, "protocol_violation"),
            Self::Transport => write!(f, "transport"),
            Self::Timeout => write!(f, "timeout"),
            Self::PayloadParseError => write!(f, "payload_parse_error"),
            Self::ProjectNotFound => write!(f, "project_not_found"),
            Self::NotImplemented => write!(f, "not_implemented"),
        }
    }
}

/// Forge error with detailed information.
#[derive(Error, Debug)]
pub struct ForgeError {
    /// Error kind.
    kind: ForgeErrorKind,
    /// Error message.
    message: String,
    /// HTTP status code received, if any.
    status_code: Option<u16>,
    /// HTTP status code that was required, if any.
    expected_status: Option<u16>,
    /// Endpoint the error relates to.
    endpoint: Option<String>,
    /// Underlying cause.
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for ForgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(ref endpoint) = self.endpoint {
            write!(f, " [endpoint: {}]", endpoint)?;
        }
        Ok(())
    }
}

impl ForgeError {
    /// Creates a new forge error.
    pub fn new(kind: ForgeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            expected_status: None,
            endpoint: None,
            cause: None,
        }
    }

    /// Sets the HTTP status code.
    pub fn with_status(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Sets the expected HTTP status code.
    pub fn with_expected_status(mut self, code: u16) -> Self {
        self.expected_status = Some(code);
        self
    }

    /// Sets the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Gets the error kind.
    pub fn kind(&self) -> ForgeErrorKind {
        self.kind
    }

    /// Gets the bare error message, without kind or endpoint decoration.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Gets the HTTP status code.
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Gets the expected HTTP status code.
    pub fn expected_status(&self) -> Option<u16> {
        self.expected_status
    }

    /// Gets the endpoint.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Returns true if this error is eligible for a caller-controlled retry.
    ///
    /// Only failures below the HTTP semantics layer qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ForgeErrorKind::Transport | ForgeErrorKind::Timeout)
    }

    // Convenience constructors

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ForgeErrorKind::InvalidConfiguration, message)
    }

    /// Creates an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ForgeErrorKind::InvalidParameter, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ForgeErrorKind::Authentication, message)
    }

    /// Creates the error raised when no access token is available.
    pub fn unauthenticated() -> Self {
        Self::authentication("Current User is not authenticated.")
    }

    /// Creates an unexpected status error.
    ///
    /// `what` describes the failed operation, e.g.
    /// "fetch Bitbucket organizations for current User".
    pub fn unexpected_status(what: &str, expected: u16, actual: u16) -> Self {
        Self::new(
            ForgeErrorKind::UnexpectedStatus,
            format!(
                "Unable to {}. Expected {} {}, but got: {}",
                what,
                expected,
                status_reason(expected),
                actual
            ),
        )
        .with_status(actual)
        .with_expected_status(expected)
    }

    /// Creates a malformed response error naming the missing key.
    pub fn malformed(key: &str, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self::new(
            ForgeErrorKind::MalformedResponse,
            format!("Missing or invalid key '{}' in response from {}", key, endpoint),
        )
        .with_endpoint(endpoint)
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ForgeErrorKind::Transport, message)
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ForgeErrorKind::Timeout, message)
    }

    /// Creates a protocol violation error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ForgeErrorKind::ProtocolViolation, message)
    }

    /// Creates a webhook payload parse error.
    pub fn payload(message: impl Into<String>) -> Self {
        Self::new(ForgeErrorKind::PayloadParseError, message)
    }

    /// Creates a project not found error.
    pub fn project_not_found(repo_full_name: &str, provider: &str) -> Self {
        Self::new(
            ForgeErrorKind::ProjectNotFound,
            format!("Project {} at {} is not registered.", repo_full_name, provider),
        )
    }

    /// Creates a not implemented error.
    pub fn not_implemented(operation: &str) -> Self {
        Self::new(
            ForgeErrorKind::NotImplemented,
            format!("{} is not yet implemented.", operation),
        )
    }
}

/// Reason phrase for the statuses the core requires.
fn status_reason(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "CREATED",
        204 => "NO CONTENT",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ForgeError::malformed("uuid", "https://bitbucket.org/api/2.0/workspaces");

        let display = format!("{}", error);
        assert!(display.contains("malformed_response"));
        assert!(display.contains("'uuid'"));
        assert!(display.contains("[endpoint: https://bitbucket.org/api/2.0/workspaces]"));
    }

    #[test]
    fn test_unexpected_status_message() {
        let error = ForgeError::unexpected_status(
            "fetch Bitbucket organizations for current User",
            200,
            500,
        );

        assert_eq!(
            error.message(),
            "Unable to fetch Bitbucket organizations for current User. \
             Expected 200 OK, but got: 500"
        );
        assert_eq!(error.status_code(), Some(500));
        assert_eq!(error.expected_status(), Some(200));
    }

    #[test]
    fn test_is_retryable() {
        assert!(ForgeError::timeout("timed out").is_retryable());
        assert!(ForgeError::transport("connection refused").is_retryable());
        assert!(!ForgeError::unauthenticated().is_retryable());
        assert!(!ForgeError::unexpected_status("x", 200, 503).is_retryable());
    }

    #[test]
    fn test_unauthenticated_message() {
        let error = ForgeError::unauthenticated();
        assert_eq!(error.kind(), ForgeErrorKind::Authentication);
        assert_eq!(error.message(), "Current User is not authenticated.");
    }
}
