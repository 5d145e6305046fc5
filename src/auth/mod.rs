//! Access tokens and the schemes providers expect them in.

use crate::types::Provider;
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};

/// How an access token is attached to an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// `Authorization: token <token>` (GitHub classic tokens).
    Token,
    /// `PRIVATE-TOKEN: <token>` (GitLab personal access tokens).
    PrivateToken,
    /// HTTP basic auth with the token as password (Bitbucket app passwords).
    Basic {
        /// Account username.
        username: String,
    },
    /// Token sent as a query parameter.
    Query {
        /// Query parameter name.
        param: String,
    },
}

/// A provider-tagged credential.
///
/// The secret is never logged and never serialized; use [`AccessToken::redacted`]
/// when a token has to show up in diagnostics.
#[derive(Debug, Clone)]
pub struct AccessToken {
    provider: Provider,
    scheme: AuthScheme,
    secret: SecretString,
}

impl AccessToken {
    /// Creates a token with an explicit scheme.
    pub fn new(provider: Provider, scheme: AuthScheme, secret: impl Into<String>) -> Self {
        Self {
            provider,
            scheme,
            secret: SecretString::new(secret.into()),
        }
    }

    /// Creates a GitHub token, sent as `Authorization: token ...`.
    pub fn github(secret: impl Into<String>) -> Self {
        Self::new(Provider::GitHub, AuthScheme::Token, secret)
    }

    /// Creates a GitLab OAuth token, sent as a bearer token.
    pub fn gitlab(secret: impl Into<String>) -> Self {
        Self::new(Provider::GitLab, AuthScheme::Bearer, secret)
    }

    /// Creates a Bitbucket OAuth token, sent as a bearer token.
    pub fn bitbucket(secret: impl Into<String>) -> Self {
        Self::new(Provider::Bitbucket, AuthScheme::Bearer, secret)
    }

    /// Replaces the scheme, e.g. for GitLab personal access tokens.
    pub fn with_scheme(mut self, scheme: AuthScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Gets the provider this token belongs to.
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Gets the scheme.
    pub fn scheme(&self) -> &AuthScheme {
        &self.scheme
    }

    /// Attaches the token to a request.
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        let secret = self.secret.expose_secret();
        match &self.scheme {
            AuthScheme::Bearer => request.bearer_auth(secret),
            AuthScheme::Token => {
                request.header(reqwest::header::AUTHORIZATION, format!("token {}", secret))
            }
            AuthScheme::PrivateToken => request.header("PRIVATE-TOKEN", secret),
            AuthScheme::Basic { username } => request.basic_auth(username, Some(secret)),
            AuthScheme::Query { param } => request.query(&[(param.as_str(), secret.as_str())]),
        }
    }

    /// Gets a redacted rendering safe for logs.
    pub fn redacted(&self) -> String {
        let exposed = self.secret.expose_secret();
        let prefix = ["ghp_", "github_pat_", "gho_", "glpat-"]
            .into_iter()
            .find(|p| exposed.starts_with(p))
            .unwrap_or("");
        format!("{}:{}***", self.provider.name(), prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(token: &AccessToken, name: &str) -> Option<String> {
        let request = token
            .apply(reqwest::Client::new().get("https://example.com/api/"))
            .build()
            .unwrap();
        request
            .headers()
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[test]
    fn test_github_token_scheme() {
        let token = AccessToken::github("ghp_abc");
        assert_eq!(header(&token, "authorization").as_deref(), Some("token ghp_abc"));
    }

    #[test]
    fn test_bearer_scheme() {
        let token = AccessToken::bitbucket("bb123");
        assert_eq!(header(&token, "authorization").as_deref(), Some("Bearer bb123"));
    }

    #[test]
    fn test_private_token_scheme() {
        let token = AccessToken::gitlab("glpat-xyz").with_scheme(AuthScheme::PrivateToken);
        assert_eq!(header(&token, "private-token").as_deref(), Some("glpat-xyz"));
        assert!(header(&token, "authorization").is_none());
    }

    #[test]
    fn test_query_scheme() {
        let token = AccessToken::gitlab("q-secret").with_scheme(AuthScheme::Query {
            param: "access_token".to_string(),
        });
        let request = token
            .apply(reqwest::Client::new().get("https://example.com/api/"))
            .build()
            .unwrap();
        assert_eq!(request.url().query(), Some("access_token=q-secret"));
    }

    #[test]
    fn test_redacted_never_contains_secret() {
        let token = AccessToken::github("ghp_supersecret");
        let redacted = token.redacted();
        assert_eq!(redacted, "github:ghp_***");
        assert!(!format!("{:?}", token).contains("supersecret"));
    }
}
