//! Configuration types for the forge clients and the webhook router.

use crate::errors::{ForgeError, ForgeErrorKind, ForgeResult};
use crate::resilience::RetryPolicy;
use crate::types::Provider;
use std::time::Duration;
use url::Url;

/// Default GitHub API base URL.
pub const DEFAULT_GITHUB_URL: &str = "https://api.github.com/";

/// Default GitLab API base URL.
pub const DEFAULT_GITLAB_URL: &str = "https://gitlab.com/api/v4/";

/// Default Bitbucket API base URL.
pub const DEFAULT_BITBUCKET_URL: &str = "https://bitbucket.org/api/2.0/";

/// Environment variable holding the webhook callback base URL.
pub const WEBHOOK_BASE_URL_VAR: &str = "WEBHOOK_BASE_URL";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default User-Agent header.
pub const DEFAULT_USER_AGENT: &str = "integrations-forges/0.1.0";

/// Default upper bound on pages fetched by one iterator.
pub const DEFAULT_MAX_PAGES: u32 = 1_000;

/// Default page size for page-number pagination.
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Pagination limits.
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// Maximum pages one iterator may fetch before failing.
    pub max_pages: u32,
    /// Page size requested from providers that paginate by page number.
    pub per_page: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

/// Forge integration configuration.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Base URL that provider webhooks call back into.
    pub webhook_base_url: Url,
    /// GitHub API base URL.
    pub github_url: Url,
    /// GitLab API base URL.
    pub gitlab_url: Url,
    /// Bitbucket API base URL.
    pub bitbucket_url: Url,
    /// Request timeout.
    pub timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// User-Agent header.
    pub user_agent: String,
    /// Retry policy applied to page fetches. Disabled unless set.
    pub retry: RetryPolicy,
    /// Pagination limits.
    pub pagination: PaginationConfig,
}

impl ForgeConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ForgeConfigBuilder {
        ForgeConfigBuilder::new()
    }

    /// Builds a configuration from `WEBHOOK_BASE_URL` and the optional
    /// `GITHUB_API_URL`, `GITLAB_API_URL` and `BITBUCKET_API_URL` variables.
    pub fn from_env() -> ForgeResult<Self> {
        let base = std::env::var(WEBHOOK_BASE_URL_VAR).map_err(|_| {
            ForgeError::configuration(format!(
                "Please specify the {} Environment Variable!",
                WEBHOOK_BASE_URL_VAR
            ))
        })?;

        let mut builder = Self::builder().webhook_base_url(base);
        if let Ok(url) = std::env::var("GITHUB_API_URL") {
            builder = builder.provider_url(Provider::GitHub, url);
        }
        if let Ok(url) = std::env::var("GITLAB_API_URL") {
            builder = builder.provider_url(Provider::GitLab, url);
        }
        if let Ok(url) = std::env::var("BITBUCKET_API_URL") {
            builder = builder.provider_url(Provider::Bitbucket, url);
        }
        builder.build()
    }

    /// Gets the API base URL for a provider.
    pub fn base_url(&self, provider: Provider) -> &Url {
        match provider {
            Provider::GitHub => &self.github_url,
            Provider::GitLab => &self.gitlab_url,
            Provider::Bitbucket => &self.bitbucket_url,
        }
    }

    /// Builds the callback URL a provider should deliver webhooks to:
    /// `{webhook_base_url}/{provider}/{repo_full_name}`.
    pub fn webhook_target(&self, provider: Provider, repo_full_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.webhook_base_url.as_str().trim_end_matches('/'),
            provider.name(),
            repo_full_name
        )
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ForgeResult<()> {
        for provider in Provider::ALL {
            let url = self.base_url(provider);
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ForgeError::configuration(format!(
                    "{} base URL must use http or https",
                    provider.name()
                )));
            }
            if !url.path().ends_with('/') {
                return Err(ForgeError::configuration(format!(
                    "{} base URL must end with '/'",
                    provider.name()
                )));
            }
        }

        if self.user_agent.is_empty() {
            return Err(ForgeError::configuration("User-Agent is required"));
        }

        if self.pagination.max_pages == 0 || self.pagination.per_page == 0 {
            return Err(ForgeError::configuration(
                "Pagination limits must be greater than zero",
            ));
        }

        Ok(())
    }
}

/// Builder for ForgeConfig.
#[derive(Debug, Default)]
pub struct ForgeConfigBuilder {
    webhook_base_url: Option<String>,
    github_url: Option<String>,
    gitlab_url: Option<String>,
    bitbucket_url: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: Option<String>,
    retry: Option<RetryPolicy>,
    pagination: Option<PaginationConfig>,
}

impl ForgeConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the webhook callback base URL.
    pub fn webhook_base_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_base_url = Some(url.into());
        self
    }

    /// Overrides the API base URL of one provider (self-hosted instances).
    pub fn provider_url(mut self, provider: Provider, url: impl Into<String>) -> Self {
        let url = Some(url.into());
        match provider {
            Provider::GitHub => self.github_url = url,
            Provider::GitLab => self.gitlab_url = url,
            Provider::Bitbucket => self.bitbucket_url = url,
        }
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the User-Agent header.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the retry policy used when fetching pages.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Sets the pagination limits.
    pub fn pagination(mut self, config: PaginationConfig) -> Self {
        self.pagination = Some(config);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ForgeResult<ForgeConfig> {
        let webhook_base_url = self.webhook_base_url.ok_or_else(|| {
            ForgeError::configuration("Webhook base URL is required")
        })?;

        let config = ForgeConfig {
            webhook_base_url: parse_url("webhook base", &webhook_base_url)?,
            github_url: parse_base(self.github_url, Provider::GitHub)?,
            gitlab_url: parse_base(self.gitlab_url, Provider::GitLab)?,
            bitbucket_url: parse_base(self.bitbucket_url, Provider::Bitbucket)?,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            user_agent: self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            retry: self.retry.unwrap_or_else(RetryPolicy::disabled),
            pagination: self.pagination.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}

fn parse_base(value: Option<String>, provider: Provider) -> ForgeResult<Url> {
    match value {
        // Url::join drops the last segment of a base without a trailing slash.
        Some(url) if !url.ends_with('/') => parse_url("provider", &format!("{}/", url)),
        Some(url) => parse_url("provider", &url),
        None => parse_url("provider", provider.default_base_url()),
    }
}

fn parse_url(what: &str, value: &str) -> ForgeResult<Url> {
    Url::parse(value).map_err(|e| {
        ForgeError::new(
            ForgeErrorKind::InvalidConfiguration,
            format!("Invalid {} URL '{}': {}", what, value, e),
        )
        .with_cause(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_provider_urls() {
        let config = ForgeConfig::builder()
            .webhook_base_url("https://self-xdsd.com")
            .build()
            .unwrap();

        assert_eq!(config.base_url(Provider::GitHub).as_str(), DEFAULT_GITHUB_URL);
        assert_eq!(config.base_url(Provider::GitLab).as_str(), DEFAULT_GITLAB_URL);
        assert_eq!(
            config.base_url(Provider::Bitbucket).as_str(),
            DEFAULT_BITBUCKET_URL
        );
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(!config.retry.enabled);
    }

    #[test]
    fn test_self_hosted_url_gets_trailing_slash() {
        let config = ForgeConfig::builder()
            .webhook_base_url("https://self-xdsd.com")
            .provider_url(Provider::GitLab, "https://gitlab.example.com/api/v4")
            .build()
            .unwrap();

        assert_eq!(
            config.base_url(Provider::GitLab).as_str(),
            "https://gitlab.example.com/api/v4/"
        );
    }

    #[test]
    fn test_webhook_target() {
        let config = ForgeConfig::builder()
            .webhook_base_url("https://self-xdsd.com/")
            .build()
            .unwrap();

        assert_eq!(
            config.webhook_target(Provider::GitLab, "amihaiemil/docker-java-api"),
            "https://self-xdsd.com/gitlab/amihaiemil/docker-java-api"
        );
    }

    #[test]
    fn test_missing_webhook_base_url() {
        let result = ForgeConfig::builder().build();
        assert_eq!(
            result.unwrap_err().kind(),
            ForgeErrorKind::InvalidConfiguration
        );
    }

    #[test]
    fn test_invalid_provider_url() {
        let result = ForgeConfig::builder()
            .webhook_base_url("https://self-xdsd.com")
            .provider_url(Provider::GitHub, "ftp://github.example.com/")
            .build();

        assert!(result.is_err());
    }
}
