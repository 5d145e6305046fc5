//! Provider-side webhook registration.

use crate::client::JsonResources;
use crate::config::ForgeConfig;
use crate::errors::{ForgeError, ForgeResult};
use crate::observability::TracingHooks;
use crate::pagination::PageIterator;
use crate::projects::Project;
use crate::providers::repo_path;
use crate::types::{Projection, Provider, Webhook};
use secrecy::ExposeSecret;
use std::sync::Arc;
use url::Url;

/// Outcome of [`Webhooks::ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookRegistration {
    /// A hook already delivers to the project's callback URL; nothing was posted.
    AlreadyPresent,
    /// The provider created a new hook.
    Added,
    /// The provider refused to create the hook.
    Rejected,
}

impl WebhookRegistration {
    /// Returns true if a hook targets the callback URL after the call.
    pub fn is_registered(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Webhooks of one repository.
pub struct Webhooks {
    provider: Provider,
    resources: Arc<dyn JsonResources>,
    config: ForgeConfig,
    repo_full_name: String,
    hooks_uri: Url,
}

impl std::fmt::Debug for Webhooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Webhooks")
            .field("provider", &self.provider)
            .field("repo_full_name", &self.repo_full_name)
            .field("hooks_uri", &self.hooks_uri.as_str())
            .finish()
    }
}

impl Webhooks {
    /// Creates the webhook manager for `repo_full_name`.
    pub fn new(
        provider: Provider,
        resources: Arc<dyn JsonResources>,
        config: ForgeConfig,
        repo_full_name: &str,
    ) -> ForgeResult<Self> {
        let path = provider.hooks_path(repo_path(repo_full_name)?);
        let hooks_uri = config.base_url(provider).join(&path).map_err(|e| {
            ForgeError::invalid_parameter(format!("Invalid hooks path '{}': {}", path, e))
        })?;

        Ok(Self {
            provider,
            resources,
            config,
            repo_full_name: repo_full_name.to_string(),
            hooks_uri,
        })
    }

    /// Gets the URL hooks are registered at.
    pub fn hooks_uri(&self) -> &Url {
        &self.hooks_uri
    }

    /// Gets the URL the provider should deliver this repository's events to.
    pub fn target(&self) -> String {
        self.config.webhook_target(self.provider, &self.repo_full_name)
    }

    /// Registers a hook delivering to [`Webhooks::target`], carrying the
    /// project's current secret.
    ///
    /// Returns true only when the provider answers 201 Created. Any other
    /// status is logged and reported as false. Not retried; use
    /// [`Webhooks::ensure`] when the call may be repeated.
    ///
    /// Fails with `InvalidParameter`, without posting anything, when the
    /// project belongs to another repository or provider.
    pub async fn add(&self, project: &Project) -> ForgeResult<bool> {
        self.check_project(project)?;
        let secret = project.webhook_secret();
        let payload =
            self.provider
                .hook_payload(&self.repo_full_name, &self.target(), secret.expose_secret());

        let resource = self.resources.post(&self.hooks_uri, &payload).await?;
        if resource.status_code() == 201 {
            tracing::info!(
                provider = %self.provider,
                repo = %self.repo_full_name,
                "Webhook registered"
            );
            Ok(true)
        } else {
            TracingHooks::on_webhook_rejected(
                self.provider,
                &self.repo_full_name,
                resource.status_code(),
            );
            Ok(false)
        }
    }

    /// Enumerates registered hooks.
    pub fn iter(&self) -> PageIterator<Webhook> {
        let provider = self.provider;
        PageIterator::new(
            Arc::clone(&self.resources),
            self.hooks_uri.clone(),
            provider.page_strategy(self.config.pagination.per_page),
            format!(
                "fetch {} webhooks of {}",
                provider.label(),
                self.repo_full_name
            ),
            move |json, uri: &Url| Ok(Webhook::project(provider, json, uri.as_str())),
        )
        .with_max_pages(self.config.pagination.max_pages)
        .with_retry(self.config.retry.clone())
    }

    /// Registers the project's hook unless one already delivers to the
    /// callback URL.
    pub async fn ensure(&self, project: &Project) -> ForgeResult<WebhookRegistration> {
        self.check_project(project)?;
        let target = self.target();
        let mut hooks = self.iter();
        while let Some(hook) = hooks.next().await? {
            if hook.url()? == target {
                tracing::debug!(
                    provider = %self.provider,
                    repo = %self.repo_full_name,
                    "Webhook already registered"
                );
                return Ok(WebhookRegistration::AlreadyPresent);
            }
        }

        if self.add(project).await? {
            Ok(WebhookRegistration::Added)
        } else {
            Ok(WebhookRegistration::Rejected)
        }
    }

    fn check_project(&self, project: &Project) -> ForgeResult<()> {
        if project.provider() != self.provider || project.repo_full_name() != self.repo_full_name {
            return Err(ForgeError::invalid_parameter(format!(
                "Project {} cannot register webhooks of {} repo {}",
                project.key(),
                self.provider.label(),
                self.repo_full_name
            )));
        }
        Ok(())
    }

    /// Removes the project's hook. Not supported by any provider yet.
    pub async fn remove(&self) -> ForgeResult<bool> {
        Err(ForgeError::not_implemented(&format!(
            "Removing {} webhooks",
            self.provider.label()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ForgeErrorKind;
    use crate::mocks::{MockJsonResources, MockResponse, NoopProjectManager};
    use crate::projects::ProjectKey;
    use serde_json::json;

    fn config() -> ForgeConfig {
        ForgeConfig::builder()
            .webhook_base_url("https://self-xdsd.com")
            .build()
            .unwrap()
    }

    fn project(repo: &str, provider: Provider) -> Project {
        Project::new(
            ProjectKey::new(repo, provider),
            "john",
            "s3cr3t",
            Arc::new(NoopProjectManager),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_gitlab_add_posts_token_and_target() {
        let mock = MockJsonResources::new();
        mock.on_post(
            "/api/v4/projects/john%2Ftest/hooks",
            MockResponse::created(json!({ "id": 1 })),
        );
        let hooks = Webhooks::new(Provider::GitLab, Arc::new(mock.clone()), config(), "john/test")
            .unwrap();

        assert!(hooks.add(&project("john/test", Provider::GitLab)).await.unwrap());
        let body = mock.requests()[0].body.clone().unwrap();
        assert_eq!(body["url"], "https://self-xdsd.com/gitlab/john/test");
        assert_eq!(body["token"], "s3cr3t");
        assert_eq!(body["id"], "john%2Ftest");
    }

    #[tokio::test]
    async fn test_add_returns_false_unless_created() {
        let mock = MockJsonResources::new();
        mock.on_post("/repos/john/test/hooks", MockResponse::status(422));
        let hooks = Webhooks::new(Provider::GitHub, Arc::new(mock), config(), "john/test").unwrap();

        assert!(!hooks.add(&project("john/test", Provider::GitHub)).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_propagates_transport_errors() {
        let mock = MockJsonResources::new();
        mock.on_post("/repos/john/test/hooks", MockResponse::transport_error("refused"));
        let hooks = Webhooks::new(Provider::GitHub, Arc::new(mock), config(), "john/test").unwrap();

        let err = hooks.add(&project("john/test", Provider::GitHub)).await.unwrap_err();
        assert_eq!(err.kind(), ForgeErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_add_rejects_other_project() {
        let mock = MockJsonResources::new();
        mock.on_post("/repos/john/test/hooks", MockResponse::created(json!({ "id": 1 })));
        let hooks =
            Webhooks::new(Provider::GitHub, Arc::new(mock.clone()), config(), "john/test").unwrap();

        for other in [
            project("john/other", Provider::GitHub),
            project("john/test", Provider::GitLab),
        ] {
            let err = hooks.add(&other).await.unwrap_err();
            assert_eq!(err.kind(), ForgeErrorKind::InvalidParameter);
        }
        let err = hooks.ensure(&project("john/other", Provider::GitHub)).await.unwrap_err();
        assert_eq!(err.kind(), ForgeErrorKind::InvalidParameter);
        assert_eq!(mock.request_count(), 0);
    }

    #[tokio::test]
    async fn test_ensure_skips_existing_hook() {
        let mock = MockJsonResources::new();
        mock.on_get(
            "/repos/john/test/hooks",
            MockResponse::ok(json!([
                { "id": 1, "config": { "url": "https://ci.example.com/hook" } },
                { "id": 2, "config": { "url": "https://self-xdsd.com/github/john/test" } }
            ])),
        );
        let hooks =
            Webhooks::new(Provider::GitHub, Arc::new(mock.clone()), config(), "john/test").unwrap();

        let outcome = hooks.ensure(&project("john/test", Provider::GitHub)).await.unwrap();
        assert_eq!(outcome, WebhookRegistration::AlreadyPresent);
        assert_eq!(mock.count(reqwest::Method::POST), 0);
    }

    #[tokio::test]
    async fn test_ensure_adds_missing_hook() {
        let mock = MockJsonResources::new();
        mock.on_get("/api/2.0/repositories/john/test/hooks", MockResponse::ok(json!({ "values": [] })));
        mock.on_post(
            "/api/2.0/repositories/john/test/hooks",
            MockResponse::created(json!({ "uuid": "{h1}" })),
        );
        let hooks =
            Webhooks::new(Provider::Bitbucket, Arc::new(mock.clone()), config(), "john/test")
                .unwrap();

        let outcome = hooks.ensure(&project("john/test", Provider::Bitbucket)).await.unwrap();
        assert_eq!(outcome, WebhookRegistration::Added);
        assert_eq!(mock.count(reqwest::Method::POST), 1);
    }

    #[tokio::test]
    async fn test_remove_is_not_implemented() {
        let hooks = Webhooks::new(
            Provider::GitHub,
            Arc::new(MockJsonResources::new()),
            config(),
            "john/test",
        )
        .unwrap();

        let err = hooks.remove().await.unwrap_err();
        assert_eq!(err.kind(), ForgeErrorKind::NotImplemented);
    }
}
