//! Provider adapters.
//!
//! One capability contract, [`ProviderApi`], implemented once per provider.
//! Everything that differs between providers (paths, field names, page
//! strategy, hook payloads) is data selected by [`Provider`].

pub mod bitbucket;
pub mod github;
pub mod gitlab;

pub use bitbucket::Bitbucket;
pub use github::GitHub;
pub use gitlab::GitLab;

use crate::client::JsonResources;
use crate::config::ForgeConfig;
use crate::errors::{ForgeError, ForgeResult};
use crate::pagination::{PageIterator, PageStrategy};
use crate::projects::Project;
use crate::types::{Comment, FieldMap, IssueRef, Organization, Projection, Provider, Repo};
use crate::webhooks::Webhooks;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Operations every provider supports.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// Gets the provider this adapter talks to.
    fn provider(&self) -> Provider;

    /// Organizations of the authenticated user.
    ///
    /// Fails immediately with an authentication error when no access token
    /// is available.
    fn organizations(&self) -> ForgeResult<PageIterator<Organization>>;

    /// Repositories of an organization.
    fn repos(&self, organization: &Organization) -> ForgeResult<PageIterator<Repo>>;

    /// Comments on an issue, oldest first.
    fn comments(&self, issue: &IssueRef) -> ForgeResult<PageIterator<Comment>>;

    /// Posts a comment on an issue; the provider must answer 201 Created.
    async fn post_comment(&self, issue: &IssueRef, body: &str) -> ForgeResult<Comment>;

    /// Webhook management for a repository.
    fn webhooks(&self, repo_full_name: &str) -> ForgeResult<Webhooks>;

    /// Registers the project's webhook. True only if the provider created it.
    async fn add_webhook(&self, project: &Project) -> ForgeResult<bool> {
        self.webhooks(project.repo_full_name())?.add(project).await
    }
}

impl Provider {
    /// Builds the adapter for this provider.
    pub fn adapter(
        &self,
        resources: Arc<dyn JsonResources>,
        config: &ForgeConfig,
    ) -> Arc<dyn ProviderApi> {
        let core = ProviderCore::new(*self, resources, config.clone());
        match self {
            Self::GitHub => Arc::new(GitHub::from_core(core)),
            Self::GitLab => Arc::new(GitLab::from_core(core)),
            Self::Bitbucket => Arc::new(Bitbucket::from_core(core)),
        }
    }

    /// Gets the public API base URL.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::GitHub => crate::config::DEFAULT_GITHUB_URL,
            Self::GitLab => crate::config::DEFAULT_GITLAB_URL,
            Self::Bitbucket => crate::config::DEFAULT_BITBUCKET_URL,
        }
    }

    /// Gets how collections are paginated.
    pub fn page_strategy(&self, per_page: u32) -> PageStrategy {
        match self {
            Self::GitHub => PageStrategy::LinkHeader,
            Self::GitLab => PageStrategy::PageNumber { per_page },
            Self::Bitbucket => PageStrategy::NextField,
        }
    }

    /// Gets where normalized fields live in this provider's JSON.
    pub(crate) fn fields(&self) -> &'static FieldMap {
        match self {
            Self::GitHub => &github::FIELDS,
            Self::GitLab => &gitlab::FIELDS,
            Self::Bitbucket => &bitbucket::FIELDS,
        }
    }

    /// Path of a repository's webhook collection, relative to the base URL.
    pub(crate) fn hooks_path(&self, repo_full_name: &str) -> String {
        match self {
            Self::GitHub => github::hooks_path(repo_full_name),
            Self::GitLab => gitlab::hooks_path(repo_full_name),
            Self::Bitbucket => bitbucket::hooks_path(repo_full_name),
        }
    }

    /// Body registering a webhook that delivers to `target`, signed with `secret`.
    pub(crate) fn hook_payload(&self, repo_full_name: &str, target: &str, secret: &str) -> Value {
        match self {
            Self::GitHub => github::hook_payload(target, secret),
            Self::GitLab => gitlab::hook_payload(repo_full_name, target, secret),
            Self::Bitbucket => bitbucket::hook_payload(target, secret),
        }
    }
}

/// State shared by every adapter.
#[derive(Clone)]
pub(crate) struct ProviderCore {
    provider: Provider,
    resources: Arc<dyn JsonResources>,
    config: ForgeConfig,
}

impl ProviderCore {
    pub(crate) fn new(
        provider: Provider,
        resources: Arc<dyn JsonResources>,
        config: ForgeConfig,
    ) -> Self {
        Self {
            provider,
            resources,
            config,
        }
    }

    pub(crate) fn provider(&self) -> Provider {
        self.provider
    }

    pub(crate) fn label(&self) -> &'static str {
        self.provider.label()
    }

    /// Resolves a path against the provider's base URL.
    pub(crate) fn uri(&self, path: &str) -> ForgeResult<Url> {
        self.config
            .base_url(self.provider)
            .join(path)
            .map_err(|e| {
                ForgeError::invalid_parameter(format!(
                    "Invalid {} path '{}': {}",
                    self.provider.label(),
                    path,
                    e
                ))
            })
    }

    /// Starts a lazy iteration over the collection at `path`.
    pub(crate) fn pages<T: Projection + 'static>(
        &self,
        path: &str,
        what: String,
    ) -> ForgeResult<PageIterator<T>> {
        let provider = self.provider;
        let pages = PageIterator::new(
            Arc::clone(&self.resources),
            self.uri(path)?,
            provider.page_strategy(self.config.pagination.per_page),
            what,
            move |json, uri: &Url| Ok(T::project(provider, json, uri.as_str())),
        )
        .with_max_pages(self.config.pagination.max_pages)
        .with_retry(self.config.retry.clone());
        Ok(pages)
    }

    /// Posts a comment body, requiring 201 Created.
    pub(crate) async fn post_comment(
        &self,
        issue: &IssueRef,
        path: &str,
        payload: Value,
    ) -> ForgeResult<Comment> {
        if self.resources.access_token().is_none() {
            return Err(ForgeError::unauthenticated());
        }

        let uri = self.uri(path)?;
        let resource = self.resources.post(&uri, &payload).await?;
        match resource.status_code() {
            201 => Ok(Comment::project(self.provider, resource.into_json(), uri.as_str())),
            401 => Err(ForgeError::unauthenticated()
                .with_status(401)
                .with_endpoint(uri.as_str())),
            status => Err(ForgeError::unexpected_status(
                &format!(
                    "post {} comment on issue #{} in {}",
                    self.label(),
                    issue.number,
                    issue.repo_full_name
                ),
                201,
                status,
            )
            .with_endpoint(uri.as_str())),
        }
    }

    pub(crate) fn webhooks(&self, repo_full_name: &str) -> ForgeResult<Webhooks> {
        Webhooks::new(
            self.provider,
            Arc::clone(&self.resources),
            self.config.clone(),
            repo_full_name,
        )
    }
}

/// Encodes a repository full name as a single path segment (`a/b` -> `a%2Fb`).
pub(crate) fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Checks that a repository full name is `owner/name` (GitLab: `group/.../name`).
pub(crate) fn repo_path(value: &str) -> ForgeResult<&str> {
    let valid = value.contains('/')
        && value.split('/').all(|segment| !segment.is_empty())
        && !value.contains(['?', '#']);
    if !valid {
        return Err(ForgeError::invalid_parameter(format!(
            "Invalid repository full name: '{}'",
            value
        )));
    }
    Ok(value)
}

/// Checks that an id is usable inside a URL path.
pub(crate) fn path_id<'a>(kind: &str, value: &'a str) -> ForgeResult<&'a str> {
    if value.is_empty() || value.contains(['/', '?', '#']) {
        return Err(ForgeError::invalid_parameter(format!(
            "Invalid {}: '{}'",
            kind, value
        )));
    }
    Ok(value)
}
