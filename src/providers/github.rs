//! GitHub REST v3 adapter.

use super::{path_id, repo_path, ProviderApi, ProviderCore};
use crate::client::JsonResources;
use crate::config::ForgeConfig;
use crate::errors::ForgeResult;
use crate::pagination::PageIterator;
use crate::types::{Comment, FieldMap, IssueRef, Organization, Provider, Repo};
use crate::webhooks::Webhooks;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub(crate) static FIELDS: FieldMap = FieldMap {
    org_id: &["id"],
    org_name: &["login"],
    repo_full_name: &["full_name"],
    comment_id: &["id"],
    comment_author: &["user", "login"],
    comment_body: &["body"],
    hook_id: &["id"],
    hook_url: &["config", "url"],
};

pub(crate) fn hooks_path(repo_full_name: &str) -> String {
    format!("repos/{}/hooks", repo_full_name)
}

pub(crate) fn hook_payload(target: &str, secret: &str) -> Value {
    json!({
        "name": "web",
        "active": true,
        "events": ["issues", "issue_comment"],
        "config": {
            "url": target,
            "content_type": "json",
            "insecure_ssl": "0",
            "secret": secret
        }
    })
}

/// GitHub adapter.
///
/// Collections are paginated through the `Link` header. Organizations are
/// addressed by login.
#[derive(Clone)]
pub struct GitHub {
    core: ProviderCore,
}

impl GitHub {
    /// Creates an adapter over the given resources.
    pub fn new(resources: Arc<dyn JsonResources>, config: &ForgeConfig) -> Self {
        Self::from_core(ProviderCore::new(Provider::GitHub, resources, config.clone()))
    }

    pub(crate) fn from_core(core: ProviderCore) -> Self {
        Self { core }
    }

    fn issue_comments_path(issue: &IssueRef) -> ForgeResult<String> {
        Ok(format!(
            "repos/{}/issues/{}/comments",
            repo_path(&issue.repo_full_name)?,
            path_id("issue number", &issue.number)?
        ))
    }
}

#[async_trait]
impl ProviderApi for GitHub {
    fn provider(&self) -> Provider {
        self.core.provider()
    }

    fn organizations(&self) -> ForgeResult<PageIterator<Organization>> {
        self.core
            .pages(
                "user/orgs",
                format!("fetch {} organizations for current User", self.core.label()),
            )?
            .require_auth()
    }

    fn repos(&self, organization: &Organization) -> ForgeResult<PageIterator<Repo>> {
        let login = organization.name()?;
        self.core.pages(
            &format!("orgs/{}/repos", path_id("organization login", login)?),
            format!("fetch {} repos of organization {}", self.core.label(), login),
        )
    }

    fn comments(&self, issue: &IssueRef) -> ForgeResult<PageIterator<Comment>> {
        self.core.pages(
            &Self::issue_comments_path(issue)?,
            format!(
                "fetch {} comments of issue #{} in {}",
                self.core.label(),
                issue.number,
                issue.repo_full_name
            ),
        )
    }

    async fn post_comment(&self, issue: &IssueRef, body: &str) -> ForgeResult<Comment> {
        let path = Self::issue_comments_path(issue)?;
        self.core
            .post_comment(issue, &path, json!({ "body": body }))
            .await
    }

    fn webhooks(&self, repo_full_name: &str) -> ForgeResult<Webhooks> {
        self.core.webhooks(repo_full_name)
    }
}
