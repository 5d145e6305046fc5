//! Bitbucket Cloud 2.0 adapter.

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
    org_id: &["uuid"],
    org_name: &["slug"],
    repo_full_name: &["full_name"],
    comment_id: &["id"],
    comment_author: &["user", "nickname"],
    comment_body: &["content", "raw"],
    hook_id: &["uuid"],
    hook_url: &["url"],
};

pub(crate) fn hooks_path(repo_full_name: &str) -> String {
    format!("repositories/{}/hooks", repo_full_name)
}

pub(crate) fn hook_payload(target: &str, secret: &str) -> Value {
    json!({
        "description": "Self XDSD",
        "url": target,
        "active": true,
        "secret": secret,
        "events": ["issue:created", "issue:updated", "issue:comment_created"]
    })
}

/// Bitbucket adapter.
///
/// Workspaces stand in for organizations and are addressed by uuid.
/// Collections are paginated through the `next` field of each page.
#[derive(Clone)]
pub struct Bitbucket {
    core: ProviderCore,
}

impl Bitbucket {
    /// Creates an adapter over the given resources.
    pub fn new(resources: Arc<dyn JsonResources>, config: &ForgeConfig) -> Self {
        Self::from_core(ProviderCore::new(Provider::Bitbucket, resources, config.clone()))
    }

    pub(crate) fn from_core(core: ProviderCore) -> Self {
        Self { core }
    }

    fn issue_comments_path(issue: &IssueRef) -> ForgeResult<String> {
        Ok(format!(
            "repositories/{}/issues/{}/comments",
            repo_path(&issue.repo_full_name)?,
            path_id("issue id", &issue.number)?
        ))
    }
}

#[async_trait]
impl ProviderApi for Bitbucket {
    fn provider(&self) -> Provider {
        self.core.provider()
    }

    fn organizations(&self) -> ForgeResult<PageIterator<Organization>> {
        self.core
            .pages(
                "workspaces",
                format!("fetch {} organizations for current User", self.core.label()),
            )?
            .require_auth()
    }

    fn repos(&self, organization: &Organization) -> ForgeResult<PageIterator<Repo>> {
        let uuid = organization.organization_id()?;
        self.core.pages(
            &format!("repositories/{}", path_id("workspace uuid", &uuid)?),
            format!("fetch {} repos of workspace {}", self.core.label(), uuid),
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
            .post_comment(issue, &path, json!({ "content": { "raw": body } }))
            .await
    }

    fn webhooks(&self, repo_full_name: &str) -> ForgeResult<Webhooks> {
        self.core.webhooks(repo_full_name)
    }
}
