//! GitLab v4 adapter.

use super::{encode_segment, path_id, repo_path, ProviderApi, ProviderCore};
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
    org_name: &["full_path"],
    repo_full_name: &["path_with_namespace"],
    comment_id: &["id"],
    comment_author: &["author", "username"],
    comment_body: &["body"],
    hook_id: &["id"],
    hook_url: &["url"],
};

pub(crate) fn hooks_path(repo_full_name: &str) -> String {
    format!("projects/{}/hooks", encode_segment(repo_full_name))
}

pub(crate) fn hook_payload(repo_full_name: &str, target: &str, secret: &str) -> Value {
    json!({
        "id": encode_segment(repo_full_name),
        "url": target,
        "issues_events": true,
        "note_events": true,
        "token": secret
    })
}

/// GitLab adapter.
///
/// Projects are addressed by their URL-encoded full path, so
/// `self-xdsd/self-core` becomes `projects/self-xdsd%2Fself-core`.
/// Collections are paginated by page number.
#[derive(Clone)]
pub struct GitLab {
    core: ProviderCore,
}

impl GitLab {
    /// Creates an adapter over the given resources.
    pub fn new(resources: Arc<dyn JsonResources>, config: &ForgeConfig) -> Self {
        Self::from_core(ProviderCore::new(Provider::GitLab, resources, config.clone()))
    }

    pub(crate) fn from_core(core: ProviderCore) -> Self {
        Self { core }
    }

    fn issue_notes_path(issue: &IssueRef) -> ForgeResult<String> {
        Ok(format!(
            "projects/{}/issues/{}/notes",
            encode_segment(repo_path(&issue.repo_full_name)?),
            path_id("issue iid", &issue.number)?
        ))
    }
}

#[async_trait]
impl ProviderApi for GitLab {
    fn provider(&self) -> Provider {
        self.core.provider()
    }

    fn organizations(&self) -> ForgeResult<PageIterator<Organization>> {
        self.core
            .pages(
                "groups",
                format!("fetch {} organizations for current User", self.core.label()),
            )?
            .require_auth()
    }

    fn repos(&self, organization: &Organization) -> ForgeResult<PageIterator<Repo>> {
        let id = organization.organization_id()?;
        self.core.pages(
            &format!("groups/{}/projects", path_id("group id", &id)?),
            format!("fetch {} repos of group {}", self.core.label(), id),
        )
    }

    fn comments(&self, issue: &IssueRef) -> ForgeResult<PageIterator<Comment>> {
        self.core.pages(
            &Self::issue_notes_path(issue)?,
            format!(
                "fetch {} comments of issue #{} in {}",
                self.core.label(),
                issue.number,
                issue.repo_full_name
            ),
        )
    }

    async fn post_comment(&self, issue: &IssueRef, body: &str) -> ForgeResult<Comment> {
        let path = Self::issue_notes_path(issue)?;
        self.core
            .post_comment(issue, &path, json!({ "body": body }))
            .await
    }

    fn webhooks(&self, repo_full_name: &str) -> ForgeResult<Webhooks> {
        self.core.webhooks(repo_full_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_encode_full_name() {
        let issue = IssueRef::new("self-xdsd/self-core", "3");
        assert_eq!(
            GitLab::issue_notes_path(&issue).unwrap(),
            "projects/self-xdsd%2Fself-core/issues/3/notes"
        );
        assert_eq!(hooks_path("self-xdsd/self-core"), "projects/self-xdsd%2Fself-core/hooks");
    }

    #[test]
    fn test_hook_payload() {
        let payload = hook_payload("john/test", "https://self-xdsd.com/gitlab/john/test", "tok");
        assert_eq!(
            payload,
            json!({
                "id": "john%2Ftest",
                "url": "https://self-xdsd.com/gitlab/john/test",
                "issues_events": true,
                "note_events": true,
                "token": "tok"
            })
        );
    }
}
