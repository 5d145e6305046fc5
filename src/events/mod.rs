//! Inbound webhook events.
//!
//! A delivery is authenticated against the project's secret, classified
//! into a canonical [`EventType`] and dispatched to the project's manager.

pub mod classify;
pub mod endpoint;
pub mod router;
pub mod signature;

pub use classify::{classify, Classification, PendingRule};
pub use endpoint::{InboundWebhook, WebhookEndpoint, WebhookResponse};
pub use router::{EventRouter, RouteOutcome};
pub use signature::Credential;

use crate::projects::{ProjectKey, ProjectLock};
use crate::types::Provider;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Canonical event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// The project was activated on the platform.
    Activate,
    /// An issue was opened.
    NewIssue,
    /// A closed issue was reopened.
    ReopenedIssue,
    /// Periodic check for tasks without an assignee.
    UnassignedTasks,
    /// Periodic check of assigned tasks.
    AssignedTasks,
    /// A comment was posted on an issue.
    IssueComment,
}

impl EventType {
    /// Gets the wire name, e.g. `NEW_ISSUE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activate => "ACTIVATE",
            Self::NewIssue => "NEW_ISSUE",
            Self::ReopenedIssue => "REOPENED_ISSUE",
            Self::UnassignedTasks => "UNASSIGNED_TASKS",
            Self::AssignedTasks => "ASSIGNED_TASKS",
            Self::IssueComment => "ISSUE_COMMENT",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event about to be applied to a project.
#[derive(Debug, Clone)]
pub struct Event {
    event_type: EventType,
    project: ProjectKey,
    payload: Value,
    lock: ProjectLock,
}

impl Event {
    /// Creates an event.
    pub fn new(event_type: EventType, project: ProjectKey, payload: Value, lock: ProjectLock) -> Self {
        Self {
            event_type,
            project,
            payload,
            lock,
        }
    }

    /// Gets the event type.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Gets the key of the project the event belongs to.
    pub fn project(&self) -> &ProjectKey {
        &self.project
    }

    /// Gets the raw delivery payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Provider id of the issue the event is about, if any.
    pub fn issue_id(&self) -> Option<String> {
        let path: &[&str] = match self.project.provider {
            Provider::GitHub => &["issue", "number"],
            Provider::GitLab if self.is_gitlab_note() => &["issue", "iid"],
            Provider::GitLab => &["object_attributes", "iid"],
            Provider::Bitbucket => &["issue", "id"],
        };
        id_at(&self.payload, path)
    }

    /// Provider id of the comment the event is about, if any.
    pub fn comment_id(&self) -> Option<String> {
        match self.project.provider {
            Provider::GitHub | Provider::Bitbucket => id_at(&self.payload, &["comment", "id"]),
            Provider::GitLab if self.is_gitlab_note() => {
                id_at(&self.payload, &["object_attributes", "id"])
            }
            Provider::GitLab => None,
        }
    }

    /// Waits for exclusive access to the project's state.
    ///
    /// Hold the guard only around state mutation, never across provider calls.
    pub async fn lock_state(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    fn is_gitlab_note(&self) -> bool {
        self.payload.get("object_kind").and_then(Value::as_str) == Some("note")
    }
}

fn id_at(payload: &Value, path: &[&str]) -> Option<String> {
    match path.iter().try_fold(payload, |value, key| value.get(*key))? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
