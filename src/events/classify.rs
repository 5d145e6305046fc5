//! Mapping of provider webhook deliveries onto canonical event types.

use super::EventType;
use crate::errors::{ForgeError, ForgeResult};
use crate::types::Provider;
use reqwest::header::HeaderMap;
use serde_json::Value;

/// Header naming the event on GitHub deliveries.
pub const GITHUB_EVENT_HEADER: &str = "x-github-event";

/// Header naming the event on GitLab deliveries.
pub const GITLAB_EVENT_HEADER: &str = "x-gitlab-event";

/// Header naming the event on Bitbucket deliveries.
pub const BITBUCKET_EVENT_HEADER: &str = "x-event-key";

/// Bitbucket issue states that count as closed.
const BITBUCKET_CLOSED_STATES: [&str; 5] = ["resolved", "closed", "invalid", "duplicate", "wontfix"];

/// A recognized delivery with no product rule behind it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingRule {
    /// An issue's assignees changed.
    IssueAssigned,
    /// A comment was created on an issue.
    CommentCreated,
}

/// Result of classifying one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Maps to a canonical event.
    Event(EventType),
    /// Recognized, but there is nothing to apply yet.
    Unresolved(PendingRule),
    /// Not something the platform reacts to.
    Ignored,
}

/// Classifies a delivery from its event header and parsed body.
///
/// Fails with a payload error when the body is not a JSON object, the
/// event header is missing, or a recognized shape lacks a required field.
pub fn classify(provider: Provider, headers: &HeaderMap, payload: &Value) -> ForgeResult<Classification> {
    if !payload.is_object() {
        return Err(ForgeError::payload("Webhook body must be a JSON object"));
    }

    let header = match provider {
        Provider::GitHub => GITHUB_EVENT_HEADER,
        Provider::GitLab => GITLAB_EVENT_HEADER,
        Provider::Bitbucket => BITBUCKET_EVENT_HEADER,
    };
    let event = headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ForgeError::payload(format!("Missing {} header", header)))?;

    match provider {
        Provider::GitHub => github(event, payload),
        Provider::GitLab => gitlab(event, payload),
        Provider::Bitbucket => bitbucket(event, payload),
    }
}

fn github(event: &str, payload: &Value) -> ForgeResult<Classification> {
    match event {
        "issues" => match field_str(payload, &["action"])? {
            "opened" => {
                field(payload, &["issue", "number"])?;
                Ok(Classification::Event(EventType::NewIssue))
            }
            "reopened" => {
                field(payload, &["issue", "number"])?;
                Ok(Classification::Event(EventType::ReopenedIssue))
            }
            "assigned" | "unassigned" => Ok(Classification::Unresolved(PendingRule::IssueAssigned)),
            _ => Ok(Classification::Ignored),
        },
        "issue_comment" => match field_str(payload, &["action"])? {
            "created" => {
                field(payload, &["issue", "number"])?;
                field(payload, &["comment", "id"])?;
                Ok(Classification::Unresolved(PendingRule::CommentCreated))
            }
            _ => Ok(Classification::Ignored),
        },
        _ => Ok(Classification::Ignored),
    }
}

fn gitlab(event: &str, payload: &Value) -> ForgeResult<Classification> {
    match event {
        "Issue Hook" => {
            let action = payload
                .pointer("/object_attributes/action")
                .and_then(Value::as_str);
            match action {
                Some("open") => {
                    field(payload, &["object_attributes", "iid"])?;
                    Ok(Classification::Event(EventType::NewIssue))
                }
                Some("reopen") => {
                    field(payload, &["object_attributes", "iid"])?;
                    Ok(Classification::Event(EventType::ReopenedIssue))
                }
                Some("update") if payload.pointer("/changes/assignees").is_some() => {
                    Ok(Classification::Unresolved(PendingRule::IssueAssigned))
                }
                Some(_) => Ok(Classification::Ignored),
                None => Err(missing(&["object_attributes", "action"])),
            }
        }
        "Note Hook" => {
            let noteable = field_str(payload, &["object_attributes", "noteable_type"])?;
            if noteable != "Issue" {
                return Ok(Classification::Ignored);
            }
            field(payload, &["issue", "iid"])?;
            field(payload, &["object_attributes", "id"])?;
            Ok(Classification::Unresolved(PendingRule::CommentCreated))
        }
        _ => Ok(Classification::Ignored),
    }
}

fn bitbucket(event: &str, payload: &Value) -> ForgeResult<Classification> {
    match event {
        "issue:created" => {
            field(payload, &["issue", "id"])?;
            Ok(Classification::Event(EventType::NewIssue))
        }
        "issue:updated" => {
            field(payload, &["issue", "id"])?;
            let old = payload.pointer("/changes/status/old").and_then(Value::as_str);
            let new = payload.pointer("/changes/status/new").and_then(Value::as_str);
            match (old, new) {
                (Some(old), Some(new)) if is_closed(old) && !is_closed(new) => {
                    Ok(Classification::Event(EventType::ReopenedIssue))
                }
                _ if payload.pointer("/changes/assignee").is_some() => {
                    Ok(Classification::Unresolved(PendingRule::IssueAssigned))
                }
                _ => Ok(Classification::Ignored),
            }
        }
        "issue:comment_created" => {
            field(payload, &["issue", "id"])?;
            field(payload, &["comment", "id"])?;
            Ok(Classification::Unresolved(PendingRule::CommentCreated))
        }
        _ => Ok(Classification::Ignored),
    }
}

fn is_closed(state: &str) -> bool {
    BITBUCKET_CLOSED_STATES.contains(&state)
}

fn field<'a>(payload: &'a Value, path: &[&str]) -> ForgeResult<&'a Value> {
    path.iter()
        .try_fold(payload, |value, key| value.get(*key))
        .filter(|value| !value.is_null())
        .ok_or_else(|| missing(path))
}

fn field_str<'a>(payload: &'a Value, path: &[&str]) -> ForgeResult<&'a str> {
    field(payload, path)?.as_str().ok_or_else(|| missing(path))
}

fn missing(path: &[&str]) -> ForgeError {
    ForgeError::payload(format!("Missing or invalid '{}' in webhook payload", path.join(".")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ForgeErrorKind;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    fn headers(name: &'static str, event: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, HeaderValue::from_static(event));
        headers
    }

    #[test]
    fn test_github_opened_issue() {
        let payload = json!({ "action": "opened", "issue": { "number": 7 } });
        assert_eq!(
            classify(Provider::GitHub, &headers(GITHUB_EVENT_HEADER, "issues"), &payload).unwrap(),
            Classification::Event(EventType::NewIssue)
        );
    }

    #[test]
    fn test_github_opened_issue_without_number_is_payload_error() {
        let payload = json!({ "action": "opened", "issue": {} });
        let err = classify(Provider::GitHub, &headers(GITHUB_EVENT_HEADER, "issues"), &payload)
            .unwrap_err();
        assert_eq!(err.kind(), ForgeErrorKind::PayloadParseError);
        assert!(err.message().contains("issue.number"));
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let payload = json!({ "zen": "Keep it logically awesome." });
        assert_eq!(
            classify(Provider::GitHub, &headers(GITHUB_EVENT_HEADER, "ping"), &payload).unwrap(),
            Classification::Ignored
        );
    }

    #[test]
    fn test_non_object_body_is_payload_error() {
        let err = classify(Provider::GitLab, &headers(GITLAB_EVENT_HEADER, "Issue Hook"), &json!([1]))
            .unwrap_err();
        assert_eq!(err.kind(), ForgeErrorKind::PayloadParseError);
    }

    #[test]
    fn test_missing_event_header_is_payload_error() {
        let err = classify(Provider::Bitbucket, &HeaderMap::new(), &json!({})).unwrap_err();
        assert_eq!(err.kind(), ForgeErrorKind::PayloadParseError);
    }

    #[test]
    fn test_gitlab_note_on_merge_request_is_ignored() {
        let payload = json!({ "object_attributes": { "id": 1, "noteable_type": "MergeRequest" } });
        assert_eq!(
            classify(Provider::GitLab, &headers(GITLAB_EVENT_HEADER, "Note Hook"), &payload).unwrap(),
            Classification::Ignored
        );
    }

    #[test]
    fn test_bitbucket_status_between_open_states_is_ignored() {
        let payload = json!({
            "issue": { "id": 3 },
            "changes": { "status": { "old": "new", "new": "open" } }
        });
        assert_eq!(
            classify(Provider::Bitbucket, &headers(BITBUCKET_EVENT_HEADER, "issue:updated"), &payload)
                .unwrap(),
            Classification::Ignored
        );
    }
}
