//! Core data types shared by every provider.
//!
//! Provider responses are kept as raw JSON and projected on access, so a
//! projection never loses provider-specific fields. Accessors fail with
//! [`ForgeErrorKind::MalformedResponse`](crate::errors::ForgeErrorKind) when
//! a required key is missing; they never substitute defaults.

use crate::errors::{ForgeError, ForgeResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A Git hosting provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// github.com or GitHub Enterprise.
    GitHub,
    /// gitlab.com or a self-hosted GitLab.
    GitLab,
    /// bitbucket.org.
    Bitbucket,
}

impl Provider {
    /// Every supported provider.
    pub const ALL: [Provider; 3] = [Provider::GitHub, Provider::GitLab, Provider::Bitbucket];

    /// Lowercase name used in URLs and storage keys.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Bitbucket => "bitbucket",
        }
    }

    /// Human-readable name used in messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::GitHub => "Github",
            Self::GitLab => "Gitlab",
            Self::Bitbucket => "Bitbucket",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Provider {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            "bitbucket" => Ok(Self::Bitbucket),
            other => Err(ForgeError::invalid_parameter(format!(
                "Unknown provider: {}",
                other
            ))),
        }
    }
}

/// Where each normalized field lives in a provider's JSON.
#[derive(Debug)]
pub struct FieldMap {
    /// Organization id.
    pub org_id: &'static [&'static str],
    /// Organization name or slug.
    pub org_name: &'static [&'static str],
    /// Repository full name (`owner/name`).
    pub repo_full_name: &'static [&'static str],
    /// Comment id.
    pub comment_id: &'static [&'static str],
    /// Comment author username.
    pub comment_author: &'static [&'static str],
    /// Comment body.
    pub comment_body: &'static [&'static str],
    /// Webhook id.
    pub hook_id: &'static [&'static str],
    /// Webhook target URL.
    pub hook_url: &'static [&'static str],
}

/// Looks up a nested key, failing with a malformed response error naming it.
pub fn require<'a>(json: &'a Value, path: &[&str], endpoint: &str) -> ForgeResult<&'a Value> {
    path.iter()
        .try_fold(json, |value, key| value.get(*key))
        .filter(|value| !value.is_null())
        .ok_or_else(|| ForgeError::malformed(&path.join("."), endpoint))
}

/// Looks up a nested string.
pub fn require_str<'a>(json: &'a Value, path: &[&str], endpoint: &str) -> ForgeResult<&'a str> {
    require(json, path, endpoint)?
        .as_str()
        .ok_or_else(|| ForgeError::malformed(&path.join("."), endpoint))
}

/// Looks up a nested id, accepting numbers and strings.
pub fn require_id(json: &Value, path: &[&str], endpoint: &str) -> ForgeResult<String> {
    match require(json, path, endpoint)? {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        _ => Err(ForgeError::malformed(&path.join("."), endpoint)),
    }
}

/// A typed view over raw provider JSON.
pub trait Projection: Sized {
    /// Wraps `json` fetched from `endpoint`.
    fn project(provider: Provider, json: Value, endpoint: &str) -> Self;
}

macro_rules! projection {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            provider: Provider,
            json: Value,
            endpoint: String,
        }

        impl $name {
            /// Wraps provider JSON.
            pub fn new(provider: Provider, json: Value) -> Self {
                Self {
                    provider,
                    json,
                    endpoint: format!("{} {}", provider.label(), stringify!($name)),
                }
            }

            /// Records the endpoint the JSON came from, for error messages.
            pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
                self.endpoint = endpoint.into();
                self
            }

            /// Gets the provider.
            pub fn provider(&self) -> Provider {
                self.provider
            }

            /// Gets the raw JSON, unchanged.
            pub fn json(&self) -> &Value {
                &self.json
            }

            fn fields(&self) -> &'static FieldMap {
                self.provider.fields()
            }
        }

        impl Projection for $name {
            fn project(provider: Provider, json: Value, endpoint: &str) -> Self {
                Self::new(provider, json).with_endpoint(endpoint)
            }
        }
    };
}

projection!(
    /// An organization (GitHub), group (GitLab) or workspace (Bitbucket).
    Organization
);

impl Organization {
    /// Gets the provider-issued id.
    pub fn organization_id(&self) -> ForgeResult<String> {
        require_id(&self.json, self.fields().org_id, &self.endpoint)
    }

    /// Gets the login, full path or slug.
    pub fn name(&self) -> ForgeResult<&str> {
        require_str(&self.json, self.fields().org_name, &self.endpoint)
    }
}

projection!(
    /// A repository (GitLab: project).
    Repo
);

impl Repo {
    /// Gets the `owner/name` full name.
    pub fn full_name(&self) -> ForgeResult<&str> {
        require_str(&self.json, self.fields().repo_full_name, &self.endpoint)
    }
}

projection!(
    /// A comment on an issue.
    Comment
);

impl Comment {
    /// Gets the provider-issued comment id.
    pub fn comment_id(&self) -> ForgeResult<String> {
        require_id(&self.json, self.fields().comment_id, &self.endpoint)
    }

    /// Gets the author's username.
    pub fn author(&self) -> ForgeResult<&str> {
        require_str(&self.json, self.fields().comment_author, &self.endpoint)
    }

    /// Gets the comment text.
    pub fn body(&self) -> ForgeResult<&str> {
        require_str(&self.json, self.fields().comment_body, &self.endpoint)
    }
}

projection!(
    /// A webhook registered on a repository.
    Webhook
);

impl Webhook {
    /// Gets the provider-issued hook id.
    pub fn hook_id(&self) -> ForgeResult<String> {
        require_id(&self.json, self.fields().hook_id, &self.endpoint)
    }

    /// Gets the URL the provider delivers to.
    pub fn url(&self) -> ForgeResult<&str> {
        require_str(&self.json, self.fields().hook_url, &self.endpoint)
    }
}

/// Reference to an issue within a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IssueRef {
    /// Repository full name (`owner/name`).
    pub repo_full_name: String,
    /// Issue number (GitHub), iid (GitLab) or id (Bitbucket).
    pub number: String,
}

impl IssueRef {
    /// Creates an issue reference.
    pub fn new(repo_full_name: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            repo_full_name: repo_full_name.into(),
            number: number.into(),
        }
    }
}
