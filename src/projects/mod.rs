//! Managed projects and their collaborators.

use crate::errors::{ForgeError, ForgeResult};
use crate::events::{Credential, Event, EventType};
use crate::observability::TracingHooks;
use crate::types::{Provider, Repo};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

/// Natural key of a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectKey {
    /// Repository full name (`owner/name`).
    pub repo_full_name: String,
    /// Hosting provider.
    pub provider: Provider,
}

impl ProjectKey {
    /// Creates a key.
    pub fn new(repo_full_name: impl Into<String>, provider: Provider) -> Self {
        Self {
            repo_full_name: repo_full_name.into(),
            provider,
        }
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.repo_full_name, self.provider)
    }
}

/// Looks projects up by natural key.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Finds the project registered for a repository, if any.
    async fn project(
        &self,
        repo_full_name: &str,
        provider: Provider,
    ) -> ForgeResult<Option<Arc<Project>>>;
}

/// Applies canonical events to a project's state.
///
/// Handlers must be idempotent: providers redeliver webhooks, so the same
/// event may arrive more than once. Key side effects on
/// [`Event::issue_id`] and [`Event::comment_id`], and take
/// [`Event::lock_state`] only around state mutation.
#[async_trait]
pub trait ProjectManager: Send + Sync {
    /// The project was activated.
    async fn new_project(&self, event: &Event) -> ForgeResult<()>;

    /// An issue was opened.
    async fn new_issue(&self, event: &Event) -> ForgeResult<()>;

    /// A closed issue was reopened.
    async fn reopened_issue(&self, event: &Event) -> ForgeResult<()>;

    /// Look for tasks without an assignee.
    async fn unassigned_tasks(&self, event: &Event) -> ForgeResult<()>;

    /// Review tasks that have an assignee.
    async fn assigned_tasks(&self, event: &Event) -> ForgeResult<()>;

    /// A comment was posted on an issue.
    async fn comment(&self, event: &Event) -> ForgeResult<()>;
}

/// A repository managed by the platform.
///
/// Equality and hashing use the [`ProjectKey`] only.
pub struct Project {
    key: ProjectKey,
    owner: String,
    webhook_secret: RwLock<SecretString>,
    manager: Arc<dyn ProjectManager>,
}

impl fmt::Debug for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Project")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .field("webhook_secret", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for Project {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Project {}

impl Hash for Project {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl Project {
    /// Creates a project. The repository full name must contain `/`.
    pub fn new(
        key: ProjectKey,
        owner: impl Into<String>,
        webhook_secret: impl Into<String>,
        manager: Arc<dyn ProjectManager>,
    ) -> ForgeResult<Self> {
        if !key.repo_full_name.contains('/') {
            return Err(ForgeError::invalid_parameter(format!(
                "Repository full name must be owner/name, got '{}'",
                key.repo_full_name
            )));
        }

        Ok(Self {
            key,
            owner: owner.into(),
            webhook_secret: RwLock::new(SecretString::new(webhook_secret.into())),
            manager,
        })
    }

    /// Gets the natural key.
    pub fn key(&self) -> &ProjectKey {
        &self.key
    }

    /// Gets the repository full name.
    pub fn repo_full_name(&self) -> &str {
        &self.key.repo_full_name
    }

    /// Gets the provider.
    pub fn provider(&self) -> Provider {
        self.key.provider
    }

    /// Gets the owner's username.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Splits the full name into owner and repository name.
    pub fn repo(&self) -> (&str, &str) {
        self.key
            .repo_full_name
            .split_once('/')
            .unwrap_or((self.key.repo_full_name.as_str(), ""))
    }

    /// Gets the project manager.
    pub fn manager(&self) -> &Arc<dyn ProjectManager> {
        &self.manager
    }

    /// Gets the current webhook secret.
    pub fn webhook_secret(&self) -> SecretString {
        self.webhook_secret
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the webhook secret with a fresh random one and returns it.
    ///
    /// The provider-side hook keeps the old secret until it is registered
    /// again.
    pub fn rotate_webhook_secret(&self) -> SecretString {
        let fresh = SecretString::new(uuid::Uuid::new_v4().simple().to_string());
        *self
            .webhook_secret
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fresh.clone();
        tracing::info!(project = %self.key, "Webhook secret rotated");
        fresh
    }

    /// Checks an inbound webhook credential against the current secret.
    pub fn authenticate(&self, credential: &Credential<'_>) -> ForgeResult<()> {
        let secret = self.webhook_secret();
        let verified = credential.verify(secret.expose_secret());
        TracingHooks::on_webhook_verified(self.provider(), self.repo_full_name(), verified);

        if verified {
            Ok(())
        } else {
            Err(ForgeError::authentication(format!(
                "Webhook credential rejected for {}",
                self.key
            )))
        }
    }

    /// Authenticates, then dispatches the event to the project manager.
    pub async fn resolve(&self, event: &Event, credential: &Credential<'_>) -> ForgeResult<()> {
        self.authenticate(credential)?;
        self.dispatch(event).await
    }

    /// Hands the event to exactly one project manager handler.
    pub async fn dispatch(&self, event: &Event) -> ForgeResult<()> {
        if event.project() != &self.key {
            return Err(ForgeError::invalid_parameter(format!(
                "Event for {} dispatched to {}",
                event.project(),
                self.key
            )));
        }

        TracingHooks::on_event_dispatched(self.provider(), self.repo_full_name(), event.event_type());
        match event.event_type() {
            EventType::Activate => self.manager.new_project(event).await,
            EventType::NewIssue => self.manager.new_issue(event).await,
            EventType::ReopenedIssue => self.manager.reopened_issue(event).await,
            EventType::UnassignedTasks => self.manager.unassigned_tasks(event).await,
            EventType::AssignedTasks => self.manager.assigned_tasks(event).await,
            EventType::IssueComment => self.manager.comment(event).await,
        }
    }

    /// Deactivates the project. Not supported yet.
    pub async fn deactivate(&self) -> ForgeResult<Repo> {
        Err(ForgeError::not_implemented("Project deactivation"))
    }
}

/// Hands out one state lock per project.
///
/// Locks live as long as some [`ProjectLock`] refers to them; dead entries
/// are pruned whenever a new lock is created.
#[derive(Debug, Clone, Default)]
pub struct ProjectLocks {
    locks: Arc<Mutex<HashMap<ProjectKey, Weak<tokio::sync::Mutex<()>>>>>,
}

impl ProjectLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the lock of a project, creating it if needed.
    pub fn lock_for(&self, key: &ProjectKey) -> ProjectLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mutex) = locks.get(key).and_then(Weak::upgrade) {
            return ProjectLock {
                key: key.clone(),
                mutex,
            };
        }

        locks.retain(|_, lock| lock.strong_count() > 0);
        let mutex = Arc::new(tokio::sync::Mutex::new(()));
        locks.insert(key.clone(), Arc::downgrade(&mutex));
        ProjectLock {
            key: key.clone(),
            mutex,
        }
    }

    /// Number of projects with a live lock.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }

    /// Returns true if no project holds a live lock.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to one project's state lock.
#[derive(Debug, Clone)]
pub struct ProjectLock {
    key: ProjectKey,
    mutex: Arc<tokio::sync::Mutex<()>>,
}

impl ProjectLock {
    /// Gets the project this lock guards.
    pub fn key(&self) -> &ProjectKey {
        &self.key
    }

    /// Waits for exclusive access to the project's state.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.mutex.lock().await
    }

    /// Returns true if both handles guard the same lock.
    pub fn same_lock(&self, other: &ProjectLock) -> bool {
        Arc::ptr_eq(&self.mutex, &other.mutex)
    }
}
