//! Routing of authenticated webhook deliveries to project managers.

use super::{classify, Classification, Credential, Event, EventType, PendingRule};
use crate::errors::{ForgeError, ForgeResult};
use crate::observability::TracingHooks;
use crate::projects::{ProjectLocks, Storage};
use crate::types::Provider;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::sync::Arc;

/// What happened to a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The project manager handled the event.
    Dispatched(EventType),
    /// The delivery was authentic and recognized, but nothing applies yet.
    Unresolved(PendingRule),
    /// The delivery was authentic but not relevant.
    Ignored,
}

/// Resolves inbound deliveries to projects and hands them to their managers.
///
/// Deliveries for different projects proceed concurrently; each event
/// carries its project's lock for the manager to serialize state changes.
#[derive(Clone)]
pub struct EventRouter {
    storage: Arc<dyn Storage>,
    locks: ProjectLocks,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl EventRouter {
    /// Creates a router over a project store.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            locks: ProjectLocks::new(),
        }
    }

    /// Gets the per-project lock table.
    pub fn locks(&self) -> &ProjectLocks {
        &self.locks
    }

    /// Routes one delivery.
    ///
    /// The credential is checked against the raw `body` before it is parsed,
    /// so unauthenticated payloads are never interpreted.
    pub async fn route(
        &self,
        provider: Provider,
        repo_full_name: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> ForgeResult<RouteOutcome> {
        let project = self
            .storage
            .project(repo_full_name, provider)
            .await?
            .ok_or_else(|| ForgeError::project_not_found(repo_full_name, provider.name()))?;

        let credential = Credential::from_headers(provider, headers, body).ok_or_else(|| {
            TracingHooks::on_webhook_verified(provider, repo_full_name, false);
            ForgeError::authentication(format!(
                "Missing webhook credential for {}",
                project.key()
            ))
        })?;
        project.authenticate(&credential)?;

        let payload: Value = serde_json::from_slice(body).map_err(|e| {
            ForgeError::payload(format!("Webhook body is not valid JSON: {}", e)).with_cause(e)
        })?;

        let classification = classify(provider, headers, &payload)?;
        TracingHooks::on_event_classified(provider, repo_full_name, &classification);

        match classification {
            Classification::Event(event_type) => {
                let key = project.key().clone();
                let lock = self.locks.lock_for(&key);
                let event = Event::new(event_type, key, payload, lock);
                project.dispatch(&event).await?;
                Ok(RouteOutcome::Dispatched(event_type))
            }
            Classification::Unresolved(rule) => Ok(RouteOutcome::Unresolved(rule)),
            Classification::Ignored => Ok(RouteOutcome::Ignored),
        }
    }
}
