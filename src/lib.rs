//! # Forge Integration Library
//!
//! A provider-agnostic client for GitHub, GitLab and Bitbucket with:
//! - Organizations, repositories, issue comments and webhooks behind one trait
//! - Lazy pagination over Link headers, `next` fields and page numbers
//! - Idempotent webhook registration with per-project secrets
//! - Inbound webhook authentication, classification and dispatch
//! - Structured tracing of requests, rate limits and events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use integrations_forges::{AccessToken, ForgeConfig, HttpJsonResources, Provider};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ForgeConfig::builder()
//!         .webhook_base_url("https://hooks.example.com")
//!         .build()?;
//!
//!     let resources = HttpJsonResources::new(&config, Some(AccessToken::github("ghp_xxxxxxxxxxxx")))?;
//!     let github = Provider::GitHub.adapter(Arc::new(resources), &config);
//!
//!     let mut orgs = github.organizations()?;
//!     while let Some(org) = orgs.next().await? {
//!         println!("{}", org.name()?);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Core modules
pub mod config;
pub mod errors;
pub mod types;

// Authentication
pub mod auth;

// HTTP client and transport
pub mod client;

// Pagination handling
pub mod pagination;

// Provider adapters
pub mod providers;

// Webhooks
pub mod webhooks;

// Projects and inbound events
pub mod events;
pub mod projects;

// Resilience patterns
pub mod resilience;

// Observability
pub mod observability;

// Mocks for testing
pub mod mocks;

// Re-exports for convenience
pub use auth::{AccessToken, AuthScheme};
pub use client::{HttpJsonResources, JsonResources, RateLimitInfo, Resource};
pub use config::{ForgeConfig, ForgeConfigBuilder, PaginationConfig};
pub use errors::{ForgeError, ForgeErrorKind, ForgeResult};
pub use events::{
    Classification, Credential, Event, EventRouter, EventType, InboundWebhook, PendingRule,
    RouteOutcome, WebhookEndpoint, WebhookResponse,
};
pub use pagination::{PageIterator, PageStrategy, PaginationLinks};
pub use projects::{Project, ProjectKey, ProjectLock, ProjectLocks, ProjectManager, Storage};
pub use providers::{Bitbucket, GitHub, GitLab, ProviderApi};
pub use resilience::RetryPolicy;
pub use types::*;
pub use webhooks::{WebhookRegistration, Webhooks};
