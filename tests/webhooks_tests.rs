//! Integration tests for provider-side webhook registration.

use integrations_forges::mocks::NoopProjectManager;
use integrations_forges::{
    AccessToken, ForgeConfig, HttpJsonResources, Project, ProjectKey, Provider,
    WebhookRegistration,
};
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn project(provider: Provider) -> Project {
    Project::new(
        ProjectKey::new("john/test", provider),
        "john",
        "s3cr3t",
        Arc::new(NoopProjectManager),
    )
    .expect("valid project")
}

fn config(server: &MockServer, provider: Provider) -> ForgeConfig {
    ForgeConfig::builder()
        .webhook_base_url("https://self-xdsd.com")
        .provider_url(provider, server.uri())
        .build()
        .expect("valid config")
}

#[tokio::test]
async fn test_github_ensure_adds_missing_hook_with_secret() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/john/test/hooks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "config": { "url": "https://ci.example.com/hook" } }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/john/test/hooks"))
        .and(body_json(json!({
            "name": "web",
            "active": true,
            "events": ["issues", "issue_comment"],
            "config": {
                "url": "https://self-xdsd.com/github/john/test",
                "content_type": "json",
                "insecure_ssl": "0",
                "secret": "s3cr3t"
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 2 })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server, Provider::GitHub);
    let resources =
        HttpJsonResources::new(&config, Some(AccessToken::github("ghp_t"))).expect("client");
    let github = Provider::GitHub.adapter(Arc::new(resources), &config);

    let hooks = github.webhooks("john/test").expect("hooks");
    let outcome = hooks.ensure(&project(Provider::GitHub)).await.expect("ensure");

    assert_eq!(outcome, WebhookRegistration::Added);
    assert!(outcome.is_registered());
}

#[tokio::test]
async fn test_gitlab_ensure_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/projects/john%2Ftest/hooks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 9, "url": "https://self-xdsd.com/gitlab/john/test" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/projects/john%2Ftest/hooks"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let config = config(&server, Provider::GitLab);
    let resources =
        HttpJsonResources::new(&config, Some(AccessToken::gitlab("t"))).expect("client");
    let gitlab = Provider::GitLab.adapter(Arc::new(resources), &config);
    let hooks = gitlab.webhooks("john/test").expect("hooks");

    for _ in 0..2 {
        let outcome = hooks.ensure(&project(Provider::GitLab)).await.expect("ensure");
        assert_eq!(outcome, WebhookRegistration::AlreadyPresent);
    }
}

#[tokio::test]
async fn test_add_reports_rejection_as_false() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repositories/john/test/hooks"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({ "type": "error" })))
        .mount(&server)
        .await;

    let config = config(&server, Provider::Bitbucket);
    let resources =
        HttpJsonResources::new(&config, Some(AccessToken::bitbucket("t"))).expect("client");
    let bitbucket = Provider::Bitbucket.adapter(Arc::new(resources), &config);

    let added = bitbucket
        .add_webhook(&project(Provider::Bitbucket))
        .await
        .expect("add");
    assert!(!added);
}

#[tokio::test]
async fn test_rotated_secret_is_registered() {
    let server = MockServer::start().await;
    let project = project(Provider::Bitbucket);
    let fresh = project.rotate_webhook_secret();

    Mock::given(method("POST"))
        .and(path("/repositories/john/test/hooks"))
        .and(body_json(json!({
            "description": "Self XDSD",
            "url": "https://self-xdsd.com/bitbucket/john/test",
            "active": true,
            "secret": fresh.expose_secret(),
            "events": ["issue:created", "issue:updated", "issue:comment_created"]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "uuid": "{h}" })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server, Provider::Bitbucket);
    let resources =
        HttpJsonResources::new(&config, Some(AccessToken::bitbucket("t"))).expect("client");
    let bitbucket = Provider::Bitbucket.adapter(Arc::new(resources), &config);

    assert!(bitbucket.add_webhook(&project).await.expect("add"));
}
