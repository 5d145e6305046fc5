//! Integration tests for the reqwest-backed JSON resources.

use integrations_forges::{
    AccessToken, AuthScheme, ForgeConfig, ForgeErrorKind, HttpJsonResources, JsonResources,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use test_case::test_case;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> ForgeConfig {
    ForgeConfig::builder()
        .webhook_base_url("https://self-xdsd.com")
        .build()
        .expect("valid config")
}

fn uri(server: &MockServer, path: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), path)).expect("valid uri")
}

#[test_case(200 ; "ok")]
#[test_case(404 ; "not found")]
#[test_case(422 ; "unprocessable")]
#[test_case(500 ; "server error")]
#[tokio::test]
async fn test_status_is_returned_as_data(status: u16) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/orgs"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "message": "x" })))
        .mount(&server)
        .await;

    let resources = HttpJsonResources::new(&config(), None).expect("client");
    let resource = resources.get(&uri(&server, "/user/orgs")).await.expect("resource");

    assert_eq!(resource.status_code(), status);
    assert_eq!(resource.json()["message"], "x");
}

#[tokio::test]
async fn test_token_and_headers_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/orgs"))
        .and(header("authorization", "token ghp_test"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let resources =
        HttpJsonResources::new(&config(), Some(AccessToken::github("ghp_test"))).expect("client");
    let resource = resources.get(&uri(&server, "/user/orgs")).await.expect("resource");

    assert_eq!(resource.status_code(), 200);
    assert_eq!(resource.json(), &json!([]));
}

#[tokio::test]
async fn test_post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/repos/john/test/issues/1/comments"))
        .and(body_json(json!({ "body": "hello" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 7 })))
        .mount(&server)
        .await;

    let resources = HttpJsonResources::new(&config(), None).expect("client");
    let resource = resources
        .post(
            &uri(&server, "/repos/john/test/issues/1/comments"),
            &json!({ "body": "hello" }),
        )
        .await
        .expect("resource");

    assert_eq!(resource.status_code(), 201);
    assert_eq!(resource.json()["id"], 7);
}

#[tokio::test]
async fn test_empty_body_is_null() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/repos/john/test/hooks/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let resources = HttpJsonResources::new(&config(), None).expect("client");
    let resource = resources
        .delete(&uri(&server, "/repos/john/test/hooks/1"))
        .await
        .expect("resource");

    assert_eq!(resource.status_code(), 204);
    assert_eq!(resource.json(), &Value::Null);
}

#[tokio::test]
async fn test_malformed_body_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/workspaces"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let resources = HttpJsonResources::new(&config(), None).expect("client");
    let err = resources.get(&uri(&server, "/workspaces")).await.unwrap_err();

    assert_eq!(err.kind(), ForgeErrorKind::Transport);
    assert_eq!(err.status_code(), Some(200));
}

#[tokio::test]
async fn test_rate_limit_headers_are_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/orgs"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-limit", "5000")
                .insert_header("x-ratelimit-remaining", "4999")
                .insert_header("x-ratelimit-reset", "1700000000")
                .set_body_json(json!([])),
        )
        .mount(&server)
        .await;

    let resources = HttpJsonResources::new(&config(), None).expect("client");
    let resource = resources.get(&uri(&server, "/user/orgs")).await.expect("resource");
    let info = resource.rate_limit().expect("rate limit");

    assert_eq!(info.limit, 5000);
    assert_eq!(info.remaining, 4999);
    assert!(!info.is_exhausted());
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind and release a port so nothing listens on it.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let uri = Url::parse(&format!("http://127.0.0.1:{}/user/orgs", port)).expect("uri");

    let resources = HttpJsonResources::new(&config(), None).expect("client");
    let err = resources.get(&uri).await.unwrap_err();

    assert_eq!(err.kind(), ForgeErrorKind::Transport);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_transport_error_does_not_carry_query_token() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let uri = Url::parse(&format!("http://127.0.0.1:{}/groups", port)).expect("uri");

    let token = AccessToken::gitlab("SUPERSECRET-TOKEN").with_scheme(AuthScheme::Query {
        param: "access_token".into(),
    });
    let resources = HttpJsonResources::new(&config(), Some(token)).expect("client");
    let err = resources.get(&uri).await.unwrap_err();

    assert_eq!(err.kind(), ForgeErrorKind::Transport);
    assert!(!err.message().contains("SUPERSECRET-TOKEN"), "{}", err.message());
    assert!(!err.to_string().contains("SUPERSECRET-TOKEN"));
    assert!(!format!("{:?}", err).contains("SUPERSECRET-TOKEN"));
}
