//! In-memory stand-ins for provider resources and project storage.

use crate::auth::AccessToken;
use crate::client::{JsonResources, Resource};
use crate::errors::{ForgeError, ForgeResult};
use crate::events::Event;
use crate::projects::{Project, ProjectKey, ProjectManager, Storage};
use crate::types::Provider;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use url::Url;

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Value,
    /// Headers.
    pub headers: HeaderMap,
    /// Transport failure to raise instead of answering.
    pub transport_error: Option<String>,
}

impl MockResponse {
    /// Creates a response with the given status and body.
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            body,
            headers: HeaderMap::new(),
            transport_error: None,
        }
    }

    /// Creates a 200 OK response.
    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    /// Creates a 201 Created response.
    pub fn created(body: Value) -> Self {
        Self::new(201, body)
    }

    /// Creates an empty-bodied response with the given status.
    pub fn status(status: u16) -> Self {
        Self::new(status, Value::Null)
    }

    /// Creates a response that fails below HTTP, like a refused connection.
    pub fn transport_error(message: &str) -> Self {
        Self {
            transport_error: Some(message.to_string()),
            ..Self::status(0)
        }
    }

    /// Adds a header. Invalid names or values are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }
}

/// A recorded request.
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// HTTP method.
    pub method: Method,
    /// Full request URI.
    pub uri: Url,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl MockRequest {
    /// Path plus query string, the key responses are registered under.
    pub fn path_and_query(&self) -> String {
        route_key(&self.uri)
    }
}

/// [`JsonResources`] answering from registered responses.
///
/// Responses are queued per method and path (with query string) and
/// consumed in order; unmatched requests get a 404.
#[derive(Debug, Clone, Default)]
pub struct MockJsonResources {
    token: Option<AccessToken>,
    responses: Arc<RwLock<HashMap<String, VecDeque<MockResponse>>>>,
    requests: Arc<RwLock<Vec<MockRequest>>>,
}

impl MockJsonResources {
    /// Creates an anonymous mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an access token.
    pub fn with_token(mut self, token: AccessToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Registers a response for a method and path.
    pub fn register(&self, method: Method, path: &str, response: MockResponse) {
        let key = format!("{}:{}", method, path);
        self.responses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push_back(response);
    }

    /// Registers a GET response.
    pub fn on_get(&self, path: &str, response: MockResponse) {
        self.register(Method::GET, path, response);
    }

    /// Registers a POST response.
    pub fn on_post(&self, path: &str, response: MockResponse) {
        self.register(Method::POST, path, response);
    }

    /// Registers a DELETE response.
    pub fn on_delete(&self, path: &str, response: MockResponse) {
        self.register(Method::DELETE, path, response);
    }

    /// Gets all recorded requests.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Gets the count of requests made.
    pub fn request_count(&self) -> usize {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Gets the count of requests made with a method.
    pub fn count(&self, method: Method) -> usize {
        self.requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    fn respond(&self, method: Method, uri: &Url, body: Option<&Value>) -> ForgeResult<Resource> {
        self.requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockRequest {
                method: method.clone(),
                uri: uri.clone(),
                body: body.cloned(),
            });

        let key = format!("{}:{}", method, route_key(uri));
        let response = self
            .responses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&key)
            .and_then(VecDeque::pop_front);

        match response {
            Some(MockResponse {
                transport_error: Some(message),
                ..
            }) => Err(ForgeError::transport(message).with_endpoint(uri.as_str())),
            Some(response) => {
                Ok(Resource::new(response.status, response.body).with_headers(response.headers))
            }
            None => Ok(Resource::new(404, Value::Null)),
        }
    }
}

#[async_trait]
impl JsonResources for MockJsonResources {
    fn access_token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }

    async fn get(&self, uri: &Url) -> ForgeResult<Resource> {
        self.respond(Method::GET, uri, None)
    }

    async fn post(&self, uri: &Url, body: &Value) -> ForgeResult<Resource> {
        self.respond(Method::POST, uri, Some(body))
    }

    async fn patch(&self, uri: &Url, body: &Value) -> ForgeResult<Resource> {
        self.respond(Method::PATCH, uri, Some(body))
    }

    async fn delete(&self, uri: &Url) -> ForgeResult<Resource> {
        self.respond(Method::DELETE, uri, None)
    }
}

fn route_key(uri: &Url) -> String {
    match uri.query() {
        Some(query) => format!("{}?{}", uri.path(), query),
        None => uri.path().to_string(),
    }
}

/// [`Storage`] over a map of registered projects.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    projects: Arc<RwLock<HashMap<ProjectKey, Arc<Project>>>>,
}

impl InMemoryStorage {
    /// Creates empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a project, replacing any with the same key.
    pub fn register(&self, project: Project) -> Arc<Project> {
        let project = Arc::new(project);
        self.projects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(project.key().clone(), Arc::clone(&project));
        project
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn project(
        &self,
        repo_full_name: &str,
        provider: Provider,
    ) -> ForgeResult<Option<Arc<Project>>> {
        let key = ProjectKey::new(repo_full_name, provider);
        Ok(self
            .projects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned())
    }
}

/// [`ProjectManager`] that accepts every event and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProjectManager;

#[async_trait]
impl ProjectManager for NoopProjectManager {
    async fn new_project(&self, _event: &Event) -> ForgeResult<()> {
        Ok(())
    }

    async fn new_issue(&self, _event: &Event) -> ForgeResult<()> {
        Ok(())
    }

    async fn reopened_issue(&self, _event: &Event) -> ForgeResult<()> {
        Ok(())
    }

    async fn unassigned_tasks(&self, _event: &Event) -> ForgeResult<()> {
        Ok(())
    }

    async fn assigned_tasks(&self, _event: &Event) -> ForgeResult<()> {
        Ok(())
    }

    async fn comment(&self, _event: &Event) -> ForgeResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_responses_are_consumed_in_order() {
        let mock = MockJsonResources::new();
        mock.on_get("/a", MockResponse::ok(json!([1])));
        mock.on_get("/a", MockResponse::status(500));
        let uri = Url::parse("https://example.com/a").unwrap();

        assert_eq!(mock.get(&uri).await.unwrap().status_code(), 200);
        assert_eq!(mock.get(&uri).await.unwrap().status_code(), 500);
        assert_eq!(mock.get(&uri).await.unwrap().status_code(), 404);
        assert_eq!(mock.count(Method::GET), 3);
    }

    #[tokio::test]
    async fn test_post_body_is_recorded() {
        let mock = MockJsonResources::new();
        mock.on_post("/hooks", MockResponse::created(json!({ "id": 1 })));
        let uri = Url::parse("https://example.com/hooks").unwrap();

        mock.post(&uri, &json!({ "url": "x" })).await.unwrap();
        let requests = mock.requests();
        assert_eq!(requests[0].body, Some(json!({ "url": "x" })));
        assert_eq!(requests[0].path_and_query(), "/hooks");
    }
}
