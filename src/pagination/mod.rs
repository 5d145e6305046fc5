//! Lazy iteration over paginated provider collections.

use crate::client::{JsonResources, Resource};
use crate::config::DEFAULT_MAX_PAGES;
use crate::errors::{ForgeError, ForgeResult};
use crate::resilience::RetryPolicy;
use futures::Stream;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use url::Url;

/// Pagination links parsed from Link header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationLinks {
    /// URL for the next page.
    pub next: Option<String>,
    /// URL for the previous page.
    pub prev: Option<String>,
    /// URL for the first page.
    pub first: Option<String>,
    /// URL for the last page.
    pub last: Option<String>,
}

impl PaginationLinks {
    /// Parses pagination links from the Link header (RFC 8288).
    pub fn from_header(header_value: &str) -> Self {
        let mut links = Self::default();

        for part in header_value.split(',') {
            let mut url = None;
            let mut rel = None;

            for segment in part.split(';').map(str::trim) {
                if let Some(inner) = segment.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
                    url = Some(inner.to_string());
                } else if let Some(value) = segment.strip_prefix("rel=") {
                    rel = Some(value.trim_matches('"').to_string());
                }
            }

            if let (Some(url), Some(rel)) = (url, rel) {
                match rel.as_str() {
                    "next" => links.next = Some(url),
                    "prev" => links.prev = Some(url),
                    "first" => links.first = Some(url),
                    "last" => links.last = Some(url),
                    _ => {}
                }
            }
        }

        links
    }

    /// Parses pagination links from response headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get("link")
            .and_then(|v| v.to_str().ok())
            .map(Self::from_header)
            .unwrap_or_default()
    }
}

/// How a provider links one page of a collection to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStrategy {
    /// JSON array body, next page in the `Link: <...>; rel="next"` header (GitHub).
    LinkHeader,
    /// Object body with `values` and an optional `next` URL (Bitbucket).
    /// A bare array body is a single, final page.
    NextField,
    /// JSON array body, `page`/`per_page` query parameters (GitLab).
    /// A page shorter than `per_page` is the last one.
    PageNumber {
        /// Requested page size.
        per_page: u32,
    },
}

type ItemParser<T> = Box<dyn Fn(Value, &Url) -> ForgeResult<T> + Send + Sync>;

/// Lazy, non-restartable sequence over a paginated collection.
///
/// Each page is fetched with exactly one GET when the previous page's items
/// are used up. Items come out in page order, each exactly once. A page
/// URI seen twice, or more pages than the configured maximum, fails with a
/// protocol violation.
pub struct PageIterator<T> {
    resources: Arc<dyn JsonResources>,
    strategy: PageStrategy,
    what: String,
    parse: ItemParser<T>,
    next_uri: Option<Url>,
    page_uri: Url,
    page_number: u32,
    buffer: VecDeque<Value>,
    visited: HashSet<String>,
    max_pages: u32,
    retry: Option<RetryPolicy>,
}

impl<T> std::fmt::Debug for PageIterator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageIterator")
            .field("what", &self.what)
            .field("strategy", &self.strategy)
            .field("next_uri", &self.next_uri.as_ref().map(Url::as_str))
            .field("buffered", &self.buffer.len())
            .field("pages_fetched", &self.visited.len())
            .finish()
    }
}

impl<T> PageIterator<T> {
    /// Creates an iterator starting at `first`.
    ///
    /// `what` completes the sentence "Unable to ..." in error messages,
    /// e.g. "fetch Bitbucket organizations for current User".
    pub fn new<F>(
        resources: Arc<dyn JsonResources>,
        first: Url,
        strategy: PageStrategy,
        what: impl Into<String>,
        parse: F,
    ) -> Self
    where
        F: Fn(Value, &Url) -> ForgeResult<T> + Send + Sync + 'static,
    {
        let first = match strategy {
            PageStrategy::PageNumber { per_page } => with_page_query(&first, 1, per_page),
            _ => first,
        };

        Self {
            resources,
            strategy,
            what: what.into(),
            parse: Box::new(parse),
            page_uri: first.clone(),
            next_uri: Some(first),
            page_number: 1,
            buffer: VecDeque::new(),
            visited: HashSet::new(),
            max_pages: DEFAULT_MAX_PAGES,
            retry: None,
        }
    }

    /// Fails immediately when the underlying resources carry no access token.
    pub fn require_auth(self) -> ForgeResult<Self> {
        if self.resources.access_token().is_none() {
            return Err(ForgeError::unauthenticated());
        }
        Ok(self)
    }

    /// Caps the number of pages fetched.
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Retries page fetches that fail below HTTP semantics.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Gets the description used in error messages.
    pub fn what(&self) -> &str {
        &self.what
    }

    /// Yields the next item, fetching a page when needed.
    pub async fn next(&mut self) -> ForgeResult<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return (self.parse)(item, &self.page_uri).map(Some);
            }
            match self.next_uri.clone() {
                Some(uri) => self.fetch(uri).await?,
                None => return Ok(None),
            }
        }
    }

    /// Drains the iterator into a vector.
    pub async fn collect_all(mut self) -> ForgeResult<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Converts the iterator into a stream of items.
    pub fn into_stream(self) -> impl Stream<Item = ForgeResult<T>> {
        futures::stream::try_unfold(self, |mut pages| async move {
            Ok::<_, ForgeError>(pages.next().await?.map(|item| (item, pages)))
        })
    }

    /// Fetches one page. The cursor only moves once the page is accepted, so
    /// a failed advance is re-issued by the next call.
    async fn fetch(&mut self, uri: Url) -> ForgeResult<()> {
        if self.visited.len() >= self.max_pages as usize {
            return Err(ForgeError::protocol(format!(
                "Unable to {}: more than {} pages",
                self.what, self.max_pages
            ))
            .with_endpoint(uri.as_str()));
        }
        if self.visited.contains(uri.as_str()) {
            return Err(ForgeError::protocol(format!(
                "Unable to {}: page {} was already visited",
                self.what, uri
            ))
            .with_endpoint(uri.as_str()));
        }

        let resources = Arc::clone(&self.resources);
        let resource = match &self.retry {
            Some(policy) => policy.execute(|| resources.get(&uri)).await?,
            None => resources.get(&uri).await?,
        };

        match resource.status_code() {
            200 => {}
            401 => {
                return Err(ForgeError::unauthenticated()
                    .with_status(401)
                    .with_endpoint(uri.as_str()))
            }
            status => {
                return Err(ForgeError::unexpected_status(&self.what, 200, status)
                    .with_endpoint(uri.as_str()))
            }
        }

        let (items, next) = self.split_page(&uri, resource)?;
        tracing::debug!(
            uri = %uri,
            items = items.len(),
            has_next = next.is_some(),
            "Fetched page"
        );

        self.visited.insert(uri.to_string());
        self.buffer.extend(items);
        self.next_uri = next;
        self.page_uri = uri;
        Ok(())
    }

    fn split_page(&mut self, uri: &Url, resource: Resource) -> ForgeResult<(Vec<Value>, Option<Url>)> {
        let links = PaginationLinks::from_headers(resource.headers());
        match (self.strategy, resource.into_json()) {
            (PageStrategy::LinkHeader, Value::Array(items)) => {
                let next = links.next.map(|next| join(uri, &next)).transpose()?;
                Ok((items, next))
            }
            (PageStrategy::NextField, Value::Array(items)) => Ok((items, None)),
            (PageStrategy::NextField, Value::Object(mut page)) => {
                let items = match page.remove("values") {
                    Some(Value::Array(items)) => items,
                    _ => return Err(ForgeError::malformed("values", uri.as_str())),
                };
                let next = match page.remove("next") {
                    Some(Value::String(next)) => Some(join(uri, &next)?),
                    Some(Value::Null) | None => None,
                    Some(_) => return Err(ForgeError::malformed("next", uri.as_str())),
                };
                Ok((items, next))
            }
            (PageStrategy::PageNumber { per_page }, Value::Array(items)) => {
                let next = if items.is_empty() || items.len() < per_page as usize {
                    None
                } else {
                    self.page_number += 1;
                    Some(with_page_query(uri, self.page_number, per_page))
                };
                Ok((items, next))
            }
            (PageStrategy::NextField, _) => Err(ForgeError::malformed("values", uri.as_str())),
            _ => Err(ForgeError::malformed("[]", uri.as_str())),
        }
    }
}

/// Resolves a next-page link against the page it came from.
fn join(base: &Url, next: &str) -> ForgeResult<Url> {
    base.join(next).map_err(|e| {
        ForgeError::protocol(format!("Invalid next page link '{}': {}", next, e))
            .with_endpoint(base.as_str())
    })
}

/// Replaces the `page`/`per_page` query parameters, keeping all others.
fn with_page_query(uri: &Url, page: u32, per_page: u32) -> Url {
    let kept: Vec<(String, String)> = uri
        .query_pairs()
        .filter(|(k, _)| k != "page" && k != "per_page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut next = uri.clone();
    next.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("page", &page.to_string())
        .append_pair("per_page", &per_page.to_string());
    next
}
