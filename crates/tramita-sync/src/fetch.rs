//! Rate-limit aware requests and `next`-link pagination.
//!
//! Both upstream APIs answer HTTP 429 when pushed too hard. The [`Fetcher`]
//! retries the identical request with exponential backoff until it gets any
//! other status, and hands that response back uninterpreted. Pagination
//! follows the chamber API envelope: `{"dados": [...], "links": [{"rel":
//! "next", "href": ...}]}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::FetchError;

const RATE_LIMITED: u16 = 429;

/// A request: URL, headers, and query parameters. A request with form
/// fields is sent as a POST, any other as a GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
    pub basic_auth: Option<(String, String)>,
}

impl Request {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            params: Vec::new(),
            form: Vec::new(),
            basic_auth: None,
        }
    }

    /// A request that asks for JSON.
    pub fn json(url: impl Into<String>) -> Self {
        Self::new(url).header("Accept", "application/json")
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    pub fn form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }

    pub fn is_post(&self) -> bool {
        !self.form.is_empty()
    }
}

/// Status and body of a response, as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == RATE_LIMITED
    }

    pub fn error_for_status(self) -> Result<Self, FetchError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(FetchError::Server {
                status: self.status,
                body: self.body,
            })
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FetchError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Sends one request. Implemented over `reqwest` for real runs and over
/// scripted responses in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response, FetchError>;
}

#[cfg(feature = "http")]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl ReqwestTransport {
    /// Transport whose requests give up after `timeout`.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &Request) -> Result<Response, FetchError> {
        let mut builder = if request.is_post() {
            self.client.post(&request.url).form(&request.form)
        } else {
            self.client.get(&request.url)
        };
        if let Some((user, password)) = &request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(Response { status, body })
    }
}

/// How long to wait between rate-limited attempts, and for how long to keep
/// trying.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Wait after the first rate-limited attempt; doubled after each one.
    pub base: Duration,
    /// Ceiling for a single wait.
    pub max_backoff: Duration,
    /// Total attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Add up to a quarter of the wait at random.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            max_attempts: Some(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Retry forever, with no jitter.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            jitter: false,
            ..Self::default()
        }
    }

    fn wait(&self, backoff: Duration) -> Duration {
        if !self.jitter {
            return backoff;
        }
        let quarter = backoff.as_millis() as u64 / 4;
        backoff + Duration::from_millis(rand::rng().random_range(0..=quarter))
    }
}

/// Progress of one request through a [`RetryPolicy`].
struct Backoff<'a> {
    policy: &'a RetryPolicy,
    next: Duration,
    attempts: u32,
}

impl<'a> Backoff<'a> {
    fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            next: policy.base,
            attempts: 0,
        }
    }

    /// Count a rate-limited attempt and return the wait before the next
    /// one, or `None` once the ceiling is reached.
    fn rate_limited(&mut self) -> Option<Duration> {
        self.attempts += 1;
        if let Some(max) = self.policy.max_attempts
            && self.attempts >= max
        {
            return None;
        }
        let wait = self.policy.wait(self.next);
        self.next = (self.next * 2).min(self.policy.max_backoff);
        Some(wait)
    }
}

/// Envelope of every chamber API response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub dados: T,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

impl<T> Envelope<T> {
    /// The `next` page link, absent on the last page.
    pub fn next_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == "next")
            .map(|link| link.href.as_str())
    }
}

#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `request`, waiting out rate limiting.
    ///
    /// Any status other than 429 is returned as-is. Network failures are
    /// not retried.
    pub async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let mut backoff = Backoff::new(&self.policy);
        loop {
            let response = self.transport.send(request).await?;
            if !response.is_rate_limited() {
                return Ok(response);
            }
            let Some(wait) = backoff.rate_limited() else {
                return Err(FetchError::RateLimited {
                    url: request.url.clone(),
                    attempts: backoff.attempts,
                });
            };

            warn!(
                url = %request.url,
                attempt = backoff.attempts,
                wait_ms = wait.as_millis() as u64,
                "rate limited (429), backing off"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Fetch and decode a successful JSON response.
    pub async fn fetch_json<T: DeserializeOwned>(&self, request: &Request) -> Result<T, FetchError> {
        self.fetch(request).await?.error_for_status()?.json()
    }

    /// Fetch every page of a paginated collection and concatenate `dados`.
    ///
    /// The first request carries the caller's parameters; the `next` links
    /// already embed the query and are followed verbatim.
    pub async fn fetch_all_pages(
        &self,
        request: &Request,
    ) -> Result<Vec<serde_json::Value>, FetchError> {
        let mut items = Vec::new();
        let mut next = Some(request.clone());
        let mut page = 1;

        while let Some(current) = next.take() {
            debug!(url = %current.url, page, "requesting page");
            let envelope: Envelope<Vec<serde_json::Value>> = self.fetch_json(&current).await?;
            next = envelope.next_link().map(|href| Request {
                headers: request.headers.clone(),
                ..Request::new(href)
            });
            items.extend(envelope.dados);
            page += 1;
        }

        info!(url = %request.url, pages = page - 1, count = items.len(), "fetched collection");
        Ok(items)
    }
}
