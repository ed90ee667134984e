//! Remote requests
//!
//! A [`Request`] is a method, a path relative to the configured base URL, a
//! query and an optional payload. Sending one yields a [`PendingRequest`]
//! that settles with the parsed response body or a normalized
//! [`ResponseError`]. Requests can also be handed to a [`Batch`] instead of
//! being sent on their own.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::batch::Batch;
use crate::client::Client;
use crate::error::{ModelError, ModelResult, ResponseError};
use crate::query::{append_expand, to_query_string, Query};
use crate::transport::TransportRequest;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response caching for GET requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Always hit the network
    #[default]
    None,
    /// Keep responses in memory, keyed by URL
    Memory,
    /// Keep responses in memory and in the durable store
    Persist,
}

/// Everything needed to describe one request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestConfig {
    pub method: Method,
    /// Overrides the client's base URL
    pub base: Option<String>,
    pub path: String,
    pub query: Query,
    pub payload: Option<Value>,
    pub cache: CacheMode,
}

impl RequestConfig {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            base: None,
            path: path.into(),
            query: Query::new(),
            payload: None,
            cache: CacheMode::None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query.extend(query);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    /// Apply per-call options on top of these defaults.
    ///
    /// Option query parameters override defaults with the same name; the
    /// `expand` list is appended to the query.
    pub fn merge(mut self, options: &RequestOptions<'_>) -> Self {
        self.query.extend(options.query.clone());
        append_expand(&mut self.query, &options.expand);
        if let Some(cache) = options.cache {
            self.cache = cache;
        }
        self
    }
}

/// Per-call request options
#[derive(Clone, Default)]
pub struct RequestOptions<'a> {
    pub query: Query,
    /// Relation keys the server should embed in the response
    pub expand: Vec<String>,
    /// Route the request through a batch instead of sending it
    pub batch: Option<&'a Batch>,
    pub cache: Option<CacheMode>,
}

impl<'a> RequestOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn expand(mut self, key: impl Into<String>) -> Self {
        self.expand.push(key.into());
        self
    }

    pub fn batch(mut self, batch: &'a Batch) -> Self {
        self.batch = Some(batch);
        self
    }

    pub fn cache(mut self, cache: CacheMode) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl fmt::Debug for RequestOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("query", &self.query)
            .field("expand", &self.expand)
            .field("batched", &self.batch.is_some())
            .field("cache", &self.cache)
            .finish()
    }
}

/// A single remote request
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    config: RequestConfig,
}

impl Request {
    pub fn new(config: RequestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    pub fn method(&self) -> Method {
        self.config.method
    }

    /// Base URL, path and encoded query
    pub fn url(&self, client: &Client) -> String {
        let base = self
            .config
            .base
            .as_deref()
            .unwrap_or(client.config().get_base_url());
        let query = to_query_string(&self.config.query);

        if query.is_empty() {
            format!("{}{}", base, self.config.path)
        } else {
            format!("{}{}?{}", base, self.config.path, query)
        }
    }

    /// Descriptor of this request as it appears inside a batch body
    pub fn to_json(&self) -> Value {
        json!({
            "method": self.config.method,
            "path": self.config.path,
            "query": self.config.query,
            "payload": self.config.payload,
        })
    }

    /// Start the exchange.
    ///
    /// Inside a Tokio runtime the request is spawned right away and runs even
    /// if the returned handle is dropped. Outside of one it starts when the
    /// handle is first polled.
    pub fn send(self, client: &Client) -> PendingRequest {
        let client = client.clone();
        let future = async move { self.execute(&client).await }.boxed();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => PendingRequest::spawned(runtime.spawn(future)),
            Err(_) => PendingRequest::lazy(future),
        }
    }

    /// Send this request, or add it to `batch` when one is given
    pub fn dispatch(self, client: &Client, batch: Option<&Batch>) -> PendingRequest {
        match batch {
            Some(batch) => batch.add(self),
            None => self.send(client),
        }
    }

    /// Perform the exchange: cache lookup, retries and error normalization
    pub async fn execute(&self, client: &Client) -> ModelResult<Value> {
        let url = self.url(client);
        let cacheable = self.config.method == Method::Get && self.config.cache != CacheMode::None;

        if cacheable {
            if let Some(hit) = self.cached_response(client, &url)? {
                debug!("Serving {} {} from the response cache", self.config.method, url);
                return Ok(hit);
            }
        }

        let retry = client.config().get_retry();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!("{} {} (attempt {})", self.config.method, url, attempt);

            let response = client
                .transport()
                .send(TransportRequest {
                    method: self.config.method,
                    url: url.clone(),
                    data: self.config.payload.clone(),
                })
                .await?;

            if response.is_success() {
                let data = response.data.ok_or_else(|| {
                    ResponseError::invalid(
                        Some(response.status),
                        format!("{} {} returned a body that is not JSON", self.config.method, url),
                    )
                })?;

                if cacheable {
                    self.store_response(client, &url, &data)?;
                }

                return Ok(data);
            }

            if retry.should_retry(response.status, attempt) {
                let delay = retry.delay_for(attempt);
                warn!(
                    "{} {} answered {}, retrying in {:?} (attempt {}/{})",
                    self.config.method,
                    url,
                    response.status,
                    delay,
                    attempt,
                    retry.max_retries
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let error = ResponseError::from_body(Some(response.status), response.data);
            debug!("{} {} failed: {}", self.config.method, url, error);
            return Err(error.into());
        }
    }

    fn cached_response(&self, client: &Client, url: &str) -> ModelResult<Option<Value>> {
        match self.config.cache {
            CacheMode::None => Ok(None),
            CacheMode::Memory => Ok(client.responses().get(url)),
            CacheMode::Persist => Ok(client.responses().get_persisted(url)?),
        }
    }

    fn store_response(&self, client: &Client, url: &str, data: &Value) -> ModelResult<()> {
        match self.config.cache {
            CacheMode::None => {}
            CacheMode::Memory => {
                client.responses().put(url, data.clone());
            }
            CacheMode::Persist => {
                client.responses().put_persisted(url, data.clone())?;
            }
        }
        Ok(())
    }
}

enum PendingState {
    Lazy(BoxFuture<'static, ModelResult<Value>>),
    Spawned(JoinHandle<ModelResult<Value>>),
    Deferred(oneshot::Receiver<ModelResult<Value>>),
    Ready(Option<ModelResult<Value>>),
}

/// Handle to an in-flight request; resolves to the response body
pub struct PendingRequest {
    state: PendingState,
}

impl PendingRequest {
    pub(crate) fn lazy(future: BoxFuture<'static, ModelResult<Value>>) -> Self {
        Self {
            state: PendingState::Lazy(future),
        }
    }

    pub(crate) fn spawned(handle: JoinHandle<ModelResult<Value>>) -> Self {
        Self {
            state: PendingState::Spawned(handle),
        }
    }

    /// Settled later by whoever holds the sender
    pub(crate) fn deferred(receiver: oneshot::Receiver<ModelResult<Value>>) -> Self {
        Self {
            state: PendingState::Deferred(receiver),
        }
    }

    /// Already settled
    pub fn ready(result: ModelResult<Value>) -> Self {
        Self {
            state: PendingState::Ready(Some(result)),
        }
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            PendingState::Lazy(_) => "lazy",
            PendingState::Spawned(_) => "spawned",
            PendingState::Deferred(_) => "deferred",
            PendingState::Ready(_) => "ready",
        };
        f.debug_struct("PendingRequest").field("state", &state).finish()
    }
}

impl Future for PendingRequest {
    type Output = ModelResult<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match &mut this.state {
            PendingState::Lazy(future) => future.as_mut().poll(cx),
            PendingState::Spawned(handle) => match Pin::new(handle).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(e)) => Poll::Ready(Err(ModelError::Response(ResponseError::invalid(
                    None,
                    format!("request task failed: {}", e),
                )))),
                Poll::Pending => Poll::Pending,
            },
            PendingState::Deferred(receiver) => match Pin::new(receiver).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => Poll::Ready(Err(ModelError::Response(ResponseError::invalid(
                    None,
                    "request was dropped before it was settled",
                )))),
                Poll::Pending => Poll::Pending,
            },
            PendingState::Ready(result) => Poll::Ready(result.take().unwrap_or_else(|| {
                Err(ModelError::Configuration(
                    "pending request polled after completion".to_string(),
                ))
            })),
        }
    }
}
