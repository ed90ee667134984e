//! Test doubles for the model layer
//!
//! [`MockTransport`] answers requests from a script and records what was
//! sent; [`SequentialIds`] hands out predictable ids.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::client::Client;
use crate::config::ConvexConfig;
use crate::error::{ModelError, ModelResult, ResponseError};
use crate::id::IdGenerator;
use crate::registry::Registry;
use crate::transport::{Transport, TransportRequest, TransportResponse};

/// Transport that replays scripted responses in order
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<ModelResult<TransportResponse>>>,
    sent: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response
    pub fn respond(&self, response: TransportResponse) -> &Self {
        self.script.lock().push_back(Ok(response));
        self
    }

    /// Queue a 200 response with `data` as body
    pub fn respond_ok(&self, data: Value) -> &Self {
        self.respond(TransportResponse::new(200, data))
    }

    /// Queue a failure to reach the server at all
    pub fn fail(&self, error: ModelError) -> &Self {
        self.script.lock().push_back(Err(error));
        self
    }

    /// Every request sent so far
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.sent.lock().clone()
    }

    /// The most recent request
    pub fn last_request(&self) -> Option<TransportRequest> {
        self.sent.lock().last().cloned()
    }

    /// Number of scripted responses not consumed yet
    pub fn pending(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> ModelResult<TransportResponse> {
        let url = request.url.clone();
        self.sent.lock().push(request);

        let next = self.script.lock().pop_front();
        match next {
            Some(result) => result,
            None => Ok(TransportResponse::new(
                404,
                json!({
                    "error": "Not Found",
                    "message": format!("no scripted response for {}", url),
                }),
            )),
        }
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("pending", &self.pending())
            .field("sent", &self.sent.lock().len())
            .finish()
    }
}

/// Ids of the form `{prefix}-1`, `{prefix}-2`, ...
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}

/// A registry backed by a fresh [`MockTransport`] and sequential ids
pub fn mock_registry() -> (Registry, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let client = Client::builder(ConvexConfig::testing())
        .transport(transport.clone())
        .id_generator(Arc::new(SequentialIds::new("tmp")))
        .build()
        .unwrap_or_else(|e| panic!("testing client failed to build: {}", e));
    (Registry::new(client), transport)
}

/// Unwrap a response error or panic
pub fn expect_response_error(error: ModelError) -> ResponseError {
    match error {
        ModelError::Response(response) => response,
        other => panic!("expected a response error, got {:?}", other),
    }
}
