//! Request batching
//!
//! A [`Batch`] captures requests instead of sending them and later ships
//! all of them to the batch endpoint in one POST. The N-th response entry
//! settles the N-th captured request.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::client::Client;
use crate::error::{ModelError, ModelResult, ResponseError};
use crate::request::{PendingRequest, Request, RequestConfig};

struct BatchEntry {
    request: Request,
    sender: oneshot::Sender<ModelResult<Value>>,
}

impl BatchEntry {
    /// Settle with one element of the batch response
    fn fulfill(self, response: Option<Value>) {
        let result: ModelResult<Value> = match response {
            Some(response) if response.get("error").is_some() => {
                let status = response
                    .get("statusCode")
                    .and_then(Value::as_u64)
                    .and_then(|status| u16::try_from(status).ok());
                Err(ResponseError::from_body(status, Some(response)).into())
            }
            Some(response) => Ok(response),
            None => Err(ResponseError::invalid(
                None,
                "batch response has no entry for this request",
            )
            .into()),
        };

        // The receiver may have been dropped; nobody is waiting then.
        let _ = self.sender.send(result);
    }

    fn reject(self, error: ModelError) {
        let _ = self.sender.send(Err(error));
    }
}

/// A group of requests sent to the server in one round trip
pub struct Batch {
    client: Client,
    parallel: AtomicBool,
    entries: Mutex<Vec<BatchEntry>>,
}

impl Batch {
    pub fn new(client: &Client) -> Self {
        Self {
            client: client.clone(),
            parallel: AtomicBool::new(true),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Whether the server may run the requests concurrently; on by default
    pub fn parallel(&self) -> bool {
        self.parallel.load(Ordering::Relaxed)
    }

    pub fn set_parallel(&self, parallel: bool) -> &Self {
        self.parallel.store(parallel, Ordering::Relaxed);
        self
    }

    /// Capture a request; the returned handle settles when the batch is processed
    pub fn add(&self, request: Request) -> PendingRequest {
        let (sender, receiver) = oneshot::channel();
        let mut entries = self.entries.lock();
        debug!(
            "Batched {} {} as request #{}",
            request.method(),
            request.config().path,
            entries.len()
        );
        entries.push(BatchEntry { request, sender });
        PendingRequest::deferred(receiver)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Batch body: `{ requests: [...], parallel }`
    pub fn to_json(&self) -> Value {
        let entries = self.entries.lock();
        Self::body(&entries, self.parallel())
    }

    fn body(entries: &[BatchEntry], parallel: bool) -> Value {
        let requests: Vec<Value> = entries.iter().map(|entry| entry.request.to_json()).collect();
        json!({
            "requests": requests,
            "parallel": parallel,
        })
    }

    /// Send every captured request in one POST and settle each of them.
    ///
    /// A failure of the batch request itself rejects every captured request
    /// with that error and is returned. Per-request failures only reject
    /// their own handle. An empty batch completes without any I/O.
    pub async fn process(&self) -> ModelResult<()> {
        let entries: Vec<BatchEntry> = std::mem::take(&mut *self.entries.lock());

        if entries.is_empty() {
            debug!("Skipping empty batch");
            return Ok(());
        }

        let body = Self::body(&entries, self.parallel());
        let request = Request::new(
            RequestConfig::post(self.client.config().get_batch_path().clone()).with_payload(body),
        );

        debug!("Processing batch of {} requests", entries.len());

        match request.execute(&self.client).await {
            Ok(Value::Array(responses)) => {
                if responses.len() != entries.len() {
                    warn!(
                        "Batch returned {} responses for {} requests",
                        responses.len(),
                        entries.len()
                    );
                }

                let mut responses = responses.into_iter();
                for entry in entries {
                    entry.fulfill(responses.next());
                }
                Ok(())
            }
            Ok(other) => {
                let error: ModelError = ResponseError::invalid(
                    None,
                    format!("batch response must be an array, got {}", other),
                )
                .into();
                for entry in entries {
                    entry.reject(error.clone());
                }
                Err(error)
            }
            Err(error) => {
                warn!("Batch request failed: {}", error);
                for entry in entries {
                    entry.reject(error.clone());
                }
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("requests", &self.len())
            .field("parallel", &self.parallel())
            .finish()
    }
}
