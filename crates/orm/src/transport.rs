//! HTTP transport collaborator
//!
//! The model layer never talks to the network directly; it hands a
//! [`TransportRequest`] to a [`Transport`] and gets back a status and a
//! parsed body. [`ReqwestTransport`] is the production implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::config::ConvexConfig;
use crate::error::{ModelError, ModelResult};
use crate::request::Method;

/// One outgoing HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub data: Option<Value>,
}

/// The raw outcome of an HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// Parsed JSON body; `Value::Null` for an empty body, `None` when the
    /// body was present but not JSON
    pub data: Option<Value>,
}

impl TransportResponse {
    /// A response with a JSON body
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            data: Some(data),
        }
    }

    /// A response whose body could not be parsed
    pub fn malformed(status: u16) -> Self {
        Self { status, data: None }
    }

    /// Check for a 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests on behalf of the model layer
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the exchange.
    ///
    /// Only failures to obtain a response at all are errors; non-2xx
    /// statuses are returned as responses.
    async fn send(&self, request: TransportRequest) -> ModelResult<TransportResponse>;
}

/// Transport backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport using the configured timeout
    pub fn new(config: &ConvexConfig) -> ModelResult<Self> {
        let client = Client::builder()
            .timeout(*config.get_timeout())
            .build()
            .map_err(|e| {
                ModelError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> ModelResult<TransportResponse> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        if let Some(data) = &request.data {
            builder = builder.json(data);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        let data = if body.is_empty() {
            Some(Value::Null)
        } else {
            match serde_json::from_slice(&body) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::debug!("Non-JSON response body from {}: {}", request.url, e);
                    None
                }
            }
        };

        Ok(TransportResponse { status, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_range() {
        assert!(TransportResponse::new(200, json!({})).is_success());
        assert!(TransportResponse::new(204, Value::Null).is_success());
        assert!(!TransportResponse::new(404, json!({})).is_success());
        assert!(!TransportResponse::malformed(500).is_success());
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new(&ConvexConfig::testing()).is_ok());
    }
}
