//! Error types for the model layer
//!
//! Provides one error enum for model definition, construction, relation
//! resolution and remote operations, plus the normalized shape every failed
//! HTTP exchange is converted into.

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Error types for model operations
///
/// Errors are `Clone` so that a single failed batch round trip can reject
/// every request it carried.
#[derive(Error, Debug, Clone)]
pub enum ModelError {
    /// Invalid model or client configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A single-result query matched nothing
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Data could not be applied to a model
    #[error("Validation error: {0}")]
    Validation(String),

    /// Relation declaration or resolution failed
    #[error("Relationship error: {0}")]
    Relationship(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Non-2xx, unreachable or malformed HTTP exchange
    #[error("{0}")]
    Response(ResponseError),

    /// Operation attempted on a deleted instance
    #[error("Instance of '{0}' has been deleted")]
    Deleted(String),

    /// Cache or durable storage failure
    #[error("Cache error: {0}")]
    Cache(String),
}

impl ModelError {
    /// Status code of a response error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ModelError::Response(response) => response.status_code,
            _ => None,
        }
    }

    /// Check whether this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::NotFound(_))
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<convex_cache::CacheError> for ModelError {
    fn from(err: convex_cache::CacheError) -> Self {
        ModelError::Cache(err.to_string())
    }
}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        ModelError::Response(ResponseError::invalid(
            err.status().map(|status| status.as_u16()),
            err.to_string(),
        ))
    }
}

impl From<ResponseError> for ModelError {
    fn from(err: ResponseError) -> Self {
        ModelError::Response(err)
    }
}

/// Normalized failed response.
///
/// The server error shape is `{ "error": string, "message"?: string }`. When
/// the body is absent or not in that shape the name falls back to
/// [`ResponseError::INVALID_RESPONSE`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseError {
    /// HTTP-like status code, absent when the request never got a response
    pub status_code: Option<u16>,
    /// Error name reported by the server
    pub name: String,
    /// Human readable message
    pub message: String,
    /// The raw error body (an empty object when there was none)
    pub data: Value,
}

impl ResponseError {
    pub const INVALID_RESPONSE: &'static str = "Invalid Response";

    /// Normalize a status code and an optional JSON body
    pub fn from_body(status_code: Option<u16>, body: Option<Value>) -> Self {
        let data = match body {
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(body) => body,
        };

        let name = data
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or(Self::INVALID_RESPONSE)
            .to_string();

        let message = data
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| name.clone());

        Self {
            status_code,
            name,
            message,
            data,
        }
    }

    /// An "Invalid Response" error with a custom message
    pub fn invalid(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            name: Self::INVALID_RESPONSE.to_string(),
            message: message.into(),
            data: Value::Object(Map::new()),
        }
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "{} ({}): {}", self.name, status, self.message),
            None => write!(f, "{}: {}", self.name, self.message),
        }
    }
}

impl std::error::Error for ResponseError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_error_uses_server_shape() {
        let err = ResponseError::from_body(
            Some(404),
            Some(json!({"error": "Not Found", "message": "No such item"})),
        );
        assert_eq!(err.status_code, Some(404));
        assert_eq!(err.name, "Not Found");
        assert_eq!(err.message, "No such item");
        assert_eq!(err.data["error"], "Not Found");
    }

    #[test]
    fn test_response_error_message_falls_back_to_name() {
        let err = ResponseError::from_body(Some(400), Some(json!({"error": "Bad Request"})));
        assert_eq!(err.message, "Bad Request");
    }

    #[test]
    fn test_response_error_invalid_fallback() {
        let err = ResponseError::from_body(Some(500), None);
        assert_eq!(err.name, ResponseError::INVALID_RESPONSE);
        assert_eq!(err.message, ResponseError::INVALID_RESPONSE);
        assert_eq!(err.data, json!({}));

        let err = ResponseError::from_body(Some(502), Some(json!("gateway exploded")));
        assert_eq!(err.name, ResponseError::INVALID_RESPONSE);
    }

    #[test]
    fn test_model_error_status_code() {
        let err: ModelError = ResponseError::from_body(Some(503), None).into();
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(ModelError::NotFound("items".into()).status_code(), None);
        assert!(ModelError::NotFound("items".into()).is_not_found());
    }
}
