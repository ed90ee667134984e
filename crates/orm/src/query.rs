//! Query-string parameters
//!
//! Queries are plain JSON objects. Arrays become repeated parameters, which
//! is also how relation expansion (`expand=a&expand=b`) is encoded.

use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::error::{ModelError, ModelResult};

/// Query-string parameters keyed by name
pub type Query = Map<String, Value>;

/// Parameter name for relation expansion
pub const EXPAND_PARAM: &str = "expand";

/// Accept `null` (no query) or a JSON object
pub fn query_from(value: Value) -> ModelResult<Query> {
    match value {
        Value::Null => Ok(Query::new()),
        Value::Object(query) => Ok(query),
        other => Err(ModelError::Validation(format!(
            "query must be a JSON object, got {}",
            other
        ))),
    }
}

/// Append relation keys to the `expand` parameter
pub fn append_expand(query: &mut Query, expand: &[String]) {
    if expand.is_empty() {
        return;
    }

    let mut values = match query.remove(EXPAND_PARAM) {
        Some(Value::Array(values)) => values,
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single],
    };

    for key in expand {
        let key = Value::String(key.clone());
        if !values.contains(&key) {
            values.push(key);
        }
    }

    query.insert(EXPAND_PARAM.to_string(), Value::Array(values));
}

/// Encode a query as `application/x-www-form-urlencoded`
pub fn to_query_string(query: &Query) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());

    for (key, value) in query {
        match value {
            Value::Array(values) => {
                for value in values {
                    if let Some(encoded) = scalar(value) {
                        serializer.append_pair(key, &encoded);
                    }
                }
            }
            other => {
                if let Some(encoded) = scalar(other) {
                    serializer.append_pair(key, &encoded);
                }
            }
        }
    }

    serializer.finish()
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_string_encoding() {
        let query = query_from(json!({
            "name": "Ben Drucker",
            "age": 30,
            "active": true,
            "missing": null,
        }))
        .unwrap();

        assert_eq!(
            to_query_string(&query),
            "active=true&age=30&name=Ben+Drucker"
        );
    }

    #[test]
    fn test_expand_is_repeated() {
        let mut query = Query::new();
        append_expand(&mut query, &["user".to_string(), "comments".to_string()]);
        append_expand(&mut query, &["user".to_string()]);

        assert_eq!(query[EXPAND_PARAM], json!(["user", "comments"]));
        assert_eq!(to_query_string(&query), "expand=user&expand=comments");
    }

    #[test]
    fn test_query_from_rejects_scalars() {
        assert!(query_from(Value::Null).unwrap().is_empty());
        assert!(query_from(json!("name=ben")).is_err());
    }
}
