//! HTTP client for a remote `/api/database/query` endpoint.
//!
//! Lets tools (and a second API instance) run SQL through another
//! deployment's proxy. Remote servers answer in several shapes; every one is
//! normalised to a plain list of row objects.

use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RemoteQueryError {
    #[error("failed to reach query endpoint: {0}")]
    Http(#[from] reqwest::Error),

    #[error("query endpoint returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The endpoint answered with an `{"error": ...}` body.
    #[error("remote query failed: {0}")]
    Remote(String),

    #[error("unexpected response shape: {0}")]
    Malformed(String),
}

#[derive(Debug, Serialize)]
struct RemoteQueryRequest<'a> {
    sql: &'a str,
    params: &'a [JsonValue],
}

/// Posts `{sql, params}` to a remote query endpoint with a bearer token.
#[derive(Debug, Clone)]
pub struct RemoteQueryClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl RemoteQueryClient {
    /// `base_url` is the server root; the query path is appended.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, RemoteQueryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/database/query", base_url.trim_end_matches('/')),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn query(
        &self,
        sql: &str,
        params: &[JsonValue],
    ) -> Result<Vec<Map<String, JsonValue>>, RemoteQueryError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&RemoteQueryRequest { sql, params });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body: JsonValue = response.json().await.unwrap_or(JsonValue::Null);

        if !status.is_success() {
            return Err(RemoteQueryError::Status {
                status: status.as_u16(),
                message: error_message(&body).unwrap_or_else(|| status.to_string()),
            });
        }

        let rows = normalize_response(body)?;
        debug!(endpoint = %self.endpoint, rows = rows.len(), "remote query completed");
        Ok(rows)
    }
}

fn error_message(body: &JsonValue) -> Option<String> {
    let obj = body.as_object()?;
    ["message", "error"]
        .iter()
        .find_map(|key| obj.get(*key))
        .map(|v| match v {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })
}

/// Normalise the accepted response shapes into rows.
///
/// Accepts a bare array, `{ "rows": [...] }` or `{ "data": [...] }`. An
/// `error` member always wins and becomes [`RemoteQueryError::Remote`].
pub fn normalize_response(body: JsonValue) -> Result<Vec<Map<String, JsonValue>>, RemoteQueryError> {
    let rows = match body {
        JsonValue::Array(rows) => rows,
        JsonValue::Object(mut obj) => {
            if let Some(err) = obj.get("error").filter(|e| !e.is_null()) {
                let message = match err {
                    JsonValue::String(s) => s.clone(),
                    other => error_message(other).unwrap_or_else(|| other.to_string()),
                };
                return Err(RemoteQueryError::Remote(message));
            }
            match obj.remove("rows").or_else(|| obj.remove("data")) {
                Some(JsonValue::Array(rows)) => rows,
                Some(JsonValue::Null) => Vec::new(),
                Some(other) => {
                    return Err(RemoteQueryError::Malformed(format!(
                        "rows must be an array, got {other}"
                    )));
                }
                None => {
                    return Err(RemoteQueryError::Malformed(
                        "expected `rows` or `data`".to_string(),
                    ));
                }
            }
        }
        JsonValue::Null => Vec::new(),
        other => {
            return Err(RemoteQueryError::Malformed(format!(
                "expected an array or object, got {other}"
            )));
        }
    };

    rows.into_iter()
        .map(|row| match row {
            JsonValue::Object(map) => Ok(map),
            other => Err(RemoteQueryError::Malformed(format!(
                "row is not an object: {other}"
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_every_known_shape() {
        let bare = normalize_response(json!([{"id": 1}])).unwrap();
        let rows = normalize_response(json!({"rows": [{"id": 1}], "row_count": 1})).unwrap();
        let data = normalize_response(json!({"data": [{"id": 1}]})).unwrap();
        assert_eq!(bare, rows);
        assert_eq!(rows, data);
        assert_eq!(bare[0]["id"], json!(1));
        assert!(normalize_response(json!({"rows": null})).unwrap().is_empty());
    }

    #[test]
    fn error_member_wins() {
        let err = normalize_response(json!({"error": "relation missing", "rows": []})).unwrap_err();
        assert!(matches!(err, RemoteQueryError::Remote(m) if m == "relation missing"));

        let nested = normalize_response(json!({"error": {"message": "boom"}})).unwrap_err();
        assert!(matches!(nested, RemoteQueryError::Remote(m) if m == "boom"));
    }

    #[test]
    fn rejects_non_object_rows() {
        assert!(matches!(
            normalize_response(json!([1, 2])),
            Err(RemoteQueryError::Malformed(_))
        ));
        assert!(matches!(
            normalize_response(json!("rows")),
            Err(RemoteQueryError::Malformed(_))
        ));
    }

    #[test]
    fn endpoint_is_derived_from_base_url() {
        let client = RemoteQueryClient::new("http://db.internal:8080/", None).unwrap();
        assert_eq!(client.endpoint(), "http://db.internal:8080/api/database/query");
    }
}
