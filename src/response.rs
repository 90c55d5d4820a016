//! Uniform response envelope returned by every service operation.

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use std::collections::BTreeMap;

/// The result of a resource operation: a JSON body, a status code and a set
/// of response headers. Errors are plain envelopes too (`{"message": ...}`
/// with a 4xx/5xx code), so the HTTP layer only ever serializes one shape.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub body: Value,
    pub code: StatusCode,
    pub headers: BTreeMap<String, String>,
}

impl Envelope {
    pub fn ok(body: Value) -> Self {
        Envelope { body, code: StatusCode::OK, headers: BTreeMap::new() }
    }

    pub fn with_status(body: Value, code: StatusCode) -> Self {
        Envelope { body, code, headers: BTreeMap::new() }
    }

    pub fn no_content() -> Self {
        Envelope { body: Value::Null, code: StatusCode::NO_CONTENT, headers: BTreeMap::new() }
    }

    /// An `{"message": ...}` body with the given status code.
    pub fn message(code: StatusCode, message: String) -> Self {
        Envelope::with_status(serde_json::json!({ "message": message }), code)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.headers.insert(name.into(), value.to_string());
        self
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let mut response = if self.code == StatusCode::NO_CONTENT {
            StatusCode::NO_CONTENT.into_response()
        } else {
            (self.code, Json(self.body)).into_response()
        };
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                response.headers_mut().insert(name, value);
            }
        }
        response
    }
}
