//! The JSON payload answered on every fetch call
//!
//! Errors are reported in-band: the transport status is always 200 and the
//! payload is either `{"error": ...}` or `{"page": ..., "items"?: [...]}`.

use crate::extraction::Item;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    Error {
        error: String,
    },
    Page {
        page: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        items: Option<Vec<Item>>,
    },
}

impl ResponsePayload {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn page(page: String, items: Option<Vec<Item>>) -> Self {
        Self::Page { page, items }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Serializes the payload to JSON bytes
    pub fn to_json(&self) -> Vec<u8> {
        match serde_json::to_vec(self) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("failed to serialize response payload: {}", e);
                br#"{"error":"unexpected internal error: response serialization failed"}"#.to_vec()
            }
        }
    }
}

impl IntoResponse for ResponsePayload {
    /// Writes the JSON body with its content type and exact byte length
    fn into_response(self) -> Response {
        let body = self.to_json();
        let length = HeaderValue::from(body.len());

        let mut response = (StatusCode::OK, body).into_response();
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_LENGTH, length);
        response
    }
}
