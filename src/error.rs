//! Error types for the request pipeline.
//!
//! `RequestError` covers everything that is rejected before a stream starts
//! and renders as a plain HTTP error. Failures after that point never reach
//! the client as HTTP errors; they become terminal wire events.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("missing or invalid API key")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            RequestError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            RequestError::Validation(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
                code,
            }),
        )
            .into_response()
    }
}

/// The agent run cannot continue.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("inference request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inference API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("inference stream error: {0}")]
    Stream(String),

    #[error("malformed inference event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("exceeded {0} agent turns without a final answer")]
    TurnLimit(usize),

    #[error("agent run cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// A single tool invocation failed; reported back to the model.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] serde_json::Error),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("market data request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Data(String),

    #[error("tool not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_map_to_client_statuses() {
        let response = RequestError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = RequestError::Validation("query must not be empty".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn tool_not_found_names_the_tool() {
        let err = ToolError::NotFound("lookup".into());
        assert_eq!(err.to_string(), "tool not found: lookup");
    }
}
