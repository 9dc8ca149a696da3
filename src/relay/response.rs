//! Response envelopes for the relay API.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

/// Error envelope: `{"code": 400, "message": "..."}`.
#[derive(Debug, Serialize)]
pub struct HttpErrorResp {
    pub code: u16,
    pub message: String,
}

/// Plain message envelope: `{"message": "..."}`.
#[derive(Debug, Serialize)]
pub struct HttpMessageResp {
    pub message: String,
}

/// Health endpoint body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub requests: u64,
}

/// Serialize `body` as JSON with `status`.
///
/// Encoding failures are logged and answered with an empty 500.
pub fn respond<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (status, [(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => {
            error!(error = %e, "Couldn't write response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn respond_error(status: StatusCode, message: impl Into<String>) -> Response {
    respond(
        status,
        &HttpErrorResp {
            code: status.as_u16(),
            message: message.into(),
        },
    )
}

pub fn respond_ok<T: Serialize>(body: &T) -> Response {
    respond(StatusCode::OK, body)
}

pub fn respond_msg(status: StatusCode, message: impl Into<String>) -> Response {
    respond(
        status,
        &HttpMessageResp {
            message: message.into(),
        },
    )
}
