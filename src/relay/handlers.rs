//! HTTP request handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::response::{respond_error, respond_msg, respond_ok, HealthResponse};
use super::RelayState;
use crate::errors::BotError;
use crate::metrics::metrics;

const JSON_MEDIA_TYPE: &str = "application/json";

/// Whether the request declares a JSON body (parameters such as charset allowed).
fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE))
        .unwrap_or(false)
}

/// `POST /transaction`: accept a candidate transaction from the frontend.
pub async fn transaction(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.requests.fetch_add(1, Ordering::Relaxed);
    metrics().relay_requests.inc();

    if !is_json_content_type(&headers) {
        metrics().relay_rejections.inc();
        return respond_error(StatusCode::BAD_REQUEST, "invalid content type");
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, "Rejecting malformed JSON body");
            metrics().relay_rejections.inc();
            return respond_error(StatusCode::BAD_REQUEST, "invalid json body");
        }
    };

    match state.sink.forward(payload).await {
        Ok(None) => StatusCode::OK.into_response(),
        Ok(Some(body)) => respond_ok(&body),
        Err(BotError::RequestValidation(message)) => {
            metrics().relay_rejections.inc();
            respond_error(StatusCode::BAD_REQUEST, message)
        }
        Err(e) => {
            metrics().relay_rejections.inc();
            error!(category = e.category(), error = %e, "Relayed transaction failed");
            respond_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

/// `GET /health`
pub async fn health(State(state): State<Arc<RelayState>>) -> Response {
    respond_ok(&HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        requests: state.requests.load(Ordering::Relaxed),
    })
}

/// `GET /metrics` in the Prometheus text format
pub async fn metrics_text() -> Response {
    match metrics().render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn not_found() -> Response {
    respond_msg(StatusCode::NOT_FOUND, "not found")
}
