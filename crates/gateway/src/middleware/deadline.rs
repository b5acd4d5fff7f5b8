//! Per-route deadline middleware

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use ikms_common::errors::{AppError, Result};
use std::time::Duration;

/// Fail the request with a structured 408 if the handler runs past `timeout`
pub async fn enforce_deadline(
    State(timeout): State<Duration>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let path = request.uri().path().to_string();

    match tokio::time::timeout(timeout, next.run(request)).await {
        Ok(response) => Ok(response),
        Err(_) => {
            tracing::warn!(path = %path, timeout_ms = timeout.as_millis() as u64, "Request deadline exceeded");
            Err(AppError::Timeout {
                secs: timeout.as_secs(),
            })
        }
    }
}
