//! Retry with exponential backoff for outbound HTTP collaborators
//!
//! Used by the chat-completion, embedding and vector index clients. The QA
//! pipeline itself never retries.

use crate::errors::{AppError, Result};
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;

/// Outcome of a single failed attempt
#[derive(Debug)]
pub(crate) enum Failure {
    /// Worth another attempt (transport error, 429, 5xx)
    Transient(AppError),
    /// Retrying cannot help (4xx, malformed response)
    Permanent(AppError),
}

impl Failure {
    /// Classify an upstream HTTP status
    pub(crate) fn from_status(status: reqwest::StatusCode, err: AppError) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Failure::Transient(err)
        } else {
            Failure::Permanent(err)
        }
    }

    /// Classify a transport-level failure
    pub(crate) fn from_transport(source: &reqwest::Error, err: AppError) -> Self {
        if source.is_timeout() || source.is_connect() || source.is_request() {
            Failure::Transient(err)
        } else {
            Failure::Permanent(err)
        }
    }
}

fn policy() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(200),
        max_interval: Duration::from_secs(5),
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Run `op` until it succeeds, fails permanently, or `max_retries` extra
/// attempts have been spent.
pub(crate) async fn with_retry<T, F, Fut>(operation: &str, max_retries: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, Failure>>,
{
    let mut attempt = 0u32;

    backoff::future::retry_notify(
        policy(),
        || {
            attempt += 1;
            let current = attempt;
            let fut = op();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(Failure::Transient(err)) if current <= max_retries => {
                        Err(backoff::Error::transient(err))
                    }
                    Err(Failure::Transient(err)) | Err(Failure::Permanent(err)) => {
                        Err(backoff::Error::permanent(err))
                    }
                }
            }
        },
        |err: AppError, delay: Duration| {
            tracing::warn!(
                operation = operation,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Upstream request failed, retrying"
            );
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn upstream(message: &str) -> AppError {
        AppError::GenerationError {
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry("test", 2, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Failure::Transient(upstream("busy")))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("test", 1, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Failure::Transient(upstream("down"))) }
        })
        .await;

        assert!(matches!(result, Err(AppError::GenerationError { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry("test", 5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Failure::Permanent(upstream("bad request"))) }
        })
        .await;

        tokio_test::assert_err!(result);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_status_classification() {
        let failure = Failure::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, upstream("x"));
        assert!(matches!(failure, Failure::Transient(_)));

        let failure = Failure::from_status(reqwest::StatusCode::UNAUTHORIZED, upstream("x"));
        assert!(matches!(failure, Failure::Permanent(_)));
    }
}
