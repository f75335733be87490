//! Operation Instrumentation
//!
//! Wraps a fallible service call: logs entry, exit and duration, and
//! normalizes the error into a [`ServiceError`].

use crate::error::ServiceError;
use std::future::Future;
use std::time::Instant;
use tracing::Instrument;

/// Run `fut` inside an `operation` span, converting its error into a [`ServiceError`].
pub async fn with_error_handling<T, E, Fut>(operation: &str, fut: Fut) -> Result<T, ServiceError>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<ServiceError>,
{
    let span = tracing::info_span!("operation", name = operation);
    async move {
        let started = Instant::now();
        tracing::debug!("started");

        let result = fut.await.map_err(Into::into);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => tracing::debug!(elapsed_ms, "completed"),
            Err(err) => tracing::warn!(
                elapsed_ms,
                kind = %err.kind(),
                retryable = err.is_retryable(),
                "failed: {}",
                err.message()
            ),
        }
        result
    }
    .instrument(span)
    .await
}
