use axum::http::StatusCode;
use axum::response::Response;

use bookstore_infra::ServiceError;

use crate::app::errors;

/// Run a service call on the blocking pool.
///
/// Services take per-key locks and may wait on the store, so they never run
/// on the async executor threads.
pub async fn blocking<T, F>(f: F) -> Result<T, Response>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(errors::service_error_to_response(err)),
        Err(join) => Err(errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            join.to_string(),
        )),
    }
}
