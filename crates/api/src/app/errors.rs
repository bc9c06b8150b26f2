use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use bookstore_core::DomainError;
use bookstore_infra::ServiceError;

/// Map a service failure to a status code and a stable `error` code.
pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    let status = match &err {
        ServiceError::Domain(domain) => match domain {
            DomainError::InvalidQuantity(_) | DomainError::Validation(_) => StatusCode::BAD_REQUEST,
            DomainError::InsufficientStock { .. } => StatusCode::CONFLICT,
            DomainError::LocationNotFound { .. } | DomainError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            DomainError::InvalidState(_) => StatusCode::CONFLICT,
        },
        ServiceError::InventoryUnavailable(_) | ServiceError::OrderStoreUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ServiceError::Concurrency(_) => StatusCode::CONFLICT,
    };

    json_error(status, err.code(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_per_error_kind() {
        let cases = [
            (ServiceError::from(DomainError::invalid_quantity("0")), StatusCode::BAD_REQUEST),
            (ServiceError::from(DomainError::validation("empty")), StatusCode::BAD_REQUEST),
            (ServiceError::from(DomainError::insufficient_stock("b1", 5, 2)), StatusCode::CONFLICT),
            (ServiceError::from(DomainError::location_not_found("b1", "s9")), StatusCode::NOT_FOUND),
            (ServiceError::from(DomainError::order_not_found("x")), StatusCode::NOT_FOUND),
            (ServiceError::from(DomainError::invalid_state("done")), StatusCode::CONFLICT),
            (ServiceError::InventoryUnavailable("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ServiceError::OrderStoreUnavailable("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ServiceError::Concurrency("raced".into()), StatusCode::CONFLICT),
        ];

        for (err, status) in cases {
            assert_eq!(service_error_to_response(err).status(), status);
        }
    }
}
