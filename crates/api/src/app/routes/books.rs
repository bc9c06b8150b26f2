use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::warn;

use bookstore_core::BookId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_books))
        .route("/events", post(publish_book_event))
        .route("/:id", get(get_book))
}

/// Cached catalog view; may lag behind the ledger.
pub async fn list_books(Extension(services): Extension<Arc<AppServices>>) -> Response {
    Json(services.cache.list_books()).into_response()
}

pub async fn get_book(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let book_id: BookId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::service_error_to_response(bookstore_infra::ServiceError::from(e)),
    };

    match services.cache.get_book(&book_id) {
        Some(book) => Json(book).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", format!("book {book_id} is not cached")),
    }
}

/// Catalog event intake: publishes a book event for every subscriber.
pub async fn publish_book_event(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::BookEventRequest>,
) -> Response {
    let event = match body.into_event() {
        Ok(e) => e,
        Err(e) => return errors::service_error_to_response(e.into()),
    };

    // Network transports block on I/O; keep them off the executor threads.
    let published =
        tokio::task::spawn_blocking(move || services.publisher.try_publish(event).map_err(|e| e.to_string()))
            .await;

    match published {
        Ok(Ok(())) => (StatusCode::ACCEPTED, Json(json!({ "published": true }))).into_response(),
        Ok(Err(err)) => {
            warn!(error = %err, "book event not published");
            errors::json_error(StatusCode::SERVICE_UNAVAILABLE, "bus_unavailable", err)
        }
        Err(join) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            join.to_string(),
        ),
    }
}
