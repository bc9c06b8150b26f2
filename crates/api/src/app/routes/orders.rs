use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use bookstore_core::OrderId;

use crate::app::dto;
use crate::app::routes::common::blocking;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/fulfill", post(fulfill_order))
        .route("/:id/cancel", post(cancel_order))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateOrderRequest>,
) -> Response {
    let result = blocking(move || {
        let items = body.into_items()?;
        services.orders.create_order(items)
    })
    .await;

    match result {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn list_orders(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match blocking(move || services.orders.get_all_orders()).await {
        Ok(orders) => Json(orders).into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let result = blocking(move || {
        let order_id: OrderId = id.parse()?;
        services.orders.get_order(order_id)
    })
    .await;

    match result {
        Ok(order) => Json(order).into_response(),
        Err(resp) => resp,
    }
}

pub async fn fulfill_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let result = blocking(move || {
        let order_id: OrderId = id.parse()?;
        services.orders.fulfill_order(order_id)
    })
    .await;

    match result {
        Ok(order) => Json(order).into_response(),
        Err(resp) => resp,
    }
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let result = blocking(move || {
        let order_id: OrderId = id.parse()?;
        services.orders.cancel_order(order_id)
    })
    .await;

    match result {
        Ok(order) => Json(order).into_response(),
        Err(resp) => resp,
    }
}
