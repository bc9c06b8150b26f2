use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use bookstore_core::{BookId, ShelfId};

use crate::app::dto;
use crate::app::routes::common::blocking;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/stock/add", post(add_stock))
        .route("/stock/remove", post(remove_stock))
        .route("/books/:id/locations", get(get_locations))
        .route("/books/:id/total", get(get_total_stock))
        .route("/shelves/:id", get(get_shelf_contents))
        .route("/inventory", get(get_inventory))
}

pub async fn add_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::StockChangeRequest>,
) -> Response {
    let result = blocking(move || {
        let (book_id, shelf_id) = body.ids()?;
        let level = services.warehouse.add_stock(&book_id, &shelf_id, body.quantity)?;
        Ok(dto::ShelfLevelResponse {
            book_id,
            shelf_id: level.shelf_id,
            quantity: level.quantity,
        })
    })
    .await;

    match result {
        Ok(level) => Json(level).into_response(),
        Err(resp) => resp,
    }
}

pub async fn remove_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::StockChangeRequest>,
) -> Response {
    let result = blocking(move || {
        let (book_id, shelf_id) = body.ids()?;
        let level = services.warehouse.remove_stock(&book_id, &shelf_id, body.quantity)?;
        Ok(dto::ShelfLevelResponse {
            book_id,
            shelf_id: level.shelf_id,
            quantity: level.quantity,
        })
    })
    .await;

    match result {
        Ok(level) => Json(level).into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_locations(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let result = blocking(move || {
        let book_id: BookId = id.parse()?;
        services.warehouse.get_locations(&book_id)
    })
    .await;

    match result {
        Ok(locations) => Json(locations).into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_total_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let result = blocking(move || {
        let book_id: BookId = id.parse()?;
        let total_stock = services.warehouse.total_stock(&book_id)?;
        Ok(dto::TotalStockResponse { book_id, total_stock })
    })
    .await;

    match result {
        Ok(total) => Json(total).into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_shelf_contents(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let result = blocking(move || {
        let shelf_id: ShelfId = id.parse()?;
        services.warehouse.get_shelf_contents(&shelf_id)
    })
    .await;

    match result {
        Ok(entries) => Json(entries).into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_inventory(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match blocking(move || services.warehouse.inventory_overview()).await {
        Ok(rows) => Json(rows).into_response(),
        Err(resp) => resp,
    }
}
