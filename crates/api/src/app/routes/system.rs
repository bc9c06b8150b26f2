use std::sync::Arc;

use axum::{extract::Extension, Json};
use serde_json::{json, Value};

use bookstore_infra::StockSourceKind;

use crate::app::services::AppServices;

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Json<Value> {
    let stock_source = match services.stock_source {
        StockSourceKind::Ledger => "ledger",
        StockSourceKind::Cache => "cache",
    };
    let worker = services.cache_worker_stats().map(|s| {
        json!({
            "handled": s.handled,
            "failedAttempts": s.failed_attempts,
            "dropped": s.dropped,
        })
    });

    Json(json!({
        "status": "ok",
        "stockSource": stock_source,
        "cacheWorker": worker,
    }))
}
