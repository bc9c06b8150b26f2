use axum::Router;

pub mod books;
pub mod common;
pub mod orders;
pub mod system;
pub mod warehouse;

/// Router for every service endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/warehouse", warehouse::router())
        .nest("/orders", orders::router())
        .nest("/books", books::router())
}
