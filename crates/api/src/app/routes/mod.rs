use axum::Router;

pub mod employees;
pub mod equipment;
pub mod loans;
pub mod system;

/// Router for every domain endpoint.
pub fn router() -> Router {
    Router::new()
        .nest("/equipment", equipment::router())
        .nest("/employees", employees::router())
        .nest("/loans", loans::router())
}
