use axum::{Router, routing::get};

pub mod admin;
pub mod contacts;
pub mod pages;
pub mod profiles;
pub mod system;

/// Endpoints that authenticate inside each handler.
pub fn router() -> Router {
    Router::new()
        .route("/session", get(system::session))
        .merge(admin::router())
        .merge(profiles::router())
}
