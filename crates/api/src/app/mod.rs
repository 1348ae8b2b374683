//! HTTP application wiring (Axum router + services).
//!
//! - `services.rs`: identity provider, stores and guard chain
//! - `routes/`: handlers, one file per area
//! - `dto.rs`: request parsing and response shapes
//! - `errors.rs`: error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, build_services};

/// Build the full HTTP router.
///
/// Admin and profile endpoints authenticate inside each handler. The contact
/// API sits behind the auth middleware and page routes behind the guard chain.
pub fn build_app(services: Arc<AppServices>) -> Router {
    let contacts_api = routes::contacts::router().layer(axum::middleware::from_fn_with_state(
        Arc::clone(&services),
        middleware::auth_middleware,
    ));

    let pages = routes::pages::router().layer(axum::middleware::from_fn_with_state(
        Arc::clone(&services),
        middleware::page_guard,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .nest("/api/contacts", contacts_api)
        .merge(pages)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
