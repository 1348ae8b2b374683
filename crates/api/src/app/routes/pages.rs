//! Page routes behind the navigation guard chain.
//!
//! The handlers only name the page; access is decided by
//! [`crate::middleware::page_guard`] before they run.

use axum::{Json, Router, http::Uri, routing::get};
use serde_json::{Value, json};

use contacthub_auth::{LOGIN_PATH, PENDING_APPROVAL_PATH};

pub fn router() -> Router {
    Router::new()
        .route("/", get(page))
        .route(LOGIN_PATH, get(page))
        .route("/signup", get(page))
        .route(PENDING_APPROVAL_PATH, get(page))
        .route("/contacts", get(page))
        .route("/contacts/add", get(page))
        .route("/contacts/edit/:id", get(page))
        .route("/profile", get(page))
        .route("/admin/users", get(page))
}

pub async fn page(uri: Uri) -> Json<Value> {
    Json(json!({ "page": uri.path() }))
}
