use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use contacthub_core::{ContactId, ContactPatch, NewContact};

use crate::app::{errors, services::AppServices};
use crate::context::CallerContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_contacts).post(add_contact))
        .route(
            "/:id",
            get(get_contact).patch(update_contact).delete(delete_contact),
        )
}

fn parse_id(id: &str) -> Result<ContactId, axum::response::Response> {
    id.trim().parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "invalid contact id")
    })
}

/// GET /api/contacts
pub async fn list_contacts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
) -> axum::response::Response {
    match services.contacts.list(&caller.actor()).await {
        Ok(contacts) => Json(contacts).into_response(),
        Err(e) => errors::app_error_to_response(e),
    }
}

/// GET /api/contacts/:id
pub async fn get_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.contacts.get(&caller.actor(), id).await {
        Ok(contact) => Json(contact).into_response(),
        Err(e) => errors::app_error_to_response(e),
    }
}

/// POST /api/contacts
pub async fn add_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<NewContact>,
) -> axum::response::Response {
    match services.contacts.add(&caller.actor(), body).await {
        Ok(contact) => (StatusCode::CREATED, Json(contact)).into_response(),
        Err(e) => errors::app_error_to_response(e),
    }
}

/// PATCH /api/contacts/:id
pub async fn update_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
    Json(patch): Json<ContactPatch>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.contacts.update(&caller.actor(), id, patch).await {
        Ok(contact) => Json(contact).into_response(),
        Err(e) => errors::app_error_to_response(e),
    }
}

/// DELETE /api/contacts/:id
pub async fn delete_contact(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<CallerContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match services.contacts.delete(&caller.actor(), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::app_error_to_response(e),
    }
}
