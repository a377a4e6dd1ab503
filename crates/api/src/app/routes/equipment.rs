use std::sync::Arc;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use epitrack_core::EquipmentId;
use epitrack_equipment::{RegisterEquipment, UpdateEquipmentDetails};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_equipment).get(list_equipment))
        .route(
            "/:id",
            get(get_equipment).put(update_equipment).delete(delete_equipment),
        )
}

pub async fn register_equipment(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateEquipmentRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = RegisterEquipment {
        equipment_id: EquipmentId::new(),
        name: body.name,
        category: body.category,
        certificate: body.certificate,
        total_stock: body.total_stock,
        occurred_at: Utc::now(),
    };

    match services.loans.register_equipment(cmd).await {
        Ok(e) => (StatusCode::CREATED, Json(dto::equipment_to_json(&e))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn list_equipment(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::EquipmentListQuery>, QueryRejection>,
) -> axum::response::Response {
    let query = match errors::query_params(query) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.loans.list_equipment(query.available).await {
        Ok(items) => {
            let items = items.iter().map(dto::equipment_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_equipment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: EquipmentId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.loans.get_equipment(id).await {
        Ok(e) => (StatusCode::OK, Json(dto::equipment_to_json(&e))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn update_equipment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateEquipmentRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let id: EquipmentId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = UpdateEquipmentDetails {
        equipment_id: id,
        name: body.name,
        category: body.category,
        certificate: body.certificate,
        occurred_at: Utc::now(),
    };

    match services.loans.update_equipment(cmd).await {
        Ok(e) => (StatusCode::OK, Json(dto::equipment_to_json(&e))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn delete_equipment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: EquipmentId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.loans.delete_equipment(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
