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

use epitrack_core::EmployeeId;
use epitrack_employees::{EmployeeStatus, RegisterEmployee, UpdateEmployeeDetails};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_employee).get(list_employees))
        .route(
            "/:id",
            get(get_employee).put(update_employee).delete(delete_employee),
        )
}

pub async fn register_employee(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::EmployeeRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = RegisterEmployee {
        employee_id: EmployeeId::new(),
        full_name: body.full_name,
        registration: body.registration,
        job_title: body.job_title,
        status: body.status,
        occurred_at: Utc::now(),
    };

    match services.loans.register_employee(cmd).await {
        Ok(e) => (StatusCode::CREATED, Json(dto::employee_to_json(&e))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// `?status=active` lists the employees who may borrow.
pub async fn list_employees(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::EmployeeListQuery>, QueryRejection>,
) -> axum::response::Response {
    let query = match errors::query_params(query) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let status: Option<EmployeeStatus> = match errors::parse_query(query.status.as_deref()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.loans.list_employees(status).await {
        Ok(listing) => (StatusCode::OK, Json(dto::employee_listing_to_json(&listing))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: EmployeeId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.loans.get_employee(id).await {
        Ok(e) => (StatusCode::OK, Json(dto::employee_to_json(&e))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn update_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::EmployeeRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let id: EmployeeId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = UpdateEmployeeDetails {
        employee_id: id,
        full_name: body.full_name,
        registration: body.registration,
        job_title: body.job_title,
        status: body.status,
        occurred_at: Utc::now(),
    };

    match services.loans.update_employee(cmd).await {
        Ok(e) => (StatusCode::OK, Json(dto::employee_to_json(&e))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn delete_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: EmployeeId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.loans.delete_employee(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
