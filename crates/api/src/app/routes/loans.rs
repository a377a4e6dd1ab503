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

use epitrack_core::{EmployeeId, EquipmentId, LoanId, LoanItemId, ReturnEventId};
use epitrack_infra::LoanFilter;
use epitrack_loans::{LoanLine, LoanStatus, OpenLoan, RecordReturn};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_loan).get(list_loans))
        .route("/:id", get(get_loan))
        .route("/items/:item_id/returns", post(record_return))
}

pub async fn create_loan(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::CreateLoanRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let employee_id: EmployeeId = match errors::parse_id(&body.employee_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut lines = Vec::with_capacity(body.items.len());
    for line in body.items {
        let equipment_id: EquipmentId = match errors::parse_id(&line.equipment_id) {
            Ok(v) => v,
            Err(resp) => return resp,
        };
        lines.push(LoanLine {
            item_id: LoanItemId::new(),
            equipment_id,
            quantity: line.quantity,
        });
    }

    let cmd = OpenLoan {
        loan_id: LoanId::new(),
        employee_id,
        expected_return: body.expected_return,
        note: body.note,
        lines,
        occurred_at: Utc::now(),
    };

    match services.loans.open_loan(cmd).await {
        Ok(detail) => (StatusCode::CREATED, Json(dto::loan_detail_to_json(&detail))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Runs the overdue sweep, then lists loans newest first with status counts.
///
/// Query parameters:
/// - `status`: `active`, `overdue` or `returned`
/// - `employee_id`: restrict to one borrower
pub async fn list_loans(
    Extension(services): Extension<Arc<AppServices>>,
    query: Result<Query<dto::LoanListQuery>, QueryRejection>,
) -> axum::response::Response {
    let query = match errors::query_params(query) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let status: Option<LoanStatus> = match errors::parse_query(query.status.as_deref()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let employee_id: Option<EmployeeId> = match errors::parse_query(query.employee_id.as_deref()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .loans
        .list_loans(LoanFilter { status, employee_id }, Utc::now())
        .await
    {
        Ok(listing) => (StatusCode::OK, Json(dto::loan_listing_to_json(&listing))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_loan(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: LoanId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.loans.get_loan(id).await {
        Ok(detail) => (StatusCode::OK, Json(dto::loan_detail_to_json(&detail))).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn record_return(
    Extension(services): Extension<Arc<AppServices>>,
    Path(item_id): Path<String>,
    body: Result<Json<dto::RecordReturnRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match errors::json_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let item_id: LoanItemId = match errors::parse_id(&item_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = RecordReturn {
        return_id: ReturnEventId::new(),
        item_id,
        quantity: body.quantity,
        disposition: body.disposition,
        note: body.note,
        occurred_at: Utc::now(),
    };

    match services.loans.record_return(cmd).await {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
