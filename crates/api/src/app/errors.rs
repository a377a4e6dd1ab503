use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use epitrack_core::DomainError;
use epitrack_infra::StoreError;

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::Domain(e) => domain_error_to_response(e),
        StoreError::Database(msg) => {
            tracing::error!(error = %msg, "store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "internal storage error")
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let status = match &err {
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) | DomainError::ReferentialBlock(_) => StatusCode::CONFLICT,
        DomainError::InsufficientStock { .. } | DomainError::ExceedsPending { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DomainError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        DomainError::Validation(_)
        | DomainError::InvalidDate { .. }
        | DomainError::DuplicateLineItem { .. }
        | DomainError::InvalidQuantity(_)
        | DomainError::InvalidId(_) => StatusCode::BAD_REQUEST,
    };
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path or query identifier, answering 400 `invalid_id` on failure.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr<Err = DomainError>,
{
    raw.parse::<T>().map_err(domain_error_to_response)
}

/// Parse an optional enum-valued query parameter, answering 400 on failure.
pub fn parse_query<T>(raw: Option<&str>) -> Result<Option<T>, axum::response::Response>
where
    T: core::str::FromStr<Err = DomainError>,
{
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.parse::<T>().map(Some).map_err(domain_error_to_response),
        None => Ok(None),
    }
}

/// Unwrap a JSON body, answering 400 `validation_error` when it does not parse.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    body.map(|Json(v)| v)
        .map_err(|rejection| json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text()))
}

/// Same as [`json_body`] for query strings.
pub fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, axum::response::Response> {
    query
        .map(|Query(v)| v)
        .map_err(|rejection| json_error(StatusCode::BAD_REQUEST, "validation_error", rejection.body_text()))
}
