use thiserror::Error;

use epitrack_core::DomainError;

/// Error returned by storage backends and the services built on them.
///
/// ## Error Categories
///
/// - **Domain**: a business rule rejected the operation; nothing was persisted
/// - **Database**: the backend itself failed (connection, unexpected SQL error)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            StoreError::Domain(e) => Some(e),
            StoreError::Database(_) => None,
        }
    }
}

/// Map a sqlx error to a `StoreError`.
///
/// | SQLx Error | PostgreSQL Error Code | StoreError |
/// |------------|----------------------|------------|
/// | Database (unique violation) | `23505` | `Domain(Conflict)` |
/// | Database (foreign key violation) | `23503` | `Domain(ReferentialBlock)` |
/// | Database (check constraint violation) | `23514` | `Domain(InvariantViolation)` |
/// | anything else | - | `Database` |
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = db_err.message().to_string();
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Domain(DomainError::conflict(describe_unique(
                    db_err.constraint(),
                    &msg,
                ))),
                Some("23503") => StoreError::Domain(DomainError::referential_block(msg)),
                Some("23514") => StoreError::Domain(DomainError::invariant(msg)),
                _ => StoreError::Database(format!("database error in {operation}: {msg}")),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Database(format!("sqlx error in {operation}: {other}")),
    }
}

fn describe_unique(constraint: Option<&str>, fallback: &str) -> String {
    match constraint {
        Some("equipment_name_key") => "an equipment with this name already exists".to_string(),
        Some("employees_registration_key") => {
            "an employee with this registration number already exists".to_string()
        }
        _ => fallback.to_string(),
    }
}
