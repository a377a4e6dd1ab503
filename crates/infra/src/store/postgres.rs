//! Postgres-backed store.
//!
//! Each trait method runs in one SQL transaction. Stock-changing operations
//! lock the rows they read before planning:
//!
//! - `open_loan` locks the requested equipment rows (`FOR UPDATE`, ordered by
//!   id so concurrent loans acquire locks in the same order)
//! - `record_return` and `sweep_overdue` lock the loan rows they change
//!
//! Planned mutations are then written inside the same transaction, so a
//! rejected operation leaves nothing behind.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use epitrack_core::{DomainError, EmployeeId, EquipmentId, LoanId, LoanItemId, ReturnEventId};
use epitrack_employees::{
    Employee, EmployeeParts, EmployeeStatus, EmployeeSummary, UpdateEmployeeDetails,
};
use epitrack_equipment::{Equipment, EquipmentParts, UpdateEquipmentDetails};
use epitrack_loans::{
    LedgerMutation, Loan, LoanDetail, LoanItem, LoanItemDetail, LoanStatus, LoanSummary, OpenLoan,
    RecordReturn, ReturnEvent, ReturnReceipt, StockLevel, plan_loan, plan_overdue_sweep,
    plan_return,
};

use super::{EmployeeRegistry, EquipmentRegistry, LoanFilter, LoanLedger};
use crate::error::{StoreError, StoreResult, map_sqlx_error};

const SCHEMA: &str = include_str!("schema.sql");

const EQUIPMENT_COLUMNS: &str =
    "id, name, category, certificate, total_stock, available_stock, registered_at, updated_at";
const EMPLOYEE_COLUMNS: &str =
    "id, full_name, registration, job_title, status, registered_at, updated_at";
const LOAN_COLUMNS: &str = "id, employee_id, created_at, expected_return, status, note";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect, then make sure the schema exists.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        let store = Self::new(pool);
        store.apply_schema().await?;
        Ok(store)
    }

    pub async fn apply_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// -------------------------
// Row mapping
// -------------------------

fn parse_column<T>(column: &str, raw: &str) -> StoreResult<T>
where
    T: FromStr<Err = DomainError>,
{
    raw.parse().map_err(|_| {
        StoreError::Domain(DomainError::invariant(format!(
            "unexpected value '{raw}' in column {column}"
        )))
    })
}

fn equipment_from_row(row: &PgRow) -> StoreResult<Equipment> {
    let decode = |e| map_sqlx_error("decode_equipment", e);
    let category: String = row.try_get("category").map_err(decode)?;
    let parts = EquipmentParts {
        id: EquipmentId::from_uuid(row.try_get("id").map_err(decode)?),
        name: row.try_get("name").map_err(decode)?,
        category: parse_column("equipment.category", &category)?,
        certificate: row.try_get("certificate").map_err(decode)?,
        total_stock: row.try_get("total_stock").map_err(decode)?,
        available_stock: row.try_get("available_stock").map_err(decode)?,
        registered_at: row.try_get("registered_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    };
    Ok(Equipment::rehydrate(parts)?)
}

fn employee_from_row(row: &PgRow) -> StoreResult<Employee> {
    let decode = |e| map_sqlx_error("decode_employee", e);
    let status: String = row.try_get("status").map_err(decode)?;
    Ok(Employee::rehydrate(EmployeeParts {
        id: EmployeeId::from_uuid(row.try_get("id").map_err(decode)?),
        full_name: row.try_get("full_name").map_err(decode)?,
        registration: row.try_get("registration").map_err(decode)?,
        job_title: row.try_get("job_title").map_err(decode)?,
        status: parse_column("employees.status", &status)?,
        registered_at: row.try_get("registered_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    }))
}

fn loan_from_row(row: &PgRow) -> StoreResult<Loan> {
    let decode = |e| map_sqlx_error("decode_loan", e);
    let status: String = row.try_get("status").map_err(decode)?;
    Ok(Loan {
        id: LoanId::from_uuid(row.try_get("id").map_err(decode)?),
        employee_id: EmployeeId::from_uuid(row.try_get("employee_id").map_err(decode)?),
        created_at: row.try_get("created_at").map_err(decode)?,
        expected_return: row.try_get("expected_return").map_err(decode)?,
        status: parse_column("loans.status", &status)?,
        note: row.try_get("note").map_err(decode)?,
    })
}

fn item_from_row(row: &PgRow) -> StoreResult<LoanItem> {
    let decode = |e| map_sqlx_error("decode_loan_item", e);
    let status: String = row.try_get("status").map_err(decode)?;
    Ok(LoanItem {
        id: LoanItemId::from_uuid(row.try_get("id").map_err(decode)?),
        loan_id: LoanId::from_uuid(row.try_get("loan_id").map_err(decode)?),
        equipment_id: EquipmentId::from_uuid(row.try_get("equipment_id").map_err(decode)?),
        quantity: row.try_get("quantity").map_err(decode)?,
        status: parse_column("loan_items.status", &status)?,
    })
}

fn return_from_row(row: &PgRow) -> StoreResult<ReturnEvent> {
    let decode = |e| map_sqlx_error("decode_return_event", e);
    let disposition: String = row.try_get("disposition").map_err(decode)?;
    Ok(ReturnEvent {
        id: ReturnEventId::from_uuid(row.try_get("id").map_err(decode)?),
        item_id: LoanItemId::from_uuid(row.try_get("item_id").map_err(decode)?),
        quantity: row.try_get("quantity").map_err(decode)?,
        disposition: parse_column("return_events.disposition", &disposition)?,
        returned_at: row.try_get("returned_at").map_err(decode)?,
        note: row.try_get("note").map_err(decode)?,
    })
}

// -------------------------
// Shared queries
// -------------------------

/// Row lock taken by a single-row fetch, held until the transaction ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowLock {
    None,
    /// Blocks writers and deleters but not other readers.
    Share,
    Update,
}

impl RowLock {
    fn clause(self) -> &'static str {
        match self {
            RowLock::None => "",
            RowLock::Share => " FOR SHARE",
            RowLock::Update => " FOR UPDATE",
        }
    }
}

fn select_by_id(columns: &str, table: &str, lock: RowLock) -> String {
    format!("SELECT {columns} FROM {table} WHERE id = $1{}", lock.clause())
}

/// The borrower row is share-locked while a loan is opened, so a concurrent
/// `delete_employee` waits and then sees the new loan.
const BORROWER_LOCK: RowLock = RowLock::Share;

async fn fetch_equipment(conn: &mut PgConnection, id: EquipmentId, lock: RowLock) -> StoreResult<Equipment> {
    let sql = select_by_id(EQUIPMENT_COLUMNS, "equipment", lock);
    let row = sqlx::query(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_equipment", e))?
        .ok_or_else(|| DomainError::not_found(format!("equipment {id}")))?;
    equipment_from_row(&row)
}

async fn fetch_employee(conn: &mut PgConnection, id: EmployeeId, lock: RowLock) -> StoreResult<Employee> {
    let sql = select_by_id(EMPLOYEE_COLUMNS, "employees", lock);
    let row = sqlx::query(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_employee", e))?
        .ok_or_else(|| DomainError::not_found(format!("employee {id}")))?;
    employee_from_row(&row)
}

/// Load a loan with items and return history, locking only the loan row.
async fn fetch_loan_detail(conn: &mut PgConnection, id: LoanId, lock: RowLock) -> StoreResult<LoanDetail> {
    let sql = select_by_id(LOAN_COLUMNS, "loans", lock);
    let row = sqlx::query(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_loan", e))?
        .ok_or_else(|| DomainError::not_found(format!("loan {id}")))?;
    let loan = loan_from_row(&row)?;

    let item_rows = sqlx::query(
        r#"
        SELECT id, loan_id, equipment_id, quantity, status
        FROM loan_items
        WHERE loan_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(Uuid::from(id))
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_loan_items", e))?;

    let return_rows = sqlx::query(
        r#"
        SELECT r.id, r.item_id, r.quantity, r.disposition, r.returned_at, r.note
        FROM return_events r
        JOIN loan_items i ON i.id = r.item_id
        WHERE i.loan_id = $1
        ORDER BY r.returned_at ASC, r.id ASC
        "#,
    )
    .bind(Uuid::from(id))
    .fetch_all(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("fetch_return_events", e))?;

    let mut items = item_rows
        .iter()
        .map(|r| item_from_row(r).map(LoanItemDetail::new))
        .collect::<StoreResult<Vec<_>>>()?;
    for row in &return_rows {
        let event = return_from_row(row)?;
        if let Some(detail) = items.iter_mut().find(|d| d.item.id == event.item_id) {
            detail.returns.push(event);
        }
    }

    Ok(LoanDetail { loan, items })
}

/// Write a planned batch inside the caller's transaction.
async fn apply_mutations(
    conn: &mut PgConnection,
    mutations: &[LedgerMutation],
    at: DateTime<Utc>,
) -> StoreResult<()> {
    for mutation in mutations {
        debug!(kind = mutation.kind(), "applying ledger mutation");
        match mutation {
            LedgerMutation::LoanOpened(loan) => {
                sqlx::query(
                    r#"
                    INSERT INTO loans (id, employee_id, created_at, expected_return, status, note)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(Uuid::from(loan.id))
                .bind(Uuid::from(loan.employee_id))
                .bind(loan.created_at)
                .bind(loan.expected_return)
                .bind(loan.status.as_str())
                .bind(loan.note.as_deref())
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("insert_loan", e))?;
            }
            LedgerMutation::ItemAdded(item) => {
                sqlx::query(
                    r#"
                    INSERT INTO loan_items (id, loan_id, equipment_id, quantity, status)
                    VALUES ($1, $2, $3, $4, $5)
                    "#,
                )
                .bind(Uuid::from(item.id))
                .bind(Uuid::from(item.loan_id))
                .bind(Uuid::from(item.equipment_id))
                .bind(item.quantity)
                .bind(item.status.as_str())
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("insert_loan_item", e))?;
            }
            LedgerMutation::StockAdjusted { equipment_id, delta } => {
                let result = sqlx::query(
                    r#"
                    UPDATE equipment
                    SET available_stock = available_stock + $2, updated_at = $3
                    WHERE id = $1
                      AND available_stock + $2 BETWEEN 0 AND total_stock
                    "#,
                )
                .bind(Uuid::from(*equipment_id))
                .bind(*delta)
                .bind(at)
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("adjust_stock", e))?;
                if result.rows_affected() != 1 {
                    return Err(DomainError::invariant(format!(
                        "stock adjustment of {delta} on equipment {equipment_id} left its bounds"
                    ))
                    .into());
                }
            }
            LedgerMutation::ReturnRecorded(event) => {
                sqlx::query(
                    r#"
                    INSERT INTO return_events (id, item_id, quantity, disposition, returned_at, note)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(Uuid::from(event.id))
                .bind(Uuid::from(event.item_id))
                .bind(event.quantity)
                .bind(event.disposition.as_str())
                .bind(event.returned_at)
                .bind(event.note.as_deref())
                .execute(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error("insert_return_event", e))?;
            }
            LedgerMutation::ItemStatusChanged { item_id, status } => {
                sqlx::query("UPDATE loan_items SET status = $2 WHERE id = $1")
                    .bind(Uuid::from(*item_id))
                    .bind(status.as_str())
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| map_sqlx_error("update_item_status", e))?;
            }
            LedgerMutation::LoanStatusChanged { loan_id, status } => {
                sqlx::query("UPDATE loans SET status = $2 WHERE id = $1")
                    .bind(Uuid::from(*loan_id))
                    .bind(status.as_str())
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| map_sqlx_error("update_loan_status", e))?;
            }
        }
    }
    Ok(())
}

// -------------------------
// Trait impls
// -------------------------

#[async_trait]
impl EquipmentRegistry for PostgresStore {
    #[instrument(skip(self, equipment), fields(equipment_id = %equipment.id_typed()), err)]
    async fn insert_equipment(&self, equipment: &Equipment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO equipment (
                id, name, category, certificate, total_stock, available_stock,
                registered_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::from(equipment.id_typed()))
        .bind(equipment.name())
        .bind(equipment.category().as_str())
        .bind(equipment.certificate().map(|c| c.as_str()))
        .bind(equipment.total_stock())
        .bind(equipment.available_stock())
        .bind(equipment.registered_at())
        .bind(equipment.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_equipment", e))?;
        Ok(())
    }

    #[instrument(skip(self, cmd), fields(equipment_id = %cmd.equipment_id), err)]
    async fn update_equipment(&self, cmd: &UpdateEquipmentDetails) -> StoreResult<Equipment> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut equipment = fetch_equipment(&mut tx, cmd.equipment_id, RowLock::Update).await?;
        equipment.update_details(cmd)?;

        sqlx::query(
            r#"
            UPDATE equipment
            SET name = $2, category = $3, certificate = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(equipment.id_typed()))
        .bind(equipment.name())
        .bind(equipment.category().as_str())
        .bind(equipment.certificate().map(|c| c.as_str()))
        .bind(equipment.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_equipment", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(equipment)
    }

    async fn get_equipment(&self, id: EquipmentId) -> StoreResult<Equipment> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_equipment(&mut conn, id, RowLock::None).await
    }

    async fn list_equipment(&self, only_available: bool) -> StoreResult<Vec<Equipment>> {
        let sql = format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE ($1 = FALSE OR available_stock > 0) ORDER BY name ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(only_available)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_equipment", e))?;
        rows.iter().map(equipment_from_row).collect()
    }

    #[instrument(skip(self), fields(equipment_id = %id), err)]
    async fn delete_equipment(&self, id: EquipmentId) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let equipment = fetch_equipment(&mut tx, id, RowLock::Update).await?;
        equipment.ensure_deletable()?;

        let referenced: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM loan_items WHERE equipment_id = $1)")
                .bind(Uuid::from(id))
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("count_equipment_references", e))?;
        if referenced {
            return Err(DomainError::referential_block(format!(
                "equipment '{}' is referenced by loan history",
                equipment.name()
            ))
            .into());
        }

        sqlx::query("DELETE FROM equipment WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_equipment", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

#[async_trait]
impl EmployeeRegistry for PostgresStore {
    #[instrument(skip(self, employee), fields(employee_id = %employee.id_typed()), err)]
    async fn insert_employee(&self, employee: &Employee) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO employees (id, full_name, registration, job_title, status, registered_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::from(employee.id_typed()))
        .bind(employee.full_name())
        .bind(employee.registration())
        .bind(employee.job_title())
        .bind(employee.status().as_str())
        .bind(employee.registered_at())
        .bind(employee.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_employee", e))?;
        Ok(())
    }

    #[instrument(skip(self, cmd), fields(employee_id = %cmd.employee_id), err)]
    async fn update_employee(&self, cmd: &UpdateEmployeeDetails) -> StoreResult<Employee> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let mut employee = fetch_employee(&mut tx, cmd.employee_id, RowLock::Update).await?;
        employee.update_details(cmd)?;

        sqlx::query(
            r#"
            UPDATE employees
            SET full_name = $2, registration = $3, job_title = $4, status = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(employee.id_typed()))
        .bind(employee.full_name())
        .bind(employee.registration())
        .bind(employee.job_title())
        .bind(employee.status().as_str())
        .bind(employee.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_employee", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(employee)
    }

    async fn get_employee(&self, id: EmployeeId) -> StoreResult<Employee> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_employee(&mut conn, id, RowLock::None).await
    }

    async fn list_employees(&self, status: Option<EmployeeStatus>) -> StoreResult<Vec<Employee>> {
        let sql = format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE ($1::text IS NULL OR status = $1) ORDER BY full_name ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_employees", e))?;
        rows.iter().map(employee_from_row).collect()
    }

    #[instrument(skip(self), fields(employee_id = %id), err)]
    async fn delete_employee(&self, id: EmployeeId) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let employee = fetch_employee(&mut tx, id, RowLock::Update).await?;
        let loan_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM loans WHERE employee_id = $1")
            .bind(Uuid::from(id))
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("count_employee_loans", e))?;
        employee.ensure_deletable(usize::try_from(loan_count).unwrap_or(usize::MAX))?;

        sqlx::query("DELETE FROM employees WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_employee", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    async fn employee_summary(&self) -> StoreResult<EmployeeSummary> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM employees GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("employee_summary", e))?;

        let mut summary = EmployeeSummary::default();
        for row in &rows {
            let decode = |e| map_sqlx_error("decode_employee_summary", e);
            let status: String = row.try_get("status").map_err(decode)?;
            let n: i64 = row.try_get("n").map_err(decode)?;
            let n = usize::try_from(n).unwrap_or_default();
            match parse_column::<EmployeeStatus>("employees.status", &status)? {
                EmployeeStatus::Active => summary.active = n,
                EmployeeStatus::Inactive => summary.inactive = n,
            }
            summary.total += n;
        }
        Ok(summary)
    }
}

#[async_trait]
impl LoanLedger for PostgresStore {
    #[instrument(skip(self, cmd), fields(loan_id = %cmd.loan_id, lines = cmd.lines.len()), err)]
    async fn open_loan(&self, cmd: &OpenLoan, today: NaiveDate) -> StoreResult<LoanDetail> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let borrower = fetch_employee(&mut tx, cmd.employee_id, BORROWER_LOCK).await?;

        let mut ids: Vec<Uuid> = cmd.lines.iter().map(|l| Uuid::from(l.equipment_id)).collect();
        ids.sort();
        ids.dedup();
        let sql = format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE id = ANY($1) ORDER BY id ASC FOR UPDATE"
        );
        let rows = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_equipment", e))?;
        let stock = rows
            .iter()
            .map(|r| equipment_from_row(r).map(|e| StockLevel::from(&e)))
            .collect::<StoreResult<Vec<_>>>()?;

        let outcome = plan_loan(cmd, &borrower, &stock, today)?;
        apply_mutations(&mut tx, &outcome.mutations, cmd.occurred_at).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(outcome.detail)
    }

    #[instrument(skip(self, cmd), fields(item_id = %cmd.item_id, quantity = cmd.quantity), err)]
    async fn record_return(&self, cmd: &RecordReturn) -> StoreResult<ReturnReceipt> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let loan_id: Uuid = sqlx::query_scalar("SELECT loan_id FROM loan_items WHERE id = $1")
            .bind(Uuid::from(cmd.item_id))
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("find_loan_item", e))?
            .ok_or_else(|| DomainError::not_found(format!("loan item {}", cmd.item_id)))?;

        let current = fetch_loan_detail(&mut tx, LoanId::from_uuid(loan_id), RowLock::Update).await?;
        let outcome = plan_return(cmd, &current)?;
        apply_mutations(&mut tx, &outcome.mutations, cmd.occurred_at).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(outcome.receipt)
    }

    #[instrument(skip(self), err)]
    async fn sweep_overdue(&self, today: NaiveDate) -> StoreResult<usize> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let sql = format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE status = $1 AND expected_return < $2 ORDER BY id ASC FOR UPDATE"
        );
        let rows = sqlx::query(&sql)
            .bind(LoanStatus::Active.as_str())
            .bind(today)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_overdue_loans", e))?;
        let loans = rows.iter().map(loan_from_row).collect::<StoreResult<Vec<_>>>()?;

        let mutations = plan_overdue_sweep(&loans, today);
        apply_mutations(&mut tx, &mutations, Utc::now()).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(mutations.len())
    }

    async fn get_loan(&self, id: LoanId) -> StoreResult<LoanDetail> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))?;
        fetch_loan_detail(&mut conn, id, RowLock::None).await
    }

    async fn list_loans(&self, filter: LoanFilter) -> StoreResult<Vec<Loan>> {
        let sql = format!(
            r#"
            SELECT {LOAN_COLUMNS}
            FROM loans
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR employee_id = $2)
            ORDER BY created_at DESC, id DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.employee_id.map(Uuid::from))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_loans", e))?;
        rows.iter().map(loan_from_row).collect()
    }

    async fn loan_summary(&self) -> StoreResult<LoanSummary> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM loans GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("loan_summary", e))?;

        let mut summary = LoanSummary::default();
        for row in &rows {
            let decode = |e| map_sqlx_error("decode_loan_summary", e);
            let status: String = row.try_get("status").map_err(decode)?;
            let n: i64 = row.try_get("n").map_err(decode)?;
            let n = usize::try_from(n).unwrap_or_default();
            match parse_column::<LoanStatus>("loans.status", &status)? {
                LoanStatus::Active => summary.active = n,
                LoanStatus::Overdue => summary.overdue = n,
                LoanStatus::Returned => summary.returned = n,
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrower_is_share_locked_while_a_loan_opens() {
        assert_eq!(
            select_by_id(EMPLOYEE_COLUMNS, "employees", BORROWER_LOCK),
            format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE id = $1 FOR SHARE")
        );
    }

    #[test]
    fn plain_reads_take_no_lock() {
        assert_eq!(
            select_by_id(LOAN_COLUMNS, "loans", RowLock::None),
            format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = $1")
        );
        assert!(select_by_id(EQUIPMENT_COLUMNS, "equipment", RowLock::Update).ends_with(" FOR UPDATE"));
    }
}
