//! Storage boundary for the equipment registry, the employee registry and the
//! loan ledger.
//!
//! Every method is one atomic unit. Methods that change stock (`open_loan`,
//! `record_return`) read availability and write it back inside the same unit,
//! planning the change with the pure functions in `epitrack_loans::reconcile`.

use async_trait::async_trait;
use chrono::NaiveDate;

use epitrack_core::{EmployeeId, EquipmentId, LoanId};
use epitrack_employees::{Employee, EmployeeStatus, EmployeeSummary, UpdateEmployeeDetails};
use epitrack_equipment::{Equipment, UpdateEquipmentDetails};
use epitrack_loans::{
    Loan, LoanDetail, LoanStatus, LoanSummary, OpenLoan, RecordReturn, ReturnReceipt,
};

use crate::error::StoreResult;

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

/// Filter for loan listings. `None` fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub status: Option<LoanStatus>,
    pub employee_id: Option<EmployeeId>,
}

impl LoanFilter {
    pub fn matches(&self, loan: &Loan) -> bool {
        self.status.is_none_or(|s| s == loan.status)
            && self.employee_id.is_none_or(|e| e == loan.employee_id)
    }
}

#[async_trait]
pub trait EquipmentRegistry: Send + Sync {
    /// Insert a newly registered equipment (`Conflict` on a duplicate name).
    async fn insert_equipment(&self, equipment: &Equipment) -> StoreResult<()>;

    /// Apply a detail edit under the row lock. Stock counters are untouched.
    async fn update_equipment(&self, cmd: &UpdateEquipmentDetails) -> StoreResult<Equipment>;

    async fn get_equipment(&self, id: EquipmentId) -> StoreResult<Equipment>;

    /// All equipment ordered by name; `only_available` keeps those with stock > 0.
    async fn list_equipment(&self, only_available: bool) -> StoreResult<Vec<Equipment>>;

    /// Delete unless units are out on loan or loan history references it.
    async fn delete_equipment(&self, id: EquipmentId) -> StoreResult<()>;
}

#[async_trait]
pub trait EmployeeRegistry: Send + Sync {
    /// Insert a new employee (`Conflict` on a duplicate registration number).
    async fn insert_employee(&self, employee: &Employee) -> StoreResult<()>;

    async fn update_employee(&self, cmd: &UpdateEmployeeDetails) -> StoreResult<Employee>;

    async fn get_employee(&self, id: EmployeeId) -> StoreResult<Employee>;

    /// Employees ordered by name, optionally restricted to one status.
    async fn list_employees(&self, status: Option<EmployeeStatus>) -> StoreResult<Vec<Employee>>;

    /// Delete unless any loan, open or closed, references the employee.
    async fn delete_employee(&self, id: EmployeeId) -> StoreResult<()>;

    /// Headcount over every employee on record.
    async fn employee_summary(&self) -> StoreResult<EmployeeSummary>;
}

#[async_trait]
pub trait LoanLedger: Send + Sync {
    /// Validate and persist a loan, reserving stock for every line.
    async fn open_loan(&self, cmd: &OpenLoan, today: NaiveDate) -> StoreResult<LoanDetail>;

    /// Append a return event and reconcile stock and statuses.
    async fn record_return(&self, cmd: &RecordReturn) -> StoreResult<ReturnReceipt>;

    /// Flag Active loans due before `today` as Overdue. Returns how many changed.
    async fn sweep_overdue(&self, today: NaiveDate) -> StoreResult<usize>;

    async fn get_loan(&self, id: LoanId) -> StoreResult<LoanDetail>;

    /// Loan headers matching `filter`, newest first.
    async fn list_loans(&self, filter: LoanFilter) -> StoreResult<Vec<Loan>>;

    /// Status counts over every loan on record.
    async fn loan_summary(&self) -> StoreResult<LoanSummary>;
}

/// Everything the service layer needs from a backend.
pub trait Store: EquipmentRegistry + EmployeeRegistry + LoanLedger {}

impl<T> Store for T where T: EquipmentRegistry + EmployeeRegistry + LoanLedger {}
