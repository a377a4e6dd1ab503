//! Loan desk service: the entry point the presentation layer calls.
//!
//! Builds domain entities from commands, resolves "today" through the business
//! calendar and delegates every atomic unit to the configured [`Store`].

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use epitrack_core::{BusinessCalendar, EmployeeId, EquipmentId, LoanId};
use epitrack_employees::{
    Employee, EmployeeStatus, EmployeeSummary, RegisterEmployee, UpdateEmployeeDetails,
};
use epitrack_equipment::{Equipment, RegisterEquipment, UpdateEquipmentDetails};
use epitrack_loans::{Loan, LoanDetail, LoanSummary, OpenLoan, RecordReturn, ReturnReceipt};

use crate::error::{StoreError, StoreResult};
use crate::store::{LoanFilter, Store};

/// Loan list plus the per-status counts shown next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoanListing {
    pub loans: Vec<Loan>,
    pub summary: LoanSummary,
}

/// Employee list plus the headcount over the whole registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeListing {
    pub employees: Vec<Employee>,
    pub summary: EmployeeSummary,
}

#[derive(Clone)]
pub struct LoanService {
    store: Arc<dyn Store>,
    calendar: BusinessCalendar,
}

impl LoanService {
    pub fn new(store: Arc<dyn Store>, calendar: BusinessCalendar) -> Self {
        Self { store, calendar }
    }

    pub fn calendar(&self) -> BusinessCalendar {
        self.calendar
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.calendar.today(now)
    }

    // -------------------------
    // Equipment registry
    // -------------------------

    #[instrument(skip(self, cmd), fields(equipment_id = %cmd.equipment_id), err)]
    pub async fn register_equipment(&self, cmd: RegisterEquipment) -> StoreResult<Equipment> {
        let equipment = Equipment::register(&cmd)?;
        self.store.insert_equipment(&equipment).await?;
        info!(
            name = equipment.name(),
            total_stock = equipment.total_stock(),
            "equipment registered"
        );
        Ok(equipment)
    }

    #[instrument(skip(self, cmd), fields(equipment_id = %cmd.equipment_id), err)]
    pub async fn update_equipment(&self, cmd: UpdateEquipmentDetails) -> StoreResult<Equipment> {
        self.store.update_equipment(&cmd).await
    }

    pub async fn get_equipment(&self, id: EquipmentId) -> StoreResult<Equipment> {
        self.store.get_equipment(id).await
    }

    /// Equipment by name. With `only_available`, only loan-eligible choices.
    pub async fn list_equipment(&self, only_available: bool) -> StoreResult<Vec<Equipment>> {
        self.store.list_equipment(only_available).await
    }

    #[instrument(skip(self), err)]
    pub async fn delete_equipment(&self, id: EquipmentId) -> StoreResult<()> {
        self.store.delete_equipment(id).await.inspect_err(|e| {
            warn!(equipment_id = %id, error = %e, "equipment deletion rejected");
        })?;
        info!(equipment_id = %id, "equipment deleted");
        Ok(())
    }

    // -------------------------
    // Employee registry
    // -------------------------

    #[instrument(skip(self, cmd), fields(employee_id = %cmd.employee_id), err)]
    pub async fn register_employee(&self, cmd: RegisterEmployee) -> StoreResult<Employee> {
        let employee = Employee::register(&cmd)?;
        self.store.insert_employee(&employee).await?;
        info!(registration = employee.registration(), "employee registered");
        Ok(employee)
    }

    #[instrument(skip(self, cmd), fields(employee_id = %cmd.employee_id), err)]
    pub async fn update_employee(&self, cmd: UpdateEmployeeDetails) -> StoreResult<Employee> {
        self.store.update_employee(&cmd).await
    }

    pub async fn get_employee(&self, id: EmployeeId) -> StoreResult<Employee> {
        self.store.get_employee(id).await
    }

    /// Employees by name, optionally one status, with counts over everyone.
    pub async fn list_employees(&self, status: Option<EmployeeStatus>) -> StoreResult<EmployeeListing> {
        let employees = self.store.list_employees(status).await?;
        let summary = self.store.employee_summary().await?;
        Ok(EmployeeListing { employees, summary })
    }

    #[instrument(skip(self), err)]
    pub async fn delete_employee(&self, id: EmployeeId) -> StoreResult<()> {
        self.store.delete_employee(id).await.inspect_err(|e| {
            warn!(employee_id = %id, error = %e, "employee deletion rejected");
        })?;
        info!(employee_id = %id, "employee deleted");
        Ok(())
    }

    // -------------------------
    // Loan workflow
    // -------------------------

    /// Create a loan and reserve stock for every line, all or nothing.
    #[instrument(skip(self, cmd), fields(loan_id = %cmd.loan_id, employee_id = %cmd.employee_id))]
    pub async fn open_loan(&self, cmd: OpenLoan) -> StoreResult<LoanDetail> {
        let today = self.today(cmd.occurred_at);
        match self.store.open_loan(&cmd, today).await {
            Ok(detail) => {
                for line in &detail.items {
                    info!(
                        equipment_id = %line.item.equipment_id,
                        delta = -line.item.quantity,
                        "stock reserved"
                    );
                }
                Ok(detail)
            }
            Err(e) => {
                log_rejection("loan", &e);
                Err(e)
            }
        }
    }

    /// Record a (possibly partial) return against one line item.
    #[instrument(skip(self, cmd), fields(item_id = %cmd.item_id, quantity = cmd.quantity))]
    pub async fn record_return(&self, cmd: RecordReturn) -> StoreResult<ReturnReceipt> {
        match self.store.record_return(&cmd).await {
            Ok(receipt) => {
                info!(
                    loan_id = %receipt.loan_id,
                    equipment_id = %receipt.equipment_id,
                    disposition = receipt.disposition.as_str(),
                    pending_after = receipt.pending_after,
                    stock_restored = receipt.stock_restored,
                    loan_completed = receipt.loan_completed,
                    "return recorded"
                );
                Ok(receipt)
            }
            Err(e) => {
                log_rejection("return", &e);
                Err(e)
            }
        }
    }

    /// Flag past-due loans as overdue on the business date of `now`.
    #[instrument(skip(self), err)]
    pub async fn sweep_overdue(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let today = self.today(now);
        let flagged = self.store.sweep_overdue(today).await?;
        if flagged > 0 {
            info!(flagged, %today, "loans flagged overdue");
        }
        Ok(flagged)
    }

    /// Sweep first so the listing and its counts reflect today's overdue state.
    pub async fn list_loans(&self, filter: LoanFilter, now: DateTime<Utc>) -> StoreResult<LoanListing> {
        self.sweep_overdue(now).await?;
        let loans = self.store.list_loans(filter).await?;
        let summary = self.store.loan_summary().await?;
        Ok(LoanListing { loans, summary })
    }

    pub async fn get_loan(&self, id: LoanId) -> StoreResult<LoanDetail> {
        self.store.get_loan(id).await
    }
}

fn log_rejection(operation: &'static str, err: &StoreError) {
    match err {
        StoreError::Domain(e) => warn!(operation, code = e.code(), error = %e, "rejected"),
        StoreError::Database(msg) => tracing::error!(operation, error = %msg, "store failure"),
    }
}
