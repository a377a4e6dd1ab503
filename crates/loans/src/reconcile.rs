//! Stock reconciliation engine.
//!
//! Pure planning functions: each takes the current state as explicit values and
//! returns either a domain error (nothing to persist) or the new state plus the
//! ordered [`LedgerMutation`]s a backend must apply atomically.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use epitrack_core::{
    DomainError, DomainResult, EmployeeId, EquipmentId, LoanId, LoanItemId, ReturnEventId,
    ValueObject,
};
use epitrack_employees::Employee;
use epitrack_equipment::Equipment;

use crate::model::{
    Disposition, ItemStatus, Loan, LoanDetail, LoanItem, LoanItemDetail, LoanStatus, ReturnEvent,
};
use crate::mutation::LedgerMutation;

/// Maximum length of a return note.
pub const MAX_RETURN_NOTE_LEN: usize = 100;

/// One requested (equipment, quantity) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanLine {
    pub item_id: LoanItemId,
    pub equipment_id: EquipmentId,
    pub quantity: i64,
}

/// Command: OpenLoan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLoan {
    pub loan_id: LoanId,
    pub employee_id: EmployeeId,
    pub expected_return: NaiveDate,
    pub note: Option<String>,
    pub lines: Vec<LoanLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Availability snapshot of one equipment, read inside the same atomic unit
/// that will apply the resulting mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockLevel {
    pub equipment_id: EquipmentId,
    pub name: String,
    pub available: i64,
    pub total: i64,
}

impl ValueObject for StockLevel {}

impl From<&Equipment> for StockLevel {
    fn from(equipment: &Equipment) -> Self {
        Self {
            equipment_id: equipment.id_typed(),
            name: equipment.name().to_string(),
            available: equipment.available_stock(),
            total: equipment.total_stock(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanOutcome {
    pub detail: LoanDetail,
    pub mutations: Vec<LedgerMutation>,
}

/// Command: RecordReturn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReturn {
    pub return_id: ReturnEventId,
    pub item_id: LoanItemId,
    pub quantity: i64,
    pub disposition: Disposition,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// What a single return did, reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnReceipt {
    pub loan_id: LoanId,
    pub item_id: LoanItemId,
    pub equipment_id: EquipmentId,
    pub quantity: i64,
    pub disposition: Disposition,
    pub pending_after: i64,
    pub stock_restored: bool,
    pub item_completed: bool,
    pub loan_completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnOutcome {
    pub detail: LoanDetail,
    pub receipt: ReturnReceipt,
    pub mutations: Vec<LedgerMutation>,
}

/// Plan a new loan.
///
/// Checks run in a fixed order and the first failure wins: expected-return
/// date, borrower eligibility, non-empty request, duplicate equipment, then
/// each line in submitted order (quantity, existence, availability).
pub fn plan_loan(
    cmd: &OpenLoan,
    borrower: &Employee,
    stock: &[StockLevel],
    today: NaiveDate,
) -> DomainResult<LoanOutcome> {
    if borrower.id_typed() != cmd.employee_id {
        return Err(DomainError::invariant("employee_id mismatch"));
    }
    if cmd.expected_return < today {
        return Err(DomainError::invalid_date(cmd.expected_return, today));
    }

    borrower.ensure_can_borrow()?;

    if cmd.lines.is_empty() {
        return Err(DomainError::validation("a loan needs at least one line item"));
    }

    let mut seen: Vec<EquipmentId> = Vec::with_capacity(cmd.lines.len());
    for line in &cmd.lines {
        if seen.contains(&line.equipment_id) {
            let label = stock
                .iter()
                .find(|s| s.equipment_id == line.equipment_id)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| line.equipment_id.to_string());
            return Err(DomainError::duplicate_line_item(label));
        }
        seen.push(line.equipment_id);
    }

    for line in &cmd.lines {
        if line.quantity <= 0 {
            return Err(DomainError::invalid_quantity(line.quantity));
        }
        let level = stock
            .iter()
            .find(|s| s.equipment_id == line.equipment_id)
            .ok_or_else(|| DomainError::not_found(format!("equipment {}", line.equipment_id)))?;
        if line.quantity > level.available {
            return Err(DomainError::insufficient_stock(
                level.name.clone(),
                line.quantity,
                level.available,
            ));
        }
    }

    let loan = Loan {
        id: cmd.loan_id,
        employee_id: cmd.employee_id,
        created_at: cmd.occurred_at,
        expected_return: cmd.expected_return,
        status: LoanStatus::Active,
        note: trimmed(cmd.note.as_deref()),
    };

    let mut mutations = Vec::with_capacity(1 + cmd.lines.len() * 2);
    mutations.push(LedgerMutation::LoanOpened(loan.clone()));

    let mut detail = LoanDetail {
        loan,
        items: Vec::with_capacity(cmd.lines.len()),
    };
    for line in &cmd.lines {
        let item = LoanItem {
            id: line.item_id,
            loan_id: cmd.loan_id,
            equipment_id: line.equipment_id,
            quantity: line.quantity,
            status: ItemStatus::Pending,
        };
        detail.items.push(LoanItemDetail::new(item.clone()));
        mutations.push(LedgerMutation::ItemAdded(item));
        mutations.push(LedgerMutation::StockAdjusted {
            equipment_id: line.equipment_id,
            delta: -line.quantity,
        });
    }

    Ok(LoanOutcome { detail, mutations })
}

/// Plan a return against one line item of `current`.
pub fn plan_return(cmd: &RecordReturn, current: &LoanDetail) -> DomainResult<ReturnOutcome> {
    let item = current
        .item(cmd.item_id)
        .ok_or_else(|| DomainError::not_found(format!("loan item {}", cmd.item_id)))?;

    if cmd.quantity <= 0 {
        return Err(DomainError::invalid_quantity(cmd.quantity));
    }

    let note = trimmed(cmd.note.as_deref());
    if let Some(n) = &note {
        if n.chars().count() > MAX_RETURN_NOTE_LEN {
            return Err(DomainError::validation(format!(
                "return note cannot exceed {MAX_RETURN_NOTE_LEN} characters"
            )));
        }
    }

    let pending = item.pending();
    if pending < 0 {
        return Err(DomainError::invariant(format!(
            "loan item {} has more units returned than borrowed",
            item.item.id
        )));
    }
    if cmd.quantity > pending {
        return Err(DomainError::exceeds_pending(cmd.quantity, pending));
    }

    let event = ReturnEvent {
        id: cmd.return_id,
        item_id: cmd.item_id,
        quantity: cmd.quantity,
        disposition: cmd.disposition,
        returned_at: cmd.occurred_at,
        note,
    };

    let pending_after = pending - cmd.quantity;
    let stock_restored = cmd.disposition.restores_stock();
    let item_completed = pending_after == 0 && item.item.status == ItemStatus::Pending;

    let mut mutations = vec![LedgerMutation::ReturnRecorded(event)];
    if stock_restored {
        mutations.push(LedgerMutation::StockAdjusted {
            equipment_id: item.item.equipment_id,
            delta: cmd.quantity,
        });
    }
    if item_completed {
        mutations.push(LedgerMutation::ItemStatusChanged {
            item_id: cmd.item_id,
            status: ItemStatus::Complete,
        });
    }

    let mut detail = current.clone();
    for m in &mutations {
        detail.apply(m);
    }

    let loan_completed = !detail.has_pending_items() && detail.loan.status != LoanStatus::Returned;
    if loan_completed {
        let m = LedgerMutation::LoanStatusChanged {
            loan_id: detail.loan.id,
            status: LoanStatus::Returned,
        };
        detail.apply(&m);
        mutations.push(m);
    }

    let receipt = ReturnReceipt {
        loan_id: current.loan.id,
        item_id: cmd.item_id,
        equipment_id: item.item.equipment_id,
        quantity: cmd.quantity,
        disposition: cmd.disposition,
        pending_after,
        stock_restored,
        item_completed,
        loan_completed,
    };

    Ok(ReturnOutcome {
        detail,
        receipt,
        mutations,
    })
}

/// Flag every Active loan whose expected-return date is strictly before `today`.
///
/// Loans already Overdue or Returned produce nothing, so running the sweep
/// again over its own output is a no-op.
pub fn plan_overdue_sweep<'a>(
    loans: impl IntoIterator<Item = &'a Loan>,
    today: NaiveDate,
) -> Vec<LedgerMutation> {
    loans
        .into_iter()
        .filter(|loan| loan.is_overdue_on(today))
        .map(|loan| LedgerMutation::LoanStatusChanged {
            loan_id: loan.id,
            status: LoanStatus::Overdue,
        })
        .collect()
}

fn trimmed(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
