//! Loan records: transaction header, line items and the return log.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use epitrack_core::{
    DomainError, EmployeeId, Entity, EquipmentId, LoanId, LoanItemId, ReturnEventId, ValueObject,
};

use crate::mutation::LedgerMutation;

/// Loan transaction status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Returned,
    Overdue,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Returned => "returned",
            LoanStatus::Overdue => "overdue",
        }
    }
}

impl core::str::FromStr for LoanStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LoanStatus::Active),
            "returned" => Ok(LoanStatus::Returned),
            "overdue" => Ok(LoanStatus::Overdue),
            other => Err(DomainError::validation(format!("unknown loan status: {other}"))),
        }
    }
}

/// Line item status: `Pending` until every borrowed unit is accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,
    Complete,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Complete => "complete",
        }
    }
}

impl core::str::FromStr for ItemStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "complete" => Ok(ItemStatus::Complete),
            other => Err(DomainError::validation(format!("unknown item status: {other}"))),
        }
    }
}

/// Condition under which returned units are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Returned,
    Damaged,
    Lost,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Returned => "returned",
            Disposition::Damaged => "damaged",
            Disposition::Lost => "lost",
        }
    }

    /// Whether units returned under this disposition go back to the available pool.
    ///
    /// Damaged units are counted as available again: there is no separate
    /// out-of-service pool.
    pub fn restores_stock(&self) -> bool {
        match self {
            Disposition::Returned | Disposition::Damaged => true,
            Disposition::Lost => false,
        }
    }
}

impl core::str::FromStr for Disposition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "returned" => Ok(Disposition::Returned),
            "damaged" => Ok(Disposition::Damaged),
            "lost" => Ok(Disposition::Lost),
            other => Err(DomainError::validation(format!("unknown disposition: {other}"))),
        }
    }
}

/// Loan transaction header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub employee_id: EmployeeId,
    pub created_at: DateTime<Utc>,
    pub expected_return: NaiveDate,
    pub status: LoanStatus,
    pub note: Option<String>,
}

impl Loan {
    /// Whether the overdue sweep should flag this loan on `today`.
    pub fn is_overdue_on(&self, today: NaiveDate) -> bool {
        self.status == LoanStatus::Active && self.expected_return < today
    }
}

impl Entity for Loan {
    type Id = LoanId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// One equipment type + quantity within a loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanItem {
    pub id: LoanItemId,
    pub loan_id: LoanId,
    pub equipment_id: EquipmentId,
    /// Borrowed quantity, fixed at creation.
    pub quantity: i64,
    pub status: ItemStatus,
}

/// Append-only record of one return against a line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnEvent {
    pub id: ReturnEventId,
    pub item_id: LoanItemId,
    pub quantity: i64,
    pub disposition: Disposition,
    pub returned_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl ValueObject for ReturnEvent {}

/// A line item together with its return history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanItemDetail {
    pub item: LoanItem,
    pub returns: Vec<ReturnEvent>,
}

impl LoanItemDetail {
    pub fn new(item: LoanItem) -> Self {
        Self {
            item,
            returns: Vec::new(),
        }
    }

    /// Sum of the quantities in the return log.
    pub fn returned_total(&self) -> i64 {
        self.returns.iter().map(|r| r.quantity).sum()
    }

    /// Borrowed but not yet accounted for by any return event.
    pub fn pending(&self) -> i64 {
        self.item.quantity - self.returned_total()
    }

    /// Units returned under a given disposition.
    pub fn total_for(&self, disposition: Disposition) -> i64 {
        self.returns
            .iter()
            .filter(|r| r.disposition == disposition)
            .map(|r| r.quantity)
            .sum()
    }
}

/// A loan transaction with all its line items: the unit the reconciliation
/// engine reasons about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanDetail {
    pub loan: Loan,
    pub items: Vec<LoanItemDetail>,
}

impl ValueObject for LoanDetail {}

impl LoanDetail {
    pub fn item(&self, item_id: LoanItemId) -> Option<&LoanItemDetail> {
        self.items.iter().find(|d| d.item.id == item_id)
    }

    pub fn has_pending_items(&self) -> bool {
        self.items
            .iter()
            .any(|d| d.item.status == ItemStatus::Pending)
    }

    /// Evolve in-memory state from a single mutation.
    ///
    /// Mutations addressed to other loans, and stock adjustments, are ignored.
    pub fn apply(&mut self, mutation: &LedgerMutation) {
        match mutation {
            LedgerMutation::LoanOpened(loan) => {
                if loan.id == self.loan.id {
                    self.loan = loan.clone();
                }
            }
            LedgerMutation::ItemAdded(item) => {
                if item.loan_id == self.loan.id && self.item(item.id).is_none() {
                    self.items.push(LoanItemDetail::new(item.clone()));
                }
            }
            LedgerMutation::ReturnRecorded(event) => {
                if let Some(detail) = self.item_mut(event.item_id) {
                    detail.returns.push(event.clone());
                }
            }
            LedgerMutation::ItemStatusChanged { item_id, status } => {
                if let Some(detail) = self.item_mut(*item_id) {
                    detail.item.status = *status;
                }
            }
            LedgerMutation::LoanStatusChanged { loan_id, status } => {
                if *loan_id == self.loan.id {
                    self.loan.status = *status;
                }
            }
            LedgerMutation::StockAdjusted { .. } => {}
        }
    }

    fn item_mut(&mut self, item_id: LoanItemId) -> Option<&mut LoanItemDetail> {
        self.items.iter_mut().find(|d| d.item.id == item_id)
    }
}

/// Per-status loan counts shown next to the loan list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanSummary {
    pub active: usize,
    pub overdue: usize,
    pub returned: usize,
}

impl LoanSummary {
    pub fn tally<'a>(loans: impl IntoIterator<Item = &'a Loan>) -> Self {
        loans
            .into_iter()
            .fold(Self::default(), |mut acc, loan| {
                match loan.status {
                    LoanStatus::Active => acc.active += 1,
                    LoanStatus::Overdue => acc.overdue += 1,
                    LoanStatus::Returned => acc.returned += 1,
                }
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn loan_with_items(quantities: &[i64]) -> LoanDetail {
        let loan = Loan {
            id: LoanId::new(),
            employee_id: EmployeeId::new(),
            created_at: test_time(),
            expected_return: test_time().date_naive(),
            status: LoanStatus::Active,
            note: None,
        };
        let items = quantities
            .iter()
            .map(|&quantity| {
                LoanItemDetail::new(LoanItem {
                    id: LoanItemId::new(),
                    loan_id: loan.id,
                    equipment_id: EquipmentId::new(),
                    quantity,
                    status: ItemStatus::Pending,
                })
            })
            .collect();
        LoanDetail { loan, items }
    }

    fn return_event(item_id: LoanItemId, quantity: i64, disposition: Disposition) -> ReturnEvent {
        ReturnEvent {
            id: ReturnEventId::new(),
            item_id,
            quantity,
            disposition,
            returned_at: test_time(),
            note: None,
        }
    }

    #[test]
    fn pending_is_derived_from_the_return_log() {
        let mut detail = loan_with_items(&[10]);
        let item_id = detail.items[0].item.id;
        detail.apply(&LedgerMutation::ReturnRecorded(return_event(item_id, 4, Disposition::Damaged)));
        detail.apply(&LedgerMutation::ReturnRecorded(return_event(item_id, 1, Disposition::Lost)));

        let item = detail.item(item_id).unwrap();
        assert_eq!(item.returned_total(), 5);
        assert_eq!(item.pending(), 5);
        assert_eq!(item.total_for(Disposition::Damaged), 4);
        assert_eq!(item.total_for(Disposition::Returned), 0);
    }

    #[test]
    fn apply_ignores_mutations_for_other_loans() {
        let mut detail = loan_with_items(&[2]);
        let before = detail.clone();

        detail.apply(&LedgerMutation::LoanStatusChanged {
            loan_id: LoanId::new(),
            status: LoanStatus::Returned,
        });
        detail.apply(&LedgerMutation::ItemStatusChanged {
            item_id: LoanItemId::new(),
            status: ItemStatus::Complete,
        });
        detail.apply(&LedgerMutation::StockAdjusted {
            equipment_id: EquipmentId::new(),
            delta: 2,
        });

        assert_eq!(detail, before);
    }

    #[test]
    fn has_pending_items_tracks_item_status() {
        let mut detail = loan_with_items(&[1, 1]);
        assert!(detail.has_pending_items());

        for id in detail.items.iter().map(|d| d.item.id).collect::<Vec<_>>() {
            detail.apply(&LedgerMutation::ItemStatusChanged {
                item_id: id,
                status: ItemStatus::Complete,
            });
        }
        assert!(!detail.has_pending_items());
    }

    #[test]
    fn overdue_only_applies_to_active_loans_past_due() {
        let mut loan = loan_with_items(&[1]).loan;
        let due = loan.expected_return;

        assert!(!loan.is_overdue_on(due));
        assert!(loan.is_overdue_on(due.succ_opt().unwrap()));

        loan.status = LoanStatus::Returned;
        assert!(!loan.is_overdue_on(due.succ_opt().unwrap()));
    }

    #[test]
    fn summary_counts_each_status() {
        let mut a = loan_with_items(&[1]).loan;
        let mut b = a.clone();
        let c = a.clone();
        a.status = LoanStatus::Overdue;
        b.status = LoanStatus::Returned;

        let summary = LoanSummary::tally([&a, &b, &c]);
        assert_eq!(
            summary,
            LoanSummary {
                active: 1,
                overdue: 1,
                returned: 1
            }
        );
    }

    #[test]
    fn only_lost_units_stay_out_of_stock() {
        assert!(Disposition::Returned.restores_stock());
        assert!(Disposition::Damaged.restores_stock());
        assert!(!Disposition::Lost.restores_stock());
    }
}
