//! Persistence mutations produced by the reconciliation engine.
//!
//! The engine never writes anything itself. It returns an ordered list of
//! `LedgerMutation`s, and each storage backend applies the whole list inside a
//! single atomic unit (or applies none of it).

use serde::{Deserialize, Serialize};

use epitrack_core::{EquipmentId, LoanId, LoanItemId};

use crate::model::{ItemStatus, Loan, LoanItem, LoanStatus, ReturnEvent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerMutation {
    /// Insert a new loan transaction header.
    LoanOpened(Loan),
    /// Insert a line item under an existing loan.
    ItemAdded(LoanItem),
    /// Move an equipment's available counter (negative on loan, positive on return).
    StockAdjusted { equipment_id: EquipmentId, delta: i64 },
    /// Append to a line item's return log.
    ReturnRecorded(ReturnEvent),
    ItemStatusChanged { item_id: LoanItemId, status: ItemStatus },
    LoanStatusChanged { loan_id: LoanId, status: LoanStatus },
}

impl LedgerMutation {
    /// Stable mutation name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerMutation::LoanOpened(_) => "loan.opened",
            LedgerMutation::ItemAdded(_) => "loan.item_added",
            LedgerMutation::StockAdjusted { .. } => "equipment.stock_adjusted",
            LedgerMutation::ReturnRecorded(_) => "loan.return_recorded",
            LedgerMutation::ItemStatusChanged { .. } => "loan.item_status_changed",
            LedgerMutation::LoanStatusChanged { .. } => "loan.status_changed",
        }
    }
}

/// Net stock delta per equipment across a batch of mutations.
pub fn stock_deltas(mutations: &[LedgerMutation]) -> Vec<(EquipmentId, i64)> {
    let mut deltas: Vec<(EquipmentId, i64)> = Vec::new();
    for mutation in mutations {
        if let LedgerMutation::StockAdjusted { equipment_id, delta } = mutation {
            match deltas.iter_mut().find(|(id, _)| id == equipment_id) {
                Some((_, total)) => *total += delta,
                None => deltas.push((*equipment_id, *delta)),
            }
        }
    }
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_deltas_net_per_equipment_in_first_seen_order() {
        let helmet = EquipmentId::new();
        let gloves = EquipmentId::new();
        let mutations = vec![
            LedgerMutation::StockAdjusted { equipment_id: helmet, delta: -3 },
            LedgerMutation::ItemStatusChanged {
                item_id: LoanItemId::new(),
                status: ItemStatus::Complete,
            },
            LedgerMutation::StockAdjusted { equipment_id: gloves, delta: -1 },
            LedgerMutation::StockAdjusted { equipment_id: helmet, delta: 2 },
        ];

        assert_eq!(stock_deltas(&mutations), vec![(helmet, -1), (gloves, -1)]);
        assert_eq!(mutations[1].kind(), "loan.item_status_changed");
    }

    #[test]
    fn batch_without_stock_moves_has_no_deltas() {
        let mutations = vec![LedgerMutation::LoanStatusChanged {
            loan_id: LoanId::new(),
            status: LoanStatus::Overdue,
        }];
        assert!(stock_deltas(&mutations).is_empty());
    }
}
