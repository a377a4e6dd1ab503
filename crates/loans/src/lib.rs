//! Loan workflow domain module.
//!
//! Loan transactions, their line items and return log, plus the pure stock
//! reconciliation engine that plans every loan, return and overdue sweep.
//! No IO: backends apply the planned [`LedgerMutation`]s.

pub mod model;
pub mod mutation;
pub mod reconcile;

pub use model::{
    Disposition, ItemStatus, Loan, LoanDetail, LoanItem, LoanItemDetail, LoanStatus, LoanSummary,
    ReturnEvent,
};
pub use mutation::{LedgerMutation, stock_deltas};
pub use reconcile::{
    LoanLine, LoanOutcome, MAX_RETURN_NOTE_LEN, OpenLoan, RecordReturn, ReturnOutcome,
    ReturnReceipt, StockLevel, plan_loan, plan_overdue_sweep, plan_return,
};
