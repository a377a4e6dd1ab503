//! Infrastructure layer: storage backends, the loan desk service, config.

pub mod config;
pub mod error;
pub mod service;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use service::{EmployeeListing, LoanListing, LoanService};
pub use store::{
    EmployeeRegistry, EquipmentRegistry, InMemoryStore, LoanFilter, LoanLedger, PostgresStore,
    Store,
};
