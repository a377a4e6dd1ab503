//! `epitrack-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error taxonomy shared by every workflow, and the business
//! calendar used to decide what "today" means.

pub mod calendar;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use calendar::BusinessCalendar;
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{EmployeeId, EquipmentId, LoanId, LoanItemId, ReturnEventId};
pub use value_object::ValueObject;
