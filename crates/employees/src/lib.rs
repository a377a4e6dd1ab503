//! Employee registry domain module.
//!
//! Business rules for the people who borrow equipment, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod employee;

pub use employee::{
    Employee, EmployeeParts, EmployeeStatus, EmployeeSummary, RegisterEmployee, UpdateEmployeeDetails,
};
