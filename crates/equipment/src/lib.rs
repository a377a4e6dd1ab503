//! Equipment registry domain module.
//!
//! This crate contains the business rules for protective equipment types and
//! their stock counters, implemented purely as deterministic domain logic
//! (no IO, no HTTP, no storage).

pub mod item;

pub use item::{
    ApprovalCertificate, Equipment, EquipmentCategory, EquipmentParts, RegisterEquipment,
    UpdateEquipmentDetails,
};
