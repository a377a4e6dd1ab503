//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**; they are defined entirely by their
//! attribute values. The reconciliation engine works exclusively on value
//! objects (stock levels, loan snapshots, mutations) so that every decision
//! can be replayed from its inputs.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct StockLevel {
///     available: i64,
///     total: i64,
/// }
///
/// impl ValueObject for StockLevel {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
