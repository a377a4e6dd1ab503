use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use epitrack_core::{DomainError, DomainResult, Entity, EquipmentId, ValueObject};

/// Protection category of a piece of equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentCategory {
    Head,
    EyesAndFace,
    Hearing,
    Respiratory,
    Torso,
    UpperLimbs,
    LowerLimbs,
    FullBody,
    #[default]
    Other,
}

impl EquipmentCategory {
    pub const ALL: [EquipmentCategory; 9] = [
        EquipmentCategory::Head,
        EquipmentCategory::EyesAndFace,
        EquipmentCategory::Hearing,
        EquipmentCategory::Respiratory,
        EquipmentCategory::Torso,
        EquipmentCategory::UpperLimbs,
        EquipmentCategory::LowerLimbs,
        EquipmentCategory::FullBody,
        EquipmentCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentCategory::Head => "head",
            EquipmentCategory::EyesAndFace => "eyes_and_face",
            EquipmentCategory::Hearing => "hearing",
            EquipmentCategory::Respiratory => "respiratory",
            EquipmentCategory::Torso => "torso",
            EquipmentCategory::UpperLimbs => "upper_limbs",
            EquipmentCategory::LowerLimbs => "lower_limbs",
            EquipmentCategory::FullBody => "full_body",
            EquipmentCategory::Other => "other",
        }
    }
}

impl core::str::FromStr for EquipmentCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EquipmentCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown equipment category: {s}")))
    }
}

/// Approval certificate number ("C.A.") issued for a piece of protective equipment.
///
/// Digits only, at most 20 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApprovalCertificate(String);

impl ApprovalCertificate {
    pub const MAX_LEN: usize = 20;

    pub fn parse(raw: &str) -> DomainResult<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(DomainError::validation("approval certificate cannot be empty"));
        }
        if !value.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::validation(
                "approval certificate must contain only digits",
            ));
        }
        if value.len() > Self::MAX_LEN {
            return Err(DomainError::validation(format!(
                "approval certificate cannot exceed {} digits",
                Self::MAX_LEN
            )));
        }
        Ok(Self(value.to_string()))
    }

    /// Parse an optional certificate; blank input means "no certificate".
    pub fn parse_optional(raw: Option<&str>) -> DomainResult<Option<Self>> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => Self::parse(value).map(Some),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for ApprovalCertificate {}

impl core::fmt::Display for ApprovalCertificate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Command: RegisterEquipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEquipment {
    pub equipment_id: EquipmentId,
    pub name: String,
    pub category: EquipmentCategory,
    pub certificate: Option<String>,
    pub total_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateEquipmentDetails.
///
/// Stock counts are not editable here: the total is fixed at registration and
/// the available count is owned by the loan workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEquipmentDetails {
    pub equipment_id: EquipmentId,
    pub name: String,
    pub category: EquipmentCategory,
    pub certificate: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Stored field values used to rebuild an [`Equipment`] from persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentParts {
    pub id: EquipmentId,
    pub name: String,
    pub category: EquipmentCategory,
    pub certificate: Option<String>,
    pub total_stock: i64,
    pub available_stock: i64,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entity: one equipment type with its stock counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Equipment {
    id: EquipmentId,
    name: String,
    category: EquipmentCategory,
    certificate: Option<ApprovalCertificate>,
    total_stock: i64,
    available_stock: i64,
    registered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Equipment {
    pub const MAX_NAME_LEN: usize = 100;

    /// Register a new equipment type. All units start out available.
    pub fn register(cmd: &RegisterEquipment) -> DomainResult<Self> {
        let name = validate_name(&cmd.name)?;
        let certificate = ApprovalCertificate::parse_optional(cmd.certificate.as_deref())?;

        if cmd.total_stock <= 0 {
            return Err(DomainError::validation("total stock must be at least 1"));
        }

        Ok(Self {
            id: cmd.equipment_id,
            name,
            category: cmd.category,
            certificate,
            total_stock: cmd.total_stock,
            available_stock: cmd.total_stock,
            registered_at: cmd.occurred_at,
            updated_at: cmd.occurred_at,
        })
    }

    /// Rebuild from stored values, re-checking the stock invariant.
    pub fn rehydrate(parts: EquipmentParts) -> DomainResult<Self> {
        let certificate = ApprovalCertificate::parse_optional(parts.certificate.as_deref())?;
        check_stock_bounds(&parts.name, parts.total_stock, parts.available_stock)?;

        Ok(Self {
            id: parts.id,
            name: parts.name,
            category: parts.category,
            certificate,
            total_stock: parts.total_stock,
            available_stock: parts.available_stock,
            registered_at: parts.registered_at,
            updated_at: parts.updated_at,
        })
    }

    pub fn id_typed(&self) -> EquipmentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> EquipmentCategory {
        self.category
    }

    pub fn certificate(&self) -> Option<&ApprovalCertificate> {
        self.certificate.as_ref()
    }

    pub fn total_stock(&self) -> i64 {
        self.total_stock
    }

    pub fn available_stock(&self) -> i64 {
        self.available_stock
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Units currently out on loan (or lost and never restocked).
    pub fn on_loan(&self) -> i64 {
        self.total_stock - self.available_stock
    }

    /// Whether at least one unit can be lent right now.
    pub fn is_available(&self) -> bool {
        self.available_stock > 0
    }

    pub fn update_details(&mut self, cmd: &UpdateEquipmentDetails) -> DomainResult<()> {
        if cmd.equipment_id != self.id {
            return Err(DomainError::invariant("equipment_id mismatch"));
        }
        let name = validate_name(&cmd.name)?;
        let certificate = ApprovalCertificate::parse_optional(cmd.certificate.as_deref())?;

        self.name = name;
        self.category = cmd.category;
        self.certificate = certificate;
        self.updated_at = cmd.occurred_at;
        Ok(())
    }

    /// Move the available counter by `delta` (negative on loan, positive on return).
    ///
    /// The loan workflow validates requests before producing a delta, so a
    /// delta that would leave `0..=total` signals corrupt state.
    pub fn adjust_available(&mut self, delta: i64, occurred_at: DateTime<Utc>) -> DomainResult<()> {
        if delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }
        let next = self.available_stock + delta;
        check_stock_bounds(&self.name, self.total_stock, next)?;

        self.available_stock = next;
        self.updated_at = occurred_at;
        Ok(())
    }

    /// Deletion guard: no unit of this equipment may be out on loan.
    pub fn ensure_deletable(&self) -> DomainResult<()> {
        if self.available_stock < self.total_stock {
            return Err(DomainError::referential_block(format!(
                "equipment '{}' has {} unit(s) out on loan",
                self.name,
                self.on_loan()
            )));
        }
        Ok(())
    }
}

impl Entity for Equipment {
    type Id = EquipmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn validate_name(raw: &str) -> DomainResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if name.chars().count() > Equipment::MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "name cannot exceed {} characters",
            Equipment::MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn check_stock_bounds(name: &str, total: i64, available: i64) -> DomainResult<()> {
    if total <= 0 {
        return Err(DomainError::invariant(format!(
            "equipment '{name}' has non-positive total stock ({total})"
        )));
    }
    if available < 0 {
        return Err(DomainError::invariant(format!(
            "available stock of '{name}' cannot go negative ({available})"
        )));
    }
    if available > total {
        return Err(DomainError::invariant(format!(
            "available stock of '{name}' ({available}) cannot exceed total ({total})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn register_cmd(name: &str, total: i64) -> RegisterEquipment {
        RegisterEquipment {
            equipment_id: EquipmentId::new(),
            name: name.to_string(),
            category: EquipmentCategory::Head,
            certificate: Some("498".to_string()),
            total_stock: total,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn register_starts_fully_available() {
        let equipment = Equipment::register(&register_cmd("  Helmet  ", 5)).unwrap();
        assert_eq!(equipment.name(), "Helmet");
        assert_eq!(equipment.total_stock(), 5);
        assert_eq!(equipment.available_stock(), 5);
        assert_eq!(equipment.on_loan(), 0);
        assert_eq!(equipment.certificate().map(|c| c.as_str()), Some("498"));
    }

    #[test]
    fn register_rejects_zero_total() {
        let err = Equipment::register(&register_cmd("Helmet", 0)).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("at least 1") => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn register_rejects_blank_name() {
        let err = Equipment::register(&register_cmd("   ", 1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn certificate_must_be_digits() {
        let mut cmd = register_cmd("Goggles", 2);
        cmd.certificate = Some("CA-12".to_string());
        let err = Equipment::register(&cmd).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("only digits") => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn blank_certificate_is_treated_as_absent() {
        let mut cmd = register_cmd("Gloves", 2);
        cmd.certificate = Some("  ".to_string());
        let equipment = Equipment::register(&cmd).unwrap();
        assert!(equipment.certificate().is_none());
    }

    #[test]
    fn update_details_keeps_stock_untouched() {
        let mut equipment = Equipment::register(&register_cmd("Helmet", 5)).unwrap();
        equipment.adjust_available(-2, test_time()).unwrap();

        equipment
            .update_details(&UpdateEquipmentDetails {
                equipment_id: equipment.id_typed(),
                name: "Helmet V-Gard".to_string(),
                category: EquipmentCategory::Head,
                certificate: None,
                occurred_at: test_time(),
            })
            .unwrap();

        assert_eq!(equipment.name(), "Helmet V-Gard");
        assert_eq!(equipment.total_stock(), 5);
        assert_eq!(equipment.available_stock(), 3);
        assert!(equipment.certificate().is_none());
    }

    #[test]
    fn adjust_available_cannot_exceed_total() {
        let mut equipment = Equipment::register(&register_cmd("Helmet", 5)).unwrap();
        let err = equipment.adjust_available(1, test_time()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(equipment.available_stock(), 5);
    }

    #[test]
    fn adjust_available_cannot_go_negative() {
        let mut equipment = Equipment::register(&register_cmd("Helmet", 2)).unwrap();
        let err = equipment.adjust_available(-3, test_time()).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(equipment.available_stock(), 2);
    }

    #[test]
    fn delete_is_blocked_while_units_are_out() {
        let mut equipment = Equipment::register(&register_cmd("Helmet", 5)).unwrap();
        equipment.adjust_available(-2, test_time()).unwrap();

        let err = equipment.ensure_deletable().unwrap_err();
        match err {
            DomainError::ReferentialBlock(msg) if msg.contains("2 unit(s)") => {}
            other => panic!("expected ReferentialBlock, got {other:?}"),
        }

        equipment.adjust_available(2, test_time()).unwrap();
        assert!(equipment.ensure_deletable().is_ok());
    }

    #[test]
    fn rehydrate_rejects_corrupt_counters() {
        let parts = EquipmentParts {
            id: EquipmentId::new(),
            name: "Helmet".to_string(),
            category: EquipmentCategory::Head,
            certificate: None,
            total_stock: 3,
            available_stock: 4,
            registered_at: test_time(),
            updated_at: test_time(),
        };
        let err = Equipment::rehydrate(parts).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn category_round_trips_through_str() {
        for category in EquipmentCategory::ALL {
            assert_eq!(category.as_str().parse::<EquipmentCategory>().unwrap(), category);
        }
        assert!("boots".parse::<EquipmentCategory>().is_err());
    }

    proptest! {
        /// Property: whatever sequence of adjustments is attempted, the available
        /// counter stays within `0..=total` and rejected adjustments change nothing.
        #[test]
        fn available_stays_within_bounds(
            total in 1i64..50,
            deltas in prop::collection::vec(-20i64..20, 0..40),
        ) {
            let mut equipment = Equipment::register(&register_cmd("Helmet", total)).unwrap();
            for delta in deltas {
                let before = equipment.available_stock();
                match equipment.adjust_available(delta, Utc::now()) {
                    Ok(()) => prop_assert_eq!(equipment.available_stock(), before + delta),
                    Err(_) => prop_assert_eq!(equipment.available_stock(), before),
                }
                prop_assert!(equipment.available_stock() >= 0);
                prop_assert!(equipment.available_stock() <= equipment.total_stock());
            }
        }
    }
}
