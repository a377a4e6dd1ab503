use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use epitrack_core::{DomainError, DomainResult, EmployeeId, Entity};

/// Employee status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmployeeStatus {
    #[default]
    Active,
    Inactive,
}

impl EmployeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeStatus::Active => "active",
            EmployeeStatus::Inactive => "inactive",
        }
    }
}

impl core::str::FromStr for EmployeeStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EmployeeStatus::Active),
            "inactive" => Ok(EmployeeStatus::Inactive),
            other => Err(DomainError::validation(format!("unknown employee status: {other}"))),
        }
    }
}

/// Command: RegisterEmployee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEmployee {
    pub employee_id: EmployeeId,
    pub full_name: String,
    pub registration: String,
    pub job_title: Option<String>,
    pub status: EmployeeStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateEmployeeDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEmployeeDetails {
    pub employee_id: EmployeeId,
    pub full_name: String,
    pub registration: String,
    pub job_title: Option<String>,
    pub status: EmployeeStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Stored field values used to rebuild an [`Employee`] from persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeParts {
    pub id: EmployeeId,
    pub full_name: String,
    pub registration: String,
    pub job_title: Option<String>,
    pub status: EmployeeStatus,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entity: an employee who may borrow equipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Employee {
    id: EmployeeId,
    full_name: String,
    registration: String,
    job_title: Option<String>,
    status: EmployeeStatus,
    registered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn register(cmd: &RegisterEmployee) -> DomainResult<Self> {
        Ok(Self {
            id: cmd.employee_id,
            full_name: required("full name", &cmd.full_name)?,
            registration: required("registration number", &cmd.registration)?,
            job_title: optional(cmd.job_title.as_deref()),
            status: cmd.status,
            registered_at: cmd.occurred_at,
            updated_at: cmd.occurred_at,
        })
    }

    pub fn rehydrate(parts: EmployeeParts) -> Self {
        Self {
            id: parts.id,
            full_name: parts.full_name,
            registration: parts.registration,
            job_title: parts.job_title,
            status: parts.status,
            registered_at: parts.registered_at,
            updated_at: parts.updated_at,
        }
    }

    pub fn id_typed(&self) -> EmployeeId {
        self.id
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn registration(&self) -> &str {
        &self.registration
    }

    pub fn job_title(&self) -> Option<&str> {
        self.job_title.as_deref()
    }

    pub fn status(&self) -> EmployeeStatus {
        self.status
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Invariant helper: only active employees may take new loans.
    pub fn can_borrow(&self) -> bool {
        self.status == EmployeeStatus::Active
    }

    pub fn ensure_can_borrow(&self) -> DomainResult<()> {
        if !self.can_borrow() {
            return Err(DomainError::validation(format!(
                "employee '{}' is inactive and cannot borrow equipment",
                self.full_name
            )));
        }
        Ok(())
    }

    pub fn update_details(&mut self, cmd: &UpdateEmployeeDetails) -> DomainResult<()> {
        if cmd.employee_id != self.id {
            return Err(DomainError::invariant("employee_id mismatch"));
        }
        let full_name = required("full name", &cmd.full_name)?;
        let registration = required("registration number", &cmd.registration)?;

        self.full_name = full_name;
        self.registration = registration;
        self.job_title = optional(cmd.job_title.as_deref());
        self.status = cmd.status;
        self.updated_at = cmd.occurred_at;
        Ok(())
    }

    /// Deletion guard: an employee referenced by any loan, open or closed,
    /// cannot be removed.
    pub fn ensure_deletable(&self, loan_count: usize) -> DomainResult<()> {
        if loan_count > 0 {
            return Err(DomainError::referential_block(format!(
                "employee '{}' has {loan_count} loan(s) on record",
                self.full_name
            )));
        }
        Ok(())
    }
}

impl Entity for Employee {
    type Id = EmployeeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Headcount shown next to the employee list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeSummary {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

impl EmployeeSummary {
    pub fn tally<'a>(employees: impl IntoIterator<Item = &'a Employee>) -> Self {
        employees.into_iter().fold(Self::default(), |mut acc, e| {
            acc.total += 1;
            match e.status {
                EmployeeStatus::Active => acc.active += 1,
                EmployeeStatus::Inactive => acc.inactive += 1,
            }
            acc
        })
    }
}

fn required(field: &str, raw: &str) -> DomainResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(value.to_string())
}

fn optional(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn register_cmd() -> RegisterEmployee {
        RegisterEmployee {
            employee_id: EmployeeId::new(),
            full_name: " Maria Souza ".to_string(),
            registration: "A-1001".to_string(),
            job_title: Some("Welder".to_string()),
            status: EmployeeStatus::Active,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn register_trims_fields() {
        let employee = Employee::register(&register_cmd()).unwrap();
        assert_eq!(employee.full_name(), "Maria Souza");
        assert_eq!(employee.registration(), "A-1001");
        assert_eq!(employee.job_title(), Some("Welder"));
        assert!(employee.can_borrow());
    }

    #[test]
    fn register_requires_registration_number() {
        let mut cmd = register_cmd();
        cmd.registration = "  ".to_string();
        let err = Employee::register(&cmd).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("registration number") => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn inactive_employee_cannot_borrow() {
        let mut employee = Employee::register(&register_cmd()).unwrap();
        employee
            .update_details(&UpdateEmployeeDetails {
                employee_id: employee.id_typed(),
                full_name: "Maria Souza".to_string(),
                registration: "A-1001".to_string(),
                job_title: None,
                status: EmployeeStatus::Inactive,
                occurred_at: test_time(),
            })
            .unwrap();

        assert!(!employee.can_borrow());
        assert!(employee.job_title().is_none());
        assert!(matches!(
            employee.ensure_can_borrow().unwrap_err(),
            DomainError::Validation(_)
        ));
    }

    #[test]
    fn update_rejects_foreign_id() {
        let mut employee = Employee::register(&register_cmd()).unwrap();
        let err = employee
            .update_details(&UpdateEmployeeDetails {
                employee_id: EmployeeId::new(),
                full_name: "Other".to_string(),
                registration: "B-1".to_string(),
                job_title: None,
                status: EmployeeStatus::Active,
                occurred_at: test_time(),
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(employee.full_name(), "Maria Souza");
    }

    #[test]
    fn delete_is_blocked_by_any_loan() {
        let employee = Employee::register(&register_cmd()).unwrap();
        assert!(employee.ensure_deletable(0).is_ok());
        assert!(matches!(
            employee.ensure_deletable(1).unwrap_err(),
            DomainError::ReferentialBlock(_)
        ));
    }

    #[test]
    fn status_parses_from_lowercase() {
        assert_eq!("active".parse::<EmployeeStatus>().unwrap(), EmployeeStatus::Active);
        assert_eq!("inactive".parse::<EmployeeStatus>().unwrap(), EmployeeStatus::Inactive);
        assert!("Ativo".parse::<EmployeeStatus>().is_err());
    }

    #[test]
    fn summary_counts_by_status() {
        let active = Employee::register(&register_cmd()).unwrap();
        let mut cmd = register_cmd();
        cmd.employee_id = EmployeeId::new();
        cmd.registration = "A-1002".to_string();
        cmd.status = EmployeeStatus::Inactive;
        let inactive = Employee::register(&cmd).unwrap();

        let summary = EmployeeSummary::tally([&active, &inactive, &active]);
        assert_eq!(
            summary,
            EmployeeSummary {
                total: 3,
                active: 2,
                inactive: 1
            }
        );
        assert_eq!(EmployeeSummary::tally(std::iter::empty()), EmployeeSummary::default());
    }
}
