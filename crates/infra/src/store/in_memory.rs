use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use epitrack_core::{DomainError, EmployeeId, EquipmentId, LoanId, LoanItemId};
use epitrack_employees::{Employee, EmployeeStatus, EmployeeSummary, UpdateEmployeeDetails};
use epitrack_equipment::{Equipment, UpdateEquipmentDetails};
use epitrack_loans::{
    LedgerMutation, Loan, LoanDetail, LoanSummary, OpenLoan, RecordReturn, ReturnReceipt,
    StockLevel, plan_loan, plan_overdue_sweep, plan_return, stock_deltas,
};

use super::{EmployeeRegistry, EquipmentRegistry, LoanFilter, LoanLedger};
use crate::error::StoreResult;

#[derive(Debug, Default)]
struct Tables {
    equipment: HashMap<EquipmentId, Equipment>,
    employees: HashMap<EmployeeId, Employee>,
    loans: HashMap<LoanId, LoanDetail>,
    item_index: HashMap<LoanItemId, LoanId>,
}

impl Tables {
    fn equipment(&self, id: EquipmentId) -> Result<&Equipment, DomainError> {
        self.equipment
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("equipment {id}")))
    }

    fn employee(&self, id: EmployeeId) -> Result<&Employee, DomainError> {
        self.employees
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("employee {id}")))
    }

    /// Apply a planned batch all-or-nothing.
    ///
    /// Stock moves are staged on copies first; only if every counter stays in
    /// bounds is anything written.
    fn commit(&mut self, mutations: &[LedgerMutation], at: DateTime<Utc>) -> Result<(), DomainError> {
        let mut staged = Vec::new();
        for (id, delta) in stock_deltas(mutations) {
            if delta == 0 {
                continue;
            }
            let mut equipment = self.equipment(id)?.clone();
            equipment.adjust_available(delta, at)?;
            staged.push(equipment);
        }

        for mutation in mutations {
            match mutation {
                LedgerMutation::LoanOpened(loan) => {
                    self.loans.insert(
                        loan.id,
                        LoanDetail {
                            loan: loan.clone(),
                            items: Vec::new(),
                        },
                    );
                }
                LedgerMutation::ItemAdded(item) => {
                    self.item_index.insert(item.id, item.loan_id);
                    if let Some(detail) = self.loans.get_mut(&item.loan_id) {
                        detail.apply(mutation);
                    }
                }
                LedgerMutation::ReturnRecorded(event) => self.apply_to_item(event.item_id, mutation),
                LedgerMutation::ItemStatusChanged { item_id, .. } => {
                    self.apply_to_item(*item_id, mutation)
                }
                LedgerMutation::LoanStatusChanged { loan_id, .. } => {
                    if let Some(detail) = self.loans.get_mut(loan_id) {
                        detail.apply(mutation);
                    }
                }
                LedgerMutation::StockAdjusted { .. } => {}
            }
        }

        for equipment in staged {
            self.equipment.insert(equipment.id_typed(), equipment);
        }
        Ok(())
    }

    fn apply_to_item(&mut self, item_id: LoanItemId, mutation: &LedgerMutation) {
        if let Some(loan_id) = self.item_index.get(&item_id) {
            if let Some(detail) = self.loans.get_mut(loan_id) {
                detail.apply(mutation);
            }
        }
    }
}

/// In-memory backend for tests and local development.
///
/// A single async mutex guards every table, so each trait method is one
/// serialized atomic unit.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EquipmentRegistry for InMemoryStore {
    async fn insert_equipment(&self, equipment: &Equipment) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if t.equipment.values().any(|e| e.name() == equipment.name()) {
            return Err(DomainError::conflict("an equipment with this name already exists").into());
        }
        t.equipment.insert(equipment.id_typed(), equipment.clone());
        Ok(())
    }

    async fn update_equipment(&self, cmd: &UpdateEquipmentDetails) -> StoreResult<Equipment> {
        let mut t = self.tables.lock().await;
        let mut equipment = t.equipment(cmd.equipment_id)?.clone();
        equipment.update_details(cmd)?;
        if t
            .equipment
            .values()
            .any(|e| e.id_typed() != equipment.id_typed() && e.name() == equipment.name())
        {
            return Err(DomainError::conflict("an equipment with this name already exists").into());
        }
        t.equipment.insert(equipment.id_typed(), equipment.clone());
        Ok(equipment)
    }

    async fn get_equipment(&self, id: EquipmentId) -> StoreResult<Equipment> {
        let t = self.tables.lock().await;
        Ok(t.equipment(id)?.clone())
    }

    async fn list_equipment(&self, only_available: bool) -> StoreResult<Vec<Equipment>> {
        let t = self.tables.lock().await;
        let mut out: Vec<Equipment> = t
            .equipment
            .values()
            .filter(|e| !only_available || e.is_available())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(out)
    }

    async fn delete_equipment(&self, id: EquipmentId) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        let equipment = t.equipment(id)?;
        equipment.ensure_deletable()?;

        let referenced = t
            .loans
            .values()
            .flat_map(|d| d.items.iter())
            .any(|i| i.item.equipment_id == id);
        if referenced {
            return Err(DomainError::referential_block(format!(
                "equipment '{}' is referenced by loan history",
                equipment.name()
            ))
            .into());
        }

        t.equipment.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl EmployeeRegistry for InMemoryStore {
    async fn insert_employee(&self, employee: &Employee) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        if t
            .employees
            .values()
            .any(|e| e.registration() == employee.registration())
        {
            return Err(DomainError::conflict(
                "an employee with this registration number already exists",
            )
            .into());
        }
        t.employees.insert(employee.id_typed(), employee.clone());
        Ok(())
    }

    async fn update_employee(&self, cmd: &UpdateEmployeeDetails) -> StoreResult<Employee> {
        let mut t = self.tables.lock().await;
        let mut employee = t.employee(cmd.employee_id)?.clone();
        employee.update_details(cmd)?;
        if t.employees.values().any(|e| {
            e.id_typed() != employee.id_typed() && e.registration() == employee.registration()
        }) {
            return Err(DomainError::conflict(
                "an employee with this registration number already exists",
            )
            .into());
        }
        t.employees.insert(employee.id_typed(), employee.clone());
        Ok(employee)
    }

    async fn get_employee(&self, id: EmployeeId) -> StoreResult<Employee> {
        let t = self.tables.lock().await;
        Ok(t.employee(id)?.clone())
    }

    async fn list_employees(&self, status: Option<EmployeeStatus>) -> StoreResult<Vec<Employee>> {
        let t = self.tables.lock().await;
        let mut out: Vec<Employee> = t
            .employees
            .values()
            .filter(|e| status.is_none_or(|s| s == e.status()))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.full_name().cmp(b.full_name()));
        Ok(out)
    }

    async fn delete_employee(&self, id: EmployeeId) -> StoreResult<()> {
        let mut t = self.tables.lock().await;
        let loan_count = t
            .loans
            .values()
            .filter(|d| d.loan.employee_id == id)
            .count();
        t.employee(id)?.ensure_deletable(loan_count)?;
        t.employees.remove(&id);
        Ok(())
    }

    async fn employee_summary(&self) -> StoreResult<EmployeeSummary> {
        let t = self.tables.lock().await;
        Ok(EmployeeSummary::tally(t.employees.values()))
    }
}

#[async_trait]
impl LoanLedger for InMemoryStore {
    async fn open_loan(&self, cmd: &OpenLoan, today: NaiveDate) -> StoreResult<LoanDetail> {
        let mut t = self.tables.lock().await;
        let borrower = t.employee(cmd.employee_id)?;
        let stock: Vec<StockLevel> = cmd
            .lines
            .iter()
            .filter_map(|l| t.equipment.get(&l.equipment_id))
            .map(StockLevel::from)
            .collect();

        let outcome = plan_loan(cmd, borrower, &stock, today)?;
        t.commit(&outcome.mutations, cmd.occurred_at)?;
        Ok(outcome.detail)
    }

    async fn record_return(&self, cmd: &RecordReturn) -> StoreResult<ReturnReceipt> {
        let mut t = self.tables.lock().await;
        let loan_id = t
            .item_index
            .get(&cmd.item_id)
            .copied()
            .ok_or_else(|| DomainError::not_found(format!("loan item {}", cmd.item_id)))?;
        let current = t
            .loans
            .get(&loan_id)
            .ok_or_else(|| DomainError::invariant(format!("loan {loan_id} missing for item {}", cmd.item_id)))?;

        let outcome = plan_return(cmd, current)?;
        t.commit(&outcome.mutations, cmd.occurred_at)?;
        Ok(outcome.receipt)
    }

    async fn sweep_overdue(&self, today: NaiveDate) -> StoreResult<usize> {
        let mut t = self.tables.lock().await;
        let mutations = plan_overdue_sweep(t.loans.values().map(|d| &d.loan), today);
        t.commit(&mutations, Utc::now())?;
        Ok(mutations.len())
    }

    async fn get_loan(&self, id: LoanId) -> StoreResult<LoanDetail> {
        let t = self.tables.lock().await;
        t.loans
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("loan {id}")).into())
    }

    async fn list_loans(&self, filter: LoanFilter) -> StoreResult<Vec<Loan>> {
        let t = self.tables.lock().await;
        let mut out: Vec<Loan> = t
            .loans
            .values()
            .map(|d| &d.loan)
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn loan_summary(&self) -> StoreResult<LoanSummary> {
        let t = self.tables.lock().await;
        Ok(LoanSummary::tally(t.loans.values().map(|d| &d.loan)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use chrono::Duration;
    use epitrack_core::ReturnEventId;
    use epitrack_employees::RegisterEmployee;
    use epitrack_equipment::{EquipmentCategory, RegisterEquipment};
    use epitrack_loans::{Disposition, LoanLine, LoanStatus};

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn today() -> NaiveDate {
        test_time().date_naive()
    }

    async fn seed_equipment(store: &InMemoryStore, name: &str, total: i64) -> EquipmentId {
        let equipment = Equipment::register(&RegisterEquipment {
            equipment_id: EquipmentId::new(),
            name: name.to_string(),
            category: EquipmentCategory::Head,
            certificate: Some("12345".to_string()),
            total_stock: total,
            occurred_at: test_time(),
        })
        .unwrap();
        store.insert_equipment(&equipment).await.unwrap();
        equipment.id_typed()
    }

    async fn seed_employee(store: &InMemoryStore, registration: &str) -> EmployeeId {
        let employee = Employee::register(&RegisterEmployee {
            employee_id: EmployeeId::new(),
            full_name: "Carlos Dias".to_string(),
            registration: registration.to_string(),
            job_title: None,
            status: EmployeeStatus::Active,
            occurred_at: test_time(),
        })
        .unwrap();
        store.insert_employee(&employee).await.unwrap();
        employee.id_typed()
    }

    fn open(employee_id: EmployeeId, lines: &[(EquipmentId, i64)]) -> OpenLoan {
        OpenLoan {
            loan_id: LoanId::new(),
            employee_id,
            expected_return: today() + Duration::days(3),
            note: None,
            lines: lines
                .iter()
                .map(|(equipment_id, quantity)| LoanLine {
                    item_id: LoanItemId::new(),
                    equipment_id: *equipment_id,
                    quantity: *quantity,
                })
                .collect(),
            occurred_at: test_time(),
        }
    }

    fn give_back(item_id: LoanItemId, quantity: i64, disposition: Disposition) -> RecordReturn {
        RecordReturn {
            return_id: ReturnEventId::new(),
            item_id,
            quantity,
            disposition,
            note: None,
            occurred_at: test_time(),
        }
    }

    #[tokio::test]
    async fn failed_multi_line_loan_changes_nothing() {
        let store = InMemoryStore::new();
        let helmet = seed_equipment(&store, "Helmet", 5).await;
        let gloves = seed_equipment(&store, "Gloves", 1).await;
        let emp = seed_employee(&store, "E-1").await;

        let err = store
            .open_loan(&open(emp, &[(helmet, 2), (gloves, 2)]), today())
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::InsufficientStock { .. })));

        assert_eq!(store.get_equipment(helmet).await.unwrap().available_stock(), 5);
        assert!(store.list_loans(LoanFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn loan_and_return_round_trip_through_the_ledger() {
        let store = InMemoryStore::new();
        let helmet = seed_equipment(&store, "Helmet", 10).await;
        let emp = seed_employee(&store, "E-1").await;

        let detail = store.open_loan(&open(emp, &[(helmet, 10)]), today()).await.unwrap();
        let item_id = detail.items[0].item.id;
        assert_eq!(store.get_equipment(helmet).await.unwrap().available_stock(), 0);

        let receipt = store
            .record_return(&give_back(item_id, 4, Disposition::Damaged))
            .await
            .unwrap();
        assert_eq!(receipt.pending_after, 6);
        assert_eq!(store.get_equipment(helmet).await.unwrap().available_stock(), 4);

        let receipt = store
            .record_return(&give_back(item_id, 6, Disposition::Lost))
            .await
            .unwrap();
        assert!(receipt.loan_completed);
        assert_eq!(store.get_equipment(helmet).await.unwrap().available_stock(), 4);

        let stored = store.get_loan(detail.loan.id).await.unwrap();
        assert_eq!(stored.loan.status, LoanStatus::Returned);
        assert_eq!(stored.items[0].returns.len(), 2);
    }

    #[tokio::test]
    async fn rejected_return_leaves_log_and_stock_alone() {
        let store = InMemoryStore::new();
        let helmet = seed_equipment(&store, "Helmet", 10).await;
        let emp = seed_employee(&store, "E-1").await;
        let detail = store.open_loan(&open(emp, &[(helmet, 6)]), today()).await.unwrap();

        let err = store
            .record_return(&give_back(detail.items[0].item.id, 7, Disposition::Returned))
            .await
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(DomainError::ExceedsPending { requested: 7, pending: 6 })
        ));
        assert!(store.get_loan(detail.loan.id).await.unwrap().items[0].returns.is_empty());
        assert_eq!(store.get_equipment(helmet).await.unwrap().available_stock(), 4);
    }

    #[tokio::test]
    async fn concurrent_loans_never_oversell() {
        let store = Arc::new(InMemoryStore::new());
        let helmet = seed_equipment(&store, "Helmet", 5).await;
        let emp = seed_employee(&store, "E-1").await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.open_loan(&open(emp, &[(helmet, 1)]), today()).await
            }));
        }

        let mut accepted = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 5);
        assert_eq!(store.get_equipment(helmet).await.unwrap().available_stock(), 0);
    }

    #[tokio::test]
    async fn loan_racing_employee_deletion_never_orphans() {
        let store = Arc::new(InMemoryStore::new());
        let helmet = seed_equipment(&store, "Helmet", 2).await;
        let emp = seed_employee(&store, "E-1").await;

        let loan = {
            let store = store.clone();
            tokio::spawn(async move { store.open_loan(&open(emp, &[(helmet, 1)]), today()).await })
        };
        let delete = {
            let store = store.clone();
            tokio::spawn(async move { store.delete_employee(emp).await })
        };
        let (loan, delete) = (loan.await.unwrap(), delete.await.unwrap());

        match (loan, delete) {
            (Ok(_), Err(e)) => {
                assert!(matches!(e.domain(), Some(DomainError::ReferentialBlock(_))));
                assert_eq!(store.get_equipment(helmet).await.unwrap().available_stock(), 1);
            }
            (Err(e), Ok(())) => {
                assert!(matches!(e.domain(), Some(DomainError::NotFound(_))));
                assert_eq!(store.get_equipment(helmet).await.unwrap().available_stock(), 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn sweep_marks_past_due_loans_once() {
        let store = InMemoryStore::new();
        let helmet = seed_equipment(&store, "Helmet", 2).await;
        let emp = seed_employee(&store, "E-1").await;
        let detail = store.open_loan(&open(emp, &[(helmet, 1)]), today()).await.unwrap();

        let later = detail.loan.expected_return + Duration::days(1);
        assert_eq!(store.sweep_overdue(later).await.unwrap(), 1);
        assert_eq!(store.sweep_overdue(later).await.unwrap(), 0);

        let summary = store.loan_summary().await.unwrap();
        assert_eq!(summary.overdue, 1);
        assert_eq!(summary.active, 0);
    }

    #[tokio::test]
    async fn deletion_guards_follow_references() {
        let store = InMemoryStore::new();
        let helmet = seed_equipment(&store, "Helmet", 5).await;
        let spare = seed_equipment(&store, "Spare", 1).await;
        let emp = seed_employee(&store, "E-1").await;
        let idle = seed_employee(&store, "E-2").await;

        let detail = store.open_loan(&open(emp, &[(helmet, 2)]), today()).await.unwrap();
        let err = store.delete_equipment(helmet).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::ReferentialBlock(_))));

        store
            .record_return(&give_back(detail.items[0].item.id, 2, Disposition::Returned))
            .await
            .unwrap();
        let err = store.delete_equipment(helmet).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::ReferentialBlock(m)) if m.contains("history")));

        let err = store.delete_employee(emp).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::ReferentialBlock(_))));

        store.delete_equipment(spare).await.unwrap();
        store.delete_employee(idle).await.unwrap();
        assert!(matches!(
            store.get_employee(idle).await.unwrap_err().domain(),
            Some(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_names_and_registrations_conflict() {
        let store = InMemoryStore::new();
        seed_equipment(&store, "Helmet", 1).await;
        seed_employee(&store, "E-1").await;

        let dup = Equipment::register(&RegisterEquipment {
            equipment_id: EquipmentId::new(),
            name: "Helmet".to_string(),
            category: EquipmentCategory::Other,
            certificate: None,
            total_stock: 1,
            occurred_at: test_time(),
        })
        .unwrap();
        let err = store.insert_equipment(&dup).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));

        let dup = Employee::register(&RegisterEmployee {
            employee_id: EmployeeId::new(),
            full_name: "Someone Else".to_string(),
            registration: "E-1".to_string(),
            job_title: None,
            status: EmployeeStatus::Active,
            occurred_at: test_time(),
        })
        .unwrap();
        let err = store.insert_employee(&dup).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn listings_filter_and_order() {
        let store = InMemoryStore::new();
        let boots = seed_equipment(&store, "Boots", 1).await;
        seed_equipment(&store, "Apron", 1).await;
        let emp = seed_employee(&store, "E-1").await;
        store.open_loan(&open(emp, &[(boots, 1)]), today()).await.unwrap();

        let all = store.list_equipment(false).await.unwrap();
        assert_eq!(
            all.iter().map(|e| e.name()).collect::<Vec<_>>(),
            vec!["Apron", "Boots"]
        );
        let available = store.list_equipment(true).await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].name(), "Apron");

        let by_employee = store
            .list_loans(LoanFilter {
                status: Some(LoanStatus::Active),
                employee_id: Some(emp),
            })
            .await
            .unwrap();
        assert_eq!(by_employee.len(), 1);
        let none = store
            .list_loans(LoanFilter {
                status: Some(LoanStatus::Overdue),
                employee_id: None,
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
