use chrono::NaiveDate;
use serde::Deserialize;

use epitrack_employees::{Employee, EmployeeStatus};
use epitrack_equipment::{Equipment, EquipmentCategory};
use epitrack_infra::{EmployeeListing, LoanListing};
use epitrack_loans::{Disposition, Loan, LoanDetail, LoanItemDetail, ReturnEvent};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateEquipmentRequest {
    pub name: String,
    #[serde(default)]
    pub category: EquipmentCategory,
    pub certificate: Option<String>,
    pub total_stock: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEquipmentRequest {
    pub name: String,
    #[serde(default)]
    pub category: EquipmentCategory,
    pub certificate: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EquipmentListQuery {
    #[serde(default)]
    pub available: bool,
}

#[derive(Debug, Deserialize)]
pub struct EmployeeRequest {
    pub full_name: String,
    pub registration: String,
    pub job_title: Option<String>,
    #[serde(default)]
    pub status: EmployeeStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmployeeListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoanLineRequest {
    pub equipment_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateLoanRequest {
    pub employee_id: String,
    pub expected_return: NaiveDate, // YYYY-MM-DD
    pub note: Option<String>,
    pub items: Vec<LoanLineRequest>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoanListQuery {
    pub status: Option<String>,
    pub employee_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecordReturnRequest {
    pub quantity: i64,
    pub disposition: Disposition,
    pub note: Option<String>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn equipment_to_json(e: &Equipment) -> serde_json::Value {
    serde_json::json!({
        "id": e.id_typed().to_string(),
        "name": e.name(),
        "category": e.category().as_str(),
        "certificate": e.certificate().map(|c| c.as_str()),
        "total_stock": e.total_stock(),
        "available_stock": e.available_stock(),
        "on_loan": e.on_loan(),
        "registered_at": e.registered_at().to_rfc3339(),
        "updated_at": e.updated_at().to_rfc3339(),
    })
}

pub fn employee_to_json(e: &Employee) -> serde_json::Value {
    serde_json::json!({
        "id": e.id_typed().to_string(),
        "full_name": e.full_name(),
        "registration": e.registration(),
        "job_title": e.job_title(),
        "status": e.status().as_str(),
        "registered_at": e.registered_at().to_rfc3339(),
    })
}

pub fn loan_to_json(l: &Loan) -> serde_json::Value {
    serde_json::json!({
        "id": l.id.to_string(),
        "employee_id": l.employee_id.to_string(),
        "created_at": l.created_at.to_rfc3339(),
        "expected_return": l.expected_return.to_string(),
        "status": l.status.as_str(),
        "note": l.note,
    })
}

fn return_to_json(r: &ReturnEvent) -> serde_json::Value {
    serde_json::json!({
        "id": r.id.to_string(),
        "quantity": r.quantity,
        "disposition": r.disposition.as_str(),
        "returned_at": r.returned_at.to_rfc3339(),
        "note": r.note,
    })
}

fn item_to_json(d: &LoanItemDetail) -> serde_json::Value {
    serde_json::json!({
        "id": d.item.id.to_string(),
        "equipment_id": d.item.equipment_id.to_string(),
        "quantity": d.item.quantity,
        "returned": d.returned_total(),
        "pending": d.pending(),
        "status": d.item.status.as_str(),
        "returns": d.returns.iter().map(return_to_json).collect::<Vec<_>>(),
    })
}

pub fn loan_detail_to_json(d: &LoanDetail) -> serde_json::Value {
    let mut body = loan_to_json(&d.loan);
    body["items"] = serde_json::Value::Array(d.items.iter().map(item_to_json).collect());
    body
}

pub fn loan_listing_to_json(listing: &LoanListing) -> serde_json::Value {
    serde_json::json!({
        "items": listing.loans.iter().map(loan_to_json).collect::<Vec<_>>(),
        "summary": listing.summary,
    })
}

pub fn employee_listing_to_json(listing: &EmployeeListing) -> serde_json::Value {
    serde_json::json!({
        "items": listing.employees.iter().map(employee_to_json).collect::<Vec<_>>(),
        "summary": listing.summary,
    })
}
