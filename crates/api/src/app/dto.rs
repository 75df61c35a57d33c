//! Request DTOs and read-model → JSON mapping.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use eventhire_auth::StaffRole;
use eventhire_catalog::{ProductCategory, StockMovementReason};
use eventhire_incidents::{DamageKind, IncidentOutcome};
use eventhire_infra::incident_engine::IncidentView;
use eventhire_infra::projections::{
    CustomerReadModel, IncidentRecord, ProductReadModel, RentalOrderReadModel, StaffRecord,
};

// ── Requests ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub category: ProductCategory,
    pub unit_price: u64,
    #[serde(default)]
    pub initial_stock: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: String,
    pub category: ProductCategory,
    pub unit_price: u64,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
    /// Defaults to a manual correction when omitted.
    pub reason: Option<StockMovementReason>,
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterCustomerRequest {
    pub first_name: String,
    pub last_name: String,
    pub national_id: Option<String>,
    pub contact: ContactRequest,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateContactRequest {
    pub contact: ContactRequest,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenRentalRequest {
    pub customer_id: String,
    pub event_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct AddLineRequest {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLineQuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateIncidentRequest {
    pub order_id: String,
    pub line_item_id: String,
    pub damage_kind: DamageKind,
    pub affected_quantity: i64,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveIncidentRequest {
    pub outcome: IncidentOutcome,
    pub replaced_quantity: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VoidIncidentRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateEmployeeRequest {
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub national_id: Option<String>,
    pub hired_on: Option<NaiveDate>,
    pub role: StaffRole,
    #[serde(default)]
    pub superuser: bool,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEmployeeProfileRequest {
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: StaffRole,
    #[serde(default)]
    pub superuser: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub password: String,
}

// ── Responses ───────────────────────────────────────────────────────────────

pub fn product_to_json(rm: ProductReadModel) -> JsonValue {
    json!({
        "id": rm.product_id.to_string(),
        "name": rm.name,
        "category": rm.category,
        "unit_price": rm.unit_price,
        "stock": rm.stock,
        "status": rm.status,
    })
}

pub fn customer_to_json(rm: CustomerReadModel) -> JsonValue {
    json!({
        "id": rm.customer_id.to_string(),
        "first_name": rm.first_name,
        "last_name": rm.last_name,
        "national_id": rm.national_id,
        "contact": {
            "email": rm.contact.email,
            "phone": rm.contact.phone,
            "address": rm.contact.address,
        },
        "notes": rm.notes,
        "status": rm.status,
    })
}

pub fn rental_to_json(rm: RentalOrderReadModel) -> JsonValue {
    let lines = rm
        .lines
        .into_iter()
        .map(|l| {
            json!({
                "line_item_id": l.line_item_id.to_string(),
                "product_id": l.product_id.to_string(),
                "quantity": l.quantity,
                "unit_price": l.unit_price,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "id": rm.order_id.to_string(),
        "customer_id": rm.customer_id.to_string(),
        "event_date": rm.event_date,
        "status": rm.status,
        "lines": lines,
    })
}

pub fn incident_to_json(rm: IncidentRecord) -> JsonValue {
    json!({
        "id": rm.incident_id.to_string(),
        "line_item_id": rm.line_item_id.to_string(),
        "order_id": rm.order_id.to_string(),
        "product_id": rm.product_id.to_string(),
        "status": rm.status,
        "damage_kind": rm.damage_kind,
        "affected_quantity": rm.affected_quantity,
        "outcome": rm.outcome,
        "replaced_quantity": rm.replaced_quantity,
        "description": rm.description,
        "opened_at": rm.opened_at,
        "resolved_at": rm.resolved_at,
    })
}

pub fn incident_view_to_json(view: IncidentView) -> JsonValue {
    json!({
        "id": view.entry.incident_id.to_string(),
        "line_item_id": view.line_item_id.to_string(),
        "order_id": view.order_id.to_string(),
        "product_id": view.product_id.to_string(),
        "status": view.entry.status,
        "damage_kind": view.entry.damage_kind,
        "affected_quantity": view.entry.affected_quantity,
        "outcome": view.entry.outcome,
        "replaced_quantity": view.entry.replaced_quantity,
        "description": view.entry.description,
        "opened_at": view.entry.opened_at,
        "resolved_at": view.entry.resolved_at,
    })
}

/// Staff record without credential material.
pub fn employee_to_json(rm: StaffRecord) -> JsonValue {
    json!({
        "id": rm.user_id.to_string(),
        "username": rm.username,
        "display_name": rm.display_name,
        "email": rm.email,
        "phone": rm.phone,
        "role": rm.role,
        "superuser": rm.superuser,
        "access_group": rm.access_group,
        "elevated": rm.elevated,
        "status": rm.status,
    })
}
