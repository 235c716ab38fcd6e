use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use agencyhub_accounting::JournalEntry;
use agencyhub_auth::Role;
use agencyhub_core::{AggregateRoot, CurrencyCode, Money, UserId};
use agencyhub_crm::{ClientId, Lead, LeadDetails, LeadStatus};
use agencyhub_hr::{Department, DepartmentId, Employee, EmployeeId, EmployeeProfile, EmployeeStatus};
use agencyhub_infra::{ActivityEntry, UserProfile};
use agencyhub_invoicing::{Invoice, InvoiceLine};
use agencyhub_projects::{Project, ProjectStatus, TaskStatus};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct LeadRequest {
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    /// Defaults to zero in the base currency.
    pub estimated_value: Option<Money>,
    pub assigned_to: Option<UserId>,
    pub notes: Option<String>,
}

impl LeadRequest {
    pub fn into_details(self, base_currency: CurrencyCode) -> LeadDetails {
        LeadDetails {
            name: self.name,
            company: self.company,
            email: self.email,
            phone: self.phone,
            source: self.source,
            estimated_value: self
                .estimated_value
                .unwrap_or_else(|| Money::zero(base_currency)),
            assigned_to: self.assigned_to,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListLeadsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LeadStatusRequest {
    pub status: LeadStatus,
}

#[derive(Debug, Deserialize)]
pub struct FollowUpRequest {
    pub at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
    pub state_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
    pub client_id: Option<ClientId>,
    pub manager: Option<UserId>,
    pub budget: Option<Money>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectStatusRequest {
    pub status: ProjectStatus,
}

#[derive(Debug, Deserialize)]
pub struct AddTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub assignee: Option<UserId>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct TaskStatusRequest {
    pub status: TaskStatus,
}

#[derive(Debug, Deserialize)]
pub struct AssignTaskRequest {
    pub assignee: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub struct LogCostRequest {
    pub amount: Money,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameDepartmentRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct DepartmentManagerRequest {
    pub manager: Option<EmployeeId>,
}

#[derive(Debug, Deserialize)]
pub struct HireEmployeeRequest {
    pub employee_code: String,
    #[serde(flatten)]
    pub profile: EmployeeProfile,
    pub user_id: Option<UserId>,
    pub department_id: Option<DepartmentId>,
    pub monthly_salary: Money,
    pub hire_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct TransferEmployeeRequest {
    pub department_id: Option<DepartmentId>,
}

#[derive(Debug, Deserialize)]
pub struct SalaryRequest {
    pub monthly_salary: Money,
}

#[derive(Debug, Deserialize)]
pub struct EmployeeStatusRequest {
    pub status: EmployeeStatus,
}

#[derive(Debug, Deserialize)]
pub struct TerminateEmployeeRequest {
    pub exit_date: NaiveDate,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddAccountRequest {
    pub code: String,
    pub name: String,
    pub kind: String,
    pub parent_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JournalLineRequest {
    pub account_code: String,
    /// Minor units, always positive; the side is `is_debit`.
    pub amount: i64,
    pub is_debit: bool,
    pub memo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DraftJournalRequest {
    /// Generated (`JV-00001`, ...) when omitted.
    pub number: Option<String>,
    pub date: NaiveDate,
    pub narration: Option<String>,
    pub currency: Option<CurrencyCode>,
    pub lines: Vec<JournalLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ReverseJournalRequest {
    pub reason: String,
    /// Date of the reversing voucher; today when omitted.
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CurrencyQuery {
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    /// Generated (`INV-00001`, ...) when omitted.
    pub number: Option<String>,
    pub client_id: Option<ClientId>,
    /// Required unless `client_id` names a stored client.
    pub client_name: Option<String>,
    pub currency: Option<CurrencyCode>,
    pub seller_state: String,
    /// Falls back to the client's state code.
    pub buyer_state: Option<String>,
    pub lines: Vec<InvoiceLine>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceLinesRequest {
    pub lines: Vec<InvoiceLine>,
}

#[derive(Debug, Deserialize)]
pub struct IssueInvoiceRequest {
    pub issue_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub amount: i64,
    pub paid_on: Option<NaiveDate>,
    pub method: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelInvoiceRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    /// Effective status, so `overdue` works as a filter.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RolesRequest {
    pub roles: Vec<Role>,
}

#[derive(Debug, Deserialize)]
pub struct TwoFactorCodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    pub amount: i64,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rate: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ListAgenciesQuery {
    #[serde(default)]
    pub active_only: bool,
}

// -------------------------
// Response mapping
// -------------------------

pub fn lead_to_json(lead: &Lead) -> JsonValue {
    json!({
        "id": lead.id().to_string(),
        "status": lead.status(),
        "details": lead.details(),
        "next_follow_up": lead.next_follow_up(),
        "converted_client_id": lead.converted_client_id().map(|c| c.to_string()),
        "version": lead.version(),
    })
}

pub fn project_to_json(project: &Project) -> JsonValue {
    json!({
        "id": project.id().to_string(),
        "name": project.name(),
        "description": project.description(),
        "client_id": project.client_id().map(|c| c.to_string()),
        "manager": project.manager(),
        "status": project.status(),
        "budget": project.budget(),
        "actual_cost": project.actual_cost(),
        "budget_utilisation_percent": project.budget_utilisation_percent(),
        "progress_percent": project.progress_percent(),
        "start_date": project.start_date(),
        "end_date": project.end_date(),
        "tasks": project.tasks(),
        "version": project.version(),
    })
}

pub fn department_to_json(department: &Department) -> JsonValue {
    json!({
        "id": department.id().to_string(),
        "name": department.name(),
        "description": department.description(),
        "manager": department.manager().map(|m| m.to_string()),
        "version": department.version(),
    })
}

pub fn employee_to_json(employee: &Employee) -> JsonValue {
    json!({
        "id": employee.id().to_string(),
        "employee_code": employee.employee_code(),
        "profile": employee.profile(),
        "full_name": employee.profile().map(|p| p.full_name()),
        "user_id": employee.user_id(),
        "department_id": employee.department_id().map(|d| d.to_string()),
        "monthly_salary": employee.monthly_salary(),
        "status": employee.status(),
        "hire_date": employee.hire_date(),
        "exit_date": employee.exit_date(),
        "version": employee.version(),
    })
}

pub fn journal_to_json(entry: &JournalEntry) -> JsonValue {
    json!({
        "id": entry.id().to_string(),
        "number": entry.number(),
        "date": entry.date(),
        "narration": entry.narration(),
        "status": entry.status(),
        "currency": entry.currency(),
        "total": entry.total_debit(),
        "lines": entry.lines(),
        "reversal_of": entry.reversal_of().map(|id| id.to_string()),
        "reversed_by": entry.reversed_by().map(|id| id.to_string()),
        "posted_at": entry.posted_at(),
        "version": entry.version(),
    })
}

pub fn invoice_to_json(invoice: &Invoice, today: NaiveDate) -> JsonValue {
    json!({
        "id": invoice.id().to_string(),
        "number": invoice.number(),
        "client_id": invoice.client_id().map(|c| c.to_string()),
        "client_name": invoice.client_name(),
        "currency": invoice.currency(),
        "supply_type": invoice.supply_type(),
        "lines": invoice.lines(),
        "totals": invoice.totals(),
        "issue_date": invoice.issue_date(),
        "due_date": invoice.due_date(),
        "payments": invoice.payments(),
        "total_paid": invoice.total_paid(),
        "outstanding_amount": invoice.outstanding_amount(),
        "status": invoice.status(),
        "effective_status": invoice.effective_status(today),
        "notes": invoice.notes(),
        "version": invoice.version(),
    })
}

pub fn activity_to_json(entry: &ActivityEntry) -> JsonValue {
    json!({
        "event_id": entry.event_id().to_string(),
        "record_id": entry.record_id().to_string(),
        "record_type": entry.record_type(),
        "sequence_number": entry.sequence_number(),
        "event_type": entry.event_type(),
        "occurred_at": entry.occurred_at(),
        "actor": entry.actor(),
        "payload": entry.payload(),
    })
}

/// Profile view; two-factor secrets and backup digests never leave the server.
pub fn user_to_json(user: &UserProfile) -> JsonValue {
    json!({
        "id": user.id.to_string(),
        "email": user.email,
        "full_name": user.full_name,
        "roles": user.roles,
        "is_active": user.is_active,
        "two_factor_enabled": user.two_factor.enabled,
        "backup_codes_remaining": user.two_factor.backup_codes.len(),
        "created_at": user.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agencyhub_infra::TwoFactorState;

    #[test]
    fn user_view_hides_two_factor_material() {
        let user = UserProfile {
            id: UserId::new(),
            agency_id: agencyhub_core::AgencyId::new(),
            email: "a@b.c".to_string(),
            full_name: "A B".to_string(),
            roles: vec![Role::ADMIN],
            is_active: true,
            two_factor: TwoFactorState {
                enabled: true,
                secret: Some("sealed".to_string()),
                pending_secret: None,
                backup_codes: vec!["digest".to_string()],
                last_totp_step: None,
            },
            created_at: Utc::now(),
        };
        let view = user_to_json(&user);
        assert_eq!(view["two_factor_enabled"], true);
        assert_eq!(view["backup_codes_remaining"], 1);
        assert!(!view.to_string().contains("sealed"));
        assert!(!view.to_string().contains("digest"));
    }

    #[test]
    fn hire_request_flattens_profile() {
        let req: HireEmployeeRequest = serde_json::from_value(json!({
            "employee_code": "E-1",
            "first_name": "Asha",
            "last_name": "Rao",
            "email": "asha@acme.test",
            "designation": "Designer",
            "monthly_salary": {"amount": 5_000_000, "currency": "INR"},
            "hire_date": "2024-04-01"
        }))
        .unwrap();
        assert_eq!(req.profile.full_name(), "Asha Rao");
        assert_eq!(req.monthly_salary.currency, CurrencyCode::INR);
    }
}
