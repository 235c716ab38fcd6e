use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde_json::json;

use agencyhub_auth::Permission;
use agencyhub_core::RecordId;
use agencyhub_invoicing::{
    CancelInvoice, CreateDraft, EffectiveStatus, Invoice, InvoiceCommand, InvoiceId, IssueInvoice,
    RecordPayment, ReplaceLines,
};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::common::{self, ApiJson, ApiQuery};
use crate::app::routes::crm::load_client;
use crate::app::services::AppServices;
use crate::authz::{self, Guarded};
use crate::context::{AgencyContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route("/:id", get(get_invoice))
        .route("/:id/lines", put(replace_lines))
        .route("/:id/issue", post(issue_invoice))
        .route("/:id/payments", post(record_payment))
        .route("/:id/cancel", post(cancel_invoice))
}

async fn run(
    services: &AppServices,
    agency: &AgencyContext,
    principal: &PrincipalContext,
    record_id: RecordId,
    command: InvoiceCommand,
) -> Result<Invoice, ApiError> {
    let guarded = Guarded::new(command, Permission::INVOICING_WRITE);
    Ok(common::dispatch::<Invoice>(services, agency, principal, record_id, guarded)
        .await?
        .aggregate)
}

/// Draft an invoice. Client name and buyer state fall back to the stored
/// client, and the buyer state to the seller state after that.
pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::CreateInvoiceRequest>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::INVOICING_WRITE)?;

    let client = match body.client_id {
        Some(client_id) => Some(
            load_client(&services, &agency, client_id.0)
                .await?
                .map(|(c, _)| c)
                .ok_or_else(|| ApiError::bad_request("unknown_client", "client does not exist"))?,
        ),
        None => None,
    };

    let client_name = body
        .client_name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| client.as_ref().map(|c| c.name.clone()))
        .ok_or_else(|| ApiError::bad_request("validation_error", "client_name is required"))?;
    let buyer_state = body
        .buyer_state
        .or_else(|| client.as_ref().and_then(|c| c.state_code.clone()))
        .unwrap_or_else(|| body.seller_state.clone());

    let existing = services.dispatcher().list::<Invoice>(agency.agency_id()).await?;
    let taken = existing.iter().map(|i| i.number()).collect::<Vec<_>>();
    let number = common::assign_number("INV", body.number, &taken)?;

    let record_id = RecordId::new();
    let cmd = InvoiceCommand::CreateDraft(CreateDraft {
        agency_id: agency.agency_id(),
        invoice_id: InvoiceId::new(record_id),
        number,
        client_id: body.client_id,
        client_name,
        currency: body.currency.unwrap_or_else(|| services.currency().base()),
        seller_state: body.seller_state,
        buyer_state,
        lines: body.lines,
        notes: body.notes,
        occurred_at: Utc::now(),
    });
    let invoice = run(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::created(dto::invoice_to_json(&invoice, common::today())))
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<dto::ListInvoicesQuery>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::INVOICING_READ)?;
    let status = match query.status.as_deref() {
        Some(raw) => Some(EffectiveStatus::parse(raw).ok_or_else(|| {
            ApiError::bad_request("invalid_status", format!("unknown invoice status '{raw}'"))
        })?),
        None => None,
    };

    let today = common::today();
    let mut invoices = services.dispatcher().list::<Invoice>(agency.agency_id()).await?;
    invoices.retain(|inv| status.is_none_or(|s| inv.effective_status(today) == s));
    invoices.sort_by(|a, b| a.number().cmp(b.number()));
    let items = invoices
        .iter()
        .map(|inv| dto::invoice_to_json(inv, today))
        .collect::<Vec<_>>();
    Ok(common::ok(json!({ "items": items })))
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::INVOICING_READ)?;
    let record_id = common::parse_id(&id, "invoice")?;
    let invoice = services
        .dispatcher()
        .load::<Invoice>(agency.agency_id(), record_id)
        .await?;
    Ok(common::ok(dto::invoice_to_json(&invoice, common::today())))
}

pub async fn replace_lines(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::ReplaceLinesRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "invoice")?;
    let cmd = InvoiceCommand::ReplaceLines(ReplaceLines {
        agency_id: agency.agency_id(),
        invoice_id: InvoiceId::new(record_id),
        lines: body.lines,
        occurred_at: Utc::now(),
    });
    let invoice = run(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::invoice_to_json(&invoice, common::today())))
}

pub async fn issue_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::IssueInvoiceRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "invoice")?;
    let cmd = InvoiceCommand::Issue(IssueInvoice {
        agency_id: agency.agency_id(),
        invoice_id: InvoiceId::new(record_id),
        issue_date: body.issue_date.unwrap_or_else(common::today),
        due_date: body.due_date,
        occurred_at: Utc::now(),
    });
    let invoice = run(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::invoice_to_json(&invoice, common::today())))
}

pub async fn record_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::PaymentRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "invoice")?;
    let cmd = InvoiceCommand::RecordPayment(RecordPayment {
        agency_id: agency.agency_id(),
        invoice_id: InvoiceId::new(record_id),
        amount: body.amount,
        paid_on: body.paid_on.unwrap_or_else(common::today),
        method: body.method,
        reference: body.reference,
        occurred_at: Utc::now(),
    });
    let invoice = run(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::invoice_to_json(&invoice, common::today())))
}

pub async fn cancel_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::CancelInvoiceRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "invoice")?;
    let cmd = InvoiceCommand::Cancel(CancelInvoice {
        agency_id: agency.agency_id(),
        invoice_id: InvoiceId::new(record_id),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    let invoice = run(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::invoice_to_json(&invoice, common::today())))
}
