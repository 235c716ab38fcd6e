use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use agencyhub_auth::Permission;
use agencyhub_core::{CurrencyCode, Money, RecordId};
use agencyhub_accounting::{
    seed_default_accounts, trial_balance, AddAccount, ChartCommand, ChartId, ChartOfAccounts,
    DeactivateAccount, DraftJournalEntry, JournalCommand, JournalEntry, JournalEntryId,
    JournalLine, JournalStatus, PostJournalEntry, ReverseJournalEntry,
};
use agencyhub_infra::DispatchError;

use crate::app::dto;
use crate::app::errors::{parse_account_kind, ApiError};
use crate::app::routes::common::{self, ApiJson, ApiQuery};
use crate::app::services::AppServices;
use crate::authz::{self, Guarded};
use crate::context::{AgencyContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/accounts", get(list_accounts).post(add_account))
        .route("/accounts/seed", post(seed_accounts))
        .route("/accounts/:code/deactivate", post(deactivate_account))
        .route("/journal", post(draft_entry).get(list_entries))
        .route("/journal/:id", get(get_entry))
        .route("/journal/:id/post", post(post_entry))
        .route("/journal/:id/reverse", post(reverse_entry))
        .route("/trial-balance", get(get_trial_balance))
}

/// The agency's chart, or an empty one before the first account is added.
async fn load_chart(services: &AppServices, agency: &AgencyContext) -> Result<ChartOfAccounts, ApiError> {
    let chart_id = ChartId::for_agency(agency.agency_id());
    match services
        .dispatcher()
        .load::<ChartOfAccounts>(agency.agency_id(), chart_id.0)
        .await
    {
        Ok(chart) => Ok(chart),
        Err(DispatchError::NotFound) => Ok(ChartOfAccounts::empty(chart_id)),
        Err(e) => Err(e.into()),
    }
}

fn accounts_json(chart: &ChartOfAccounts) -> serde_json::Value {
    json!({ "items": chart.accounts().collect::<Vec<_>>() })
}

async fn run_chart(
    services: &AppServices,
    agency: &AgencyContext,
    principal: &PrincipalContext,
    command: ChartCommand,
) -> Result<ChartOfAccounts, ApiError> {
    let chart_id = ChartId::for_agency(agency.agency_id());
    let guarded = Guarded::new(command, Permission::ACCOUNTING_WRITE);
    Ok(common::dispatch::<ChartOfAccounts>(services, agency, principal, chart_id.0, guarded)
        .await?
        .aggregate)
}

async fn run_journal(
    services: &AppServices,
    agency: &AgencyContext,
    principal: &PrincipalContext,
    record_id: RecordId,
    command: JournalCommand,
) -> Result<JournalEntry, ApiError> {
    let required = match command {
        JournalCommand::Draft(_) => Permission::ACCOUNTING_WRITE,
        JournalCommand::Post(_) | JournalCommand::Reverse(_) => Permission::ACCOUNTING_POST,
    };
    let guarded = Guarded::new(command, required);
    Ok(common::dispatch::<JournalEntry>(services, agency, principal, record_id, guarded)
        .await?
        .aggregate)
}

async fn voucher_number(
    services: &AppServices,
    agency: &AgencyContext,
    requested: Option<String>,
) -> Result<String, ApiError> {
    let existing = services
        .dispatcher()
        .list::<JournalEntry>(agency.agency_id())
        .await?;
    let taken = existing.iter().map(|e| e.number()).collect::<Vec<_>>();
    common::assign_number("JV", requested, &taken)
}

pub async fn list_accounts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::ACCOUNTING_READ)?;
    let chart = load_chart(&services, &agency).await?;
    Ok(common::ok(accounts_json(&chart)))
}

pub async fn add_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::AddAccountRequest>,
) -> Result<Response, ApiError> {
    let cmd = ChartCommand::AddAccount(AddAccount {
        agency_id: agency.agency_id(),
        chart_id: ChartId::for_agency(agency.agency_id()),
        code: body.code.trim().to_string(),
        name: body.name,
        kind: parse_account_kind(&body.kind)?,
        parent_code: body.parent_code,
        occurred_at: Utc::now(),
    });
    let chart = run_chart(&services, &agency, &principal, cmd).await?;
    Ok(common::created(accounts_json(&chart)))
}

/// Add whichever default accounts the chart does not have yet.
pub async fn seed_accounts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::ACCOUNTING_WRITE)?;
    let mut chart = load_chart(&services, &agency).await?;
    let mut added = 0usize;

    for account in seed_default_accounts() {
        if chart.account(&account.code).is_some() {
            continue;
        }
        let cmd = ChartCommand::AddAccount(AddAccount {
            agency_id: agency.agency_id(),
            chart_id: ChartId::for_agency(agency.agency_id()),
            code: account.code,
            name: account.name,
            kind: account.kind,
            parent_code: account.parent_code,
            occurred_at: Utc::now(),
        });
        chart = run_chart(&services, &agency, &principal, cmd).await?;
        added += 1;
    }

    info!(agency_id = %agency.agency_id(), added, "chart of accounts seeded");
    let mut body = accounts_json(&chart);
    body["added"] = json!(added);
    Ok(common::ok(body))
}

pub async fn deactivate_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(code): Path<String>,
) -> Result<Response, ApiError> {
    let cmd = ChartCommand::DeactivateAccount(DeactivateAccount {
        agency_id: agency.agency_id(),
        chart_id: ChartId::for_agency(agency.agency_id()),
        code,
        occurred_at: Utc::now(),
    });
    let chart = run_chart(&services, &agency, &principal, cmd).await?;
    Ok(common::ok(accounts_json(&chart)))
}

pub async fn draft_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::DraftJournalRequest>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::ACCOUNTING_WRITE)?;
    let chart = load_chart(&services, &agency).await?;
    let currency = body.currency.unwrap_or_else(|| services.currency().base());

    let lines = body
        .lines
        .into_iter()
        .map(|line| {
            Ok(JournalLine {
                account: chart.resolve(&line.account_code)?,
                amount: Money::new(line.amount, currency),
                is_debit: line.is_debit,
                memo: line.memo,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let number = voucher_number(&services, &agency, body.number).await?;

    let record_id = RecordId::new();
    let cmd = JournalCommand::Draft(DraftJournalEntry {
        agency_id: agency.agency_id(),
        entry_id: JournalEntryId::new(record_id),
        number,
        date: body.date,
        narration: body.narration,
        lines,
        reversal_of: None,
        occurred_at: Utc::now(),
    });
    let entry = run_journal(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::created(dto::journal_to_json(&entry)))
}

pub async fn list_entries(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::ACCOUNTING_READ)?;
    let mut entries = services.dispatcher().list::<JournalEntry>(agency.agency_id()).await?;
    entries.sort_by(|a, b| a.date().cmp(&b.date()).then_with(|| a.number().cmp(b.number())));
    let items = entries.iter().map(dto::journal_to_json).collect::<Vec<_>>();
    Ok(common::ok(json!({ "items": items })))
}

pub async fn get_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::ACCOUNTING_READ)?;
    let record_id = common::parse_id(&id, "journal entry")?;
    let entry = services
        .dispatcher()
        .load::<JournalEntry>(agency.agency_id(), record_id)
        .await?;
    Ok(common::ok(dto::journal_to_json(&entry)))
}

pub async fn post_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "journal entry")?;
    let cmd = JournalCommand::Post(PostJournalEntry {
        agency_id: agency.agency_id(),
        entry_id: JournalEntryId::new(record_id),
        occurred_at: Utc::now(),
    });
    let entry = run_journal(&services, &agency, &principal, record_id, cmd).await?;
    Ok(common::ok(dto::journal_to_json(&entry)))
}

/// Book a mirrored entry and mark the original reversed.
pub async fn reverse_entry(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::ReverseJournalRequest>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::ACCOUNTING_POST)?;
    let record_id = common::parse_id(&id, "journal entry")?;
    let original = services
        .dispatcher()
        .load::<JournalEntry>(agency.agency_id(), record_id)
        .await?;
    if original.status() != JournalStatus::Posted {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invariant_violation",
            format!("only posted entries can be reversed (entry is {})", original.status().as_str()),
        ));
    }

    let now = Utc::now();
    let reversal_record = RecordId::new();
    let reversal_id = JournalEntryId::new(reversal_record);
    let number = voucher_number(&services, &agency, None).await?;
    let date = body.date.unwrap_or_else(common::today);
    let draft = original.reversal_draft(reversal_id, number, date, &body.reason, now)?;

    run_journal(&services, &agency, &principal, reversal_record, JournalCommand::Draft(draft)).await?;
    let reversal = run_journal(
        &services,
        &agency,
        &principal,
        reversal_record,
        JournalCommand::Post(PostJournalEntry {
            agency_id: agency.agency_id(),
            entry_id: reversal_id,
            occurred_at: now,
        }),
    )
    .await?;
    let original = run_journal(
        &services,
        &agency,
        &principal,
        record_id,
        JournalCommand::Reverse(ReverseJournalEntry {
            agency_id: agency.agency_id(),
            entry_id: JournalEntryId::new(record_id),
            reversal_id,
            reason: body.reason,
            occurred_at: now,
        }),
    )
    .await?;

    Ok(common::created(json!({
        "original": dto::journal_to_json(&original),
        "reversal": dto::journal_to_json(&reversal),
    })))
}

pub async fn get_trial_balance(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<dto::CurrencyQuery>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::ACCOUNTING_READ)?;
    let currency = match query.currency.as_deref() {
        Some(raw) => CurrencyCode::parse(raw)?,
        None => services.currency().base(),
    };
    let entries = services.dispatcher().list::<JournalEntry>(agency.agency_id()).await?;
    let balance = trial_balance(&entries, currency);
    Ok(common::ok(json!({
        "currency": balance.currency,
        "rows": balance.rows,
        "total_debit": balance.total_debit,
        "total_credit": balance.total_credit,
        "balanced": balance.is_balanced(),
    })))
}
