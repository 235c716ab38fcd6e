use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;

use agencyhub_auth::Permission;
use agencyhub_core::{Aggregate, RecordId};
use agencyhub_crm::{
    ChangeLeadStatus, Client, ClientId, ConvertLead, CreateLead, Lead, LeadCommand, LeadId,
    LeadStatus, ScheduleFollowUp, UpdateLeadDetails, client_from_lead, pipeline_summary,
};
use agencyhub_infra::{Collection, RecordStore, store};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::common::{self, ApiJson, ApiQuery};
use crate::app::services::AppServices;
use crate::authz::{self, Guarded};
use crate::context::{AgencyContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/leads", post(create_lead).get(list_leads))
        .route("/leads/:id", get(get_lead).put(update_lead))
        .route("/leads/:id/status", post(change_lead_status))
        .route("/leads/:id/follow-up", post(schedule_follow_up))
        .route("/leads/:id/convert", post(convert_lead))
        .route("/pipeline", get(pipeline))
        .route("/clients", post(create_client).get(list_clients))
        .route("/clients/:id", get(get_client))
}

fn write(command: LeadCommand) -> Guarded<LeadCommand> {
    Guarded::new(command, Permission::CRM_LEADS_WRITE)
}

pub async fn create_lead(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::LeadRequest>,
) -> Result<Response, ApiError> {
    let record_id = RecordId::new();
    let cmd = LeadCommand::Create(CreateLead {
        agency_id: agency.agency_id(),
        lead_id: LeadId::new(record_id),
        details: body.into_details(services.currency().base()),
        occurred_at: Utc::now(),
    });

    let done = common::dispatch::<Lead>(&services, &agency, &principal, record_id, write(cmd)).await?;
    Ok(common::created(dto::lead_to_json(&done.aggregate)))
}

pub async fn list_leads(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<dto::ListLeadsQuery>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::CRM_LEADS_READ)?;

    let status = match query.status.as_deref() {
        Some(raw) => Some(LeadStatus::parse(raw).ok_or_else(|| {
            ApiError::bad_request("invalid_status", format!("unknown lead status '{raw}'"))
        })?),
        None => None,
    };

    let items = services
        .dispatcher()
        .list::<Lead>(agency.agency_id())
        .await?
        .iter()
        .filter(|lead| status.is_none_or(|s| lead.status() == s))
        .map(dto::lead_to_json)
        .collect::<Vec<_>>();
    Ok(common::ok(json!({ "items": items })))
}

pub async fn get_lead(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::CRM_LEADS_READ)?;
    let record_id = common::parse_id(&id, "lead")?;
    let lead = services
        .dispatcher()
        .load::<Lead>(agency.agency_id(), record_id)
        .await?;
    Ok(common::ok(dto::lead_to_json(&lead)))
}

pub async fn update_lead(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::LeadRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "lead")?;
    let cmd = LeadCommand::UpdateDetails(UpdateLeadDetails {
        agency_id: agency.agency_id(),
        lead_id: LeadId::new(record_id),
        details: body.into_details(services.currency().base()),
        occurred_at: Utc::now(),
    });

    let done = common::dispatch::<Lead>(&services, &agency, &principal, record_id, write(cmd)).await?;
    Ok(common::ok(dto::lead_to_json(&done.aggregate)))
}

pub async fn change_lead_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::LeadStatusRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "lead")?;
    let cmd = LeadCommand::ChangeStatus(ChangeLeadStatus {
        agency_id: agency.agency_id(),
        lead_id: LeadId::new(record_id),
        status: body.status,
        occurred_at: Utc::now(),
    });

    let done = common::dispatch::<Lead>(&services, &agency, &principal, record_id, write(cmd)).await?;
    Ok(common::ok(dto::lead_to_json(&done.aggregate)))
}

pub async fn schedule_follow_up(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::FollowUpRequest>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "lead")?;
    let cmd = LeadCommand::ScheduleFollowUp(ScheduleFollowUp {
        agency_id: agency.agency_id(),
        lead_id: LeadId::new(record_id),
        at: body.at,
        occurred_at: Utc::now(),
    });

    let done = common::dispatch::<Lead>(&services, &agency, &principal, record_id, write(cmd)).await?;
    Ok(common::ok(dto::lead_to_json(&done.aggregate)))
}

/// Mark the lead converted and store the resulting client record.
pub async fn convert_lead(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let record_id = common::parse_id(&id, "lead")?;
    let now = Utc::now();
    let cmd = LeadCommand::Convert(ConvertLead {
        agency_id: agency.agency_id(),
        lead_id: LeadId::new(record_id),
        client_id: ClientId::new(RecordId::new()),
        occurred_at: now,
    });

    authz::require(&agency, &principal, Permission::CRM_LEADS_WRITE)?;

    // Converted on a copy first: the client is written only for a lead that accepts it.
    let mut preview = services
        .dispatcher()
        .load::<Lead>(agency.agency_id(), record_id)
        .await?;
    preview.execute(&cmd)?;
    let client = client_from_lead(&preview, now)?;
    store::save_record(
        services.store(),
        agency.agency_id(),
        Collection::CLIENTS,
        client.id.0,
        &client,
        0,
    )
    .await?;

    let converted =
        common::dispatch::<Lead>(&services, &agency, &principal, record_id, write(cmd)).await;
    let done = match converted {
        Ok(done) => done,
        Err(e) => {
            services
                .store()
                .delete(agency.agency_id(), Collection::CLIENTS, client.id.0)
                .await?;
            return Err(e);
        }
    };

    Ok(common::created(json!({
        "lead": dto::lead_to_json(&done.aggregate),
        "client": client,
    })))
}

pub async fn pipeline(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::CRM_LEADS_READ)?;
    let leads = services.dispatcher().list::<Lead>(agency.agency_id()).await?;
    Ok(common::ok(json!({ "stages": pipeline_summary(&leads) })))
}

pub async fn create_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::CreateClientRequest>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::CRM_LEADS_WRITE)?;

    let mut client = Client::new(
        ClientId::new(RecordId::new()),
        agency.agency_id(),
        body.name,
        Utc::now(),
    )?;
    client.company = body.company;
    client.email = body.email;
    client.phone = body.phone;
    client.tax_id = body.tax_id;
    client.state_code = body.state_code.map(|s| s.trim().to_ascii_uppercase());

    store::save_record(
        services.store(),
        agency.agency_id(),
        Collection::CLIENTS,
        client.id.0,
        &client,
        0,
    )
    .await?;
    Ok(common::created(json!(client)))
}

pub async fn list_clients(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::CRM_LEADS_READ)?;
    let mut clients: Vec<Client> =
        store::list_records(services.store(), agency.agency_id(), Collection::CLIENTS).await?;
    clients.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(common::ok(json!({ "items": clients })))
}

pub async fn get_client(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::CRM_LEADS_READ)?;
    let record_id = common::parse_id(&id, "client")?;
    let (client, _) = load_client(&services, &agency, record_id)
        .await?
        .ok_or_else(|| ApiError::not_found("client not found"))?;
    Ok(common::ok(json!(client)))
}

pub async fn load_client(
    services: &AppServices,
    agency: &AgencyContext,
    record_id: RecordId,
) -> Result<Option<(Client, u64)>, ApiError> {
    Ok(store::load_record(services.store(), agency.agency_id(), Collection::CLIENTS, record_id).await?)
}
