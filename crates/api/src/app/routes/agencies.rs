//! Super-admin control panel over tenant agencies.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use agencyhub_auth::{AuthCache, Role};
use agencyhub_core::AgencyId;
use agencyhub_infra::{AgencyUpdate, NewAgency, NewUser};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::common::{self, ApiJson, ApiQuery};
use crate::app::services::AppServices;
use crate::authz::require_super_admin;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_agency).get(list_agencies))
        .route("/:id", get(get_agency).put(update_agency).delete(delete_agency))
        .route("/:id/activate", post(activate_agency))
        .route("/:id/deactivate", post(deactivate_agency))
        .route("/:id/usage", get(agency_usage))
}

/// A new agency plus, optionally, its first administrator.
#[derive(Debug, Deserialize)]
pub struct CreateAgencyRequest {
    #[serde(flatten)]
    pub agency: NewAgency,
    pub admin: Option<NewUser>,
}

fn parse_agency_id(raw: &str) -> Result<AgencyId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("invalid_id", "invalid agency id"))
}

pub async fn create_agency(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cache): Extension<Arc<AuthCache>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CreateAgencyRequest>,
) -> Result<Response, ApiError> {
    require_super_admin(&cache, &principal).await?;
    let now = Utc::now();
    let admin = body.admin.map(|mut admin| {
        if admin.roles.is_empty() {
            admin.roles = vec![Role::ADMIN];
        }
        admin
    });
    if let Some(admin) = &admin {
        admin.validate()?;
    }

    let agency = services.agencies().create(body.agency, now).await?;
    let admin = match admin {
        Some(admin) => match services.users().create(agency.id, admin, now).await {
            Ok(user) => Some(dto::user_to_json(&user)),
            Err(e) => {
                services.agencies().discard(agency.id).await?;
                return Err(e.into());
            }
        },
        None => None,
    };

    Ok(common::created(json!({ "agency": agency, "admin": admin })))
}

pub async fn list_agencies(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cache): Extension<Arc<AuthCache>>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<dto::ListAgenciesQuery>,
) -> Result<Response, ApiError> {
    require_super_admin(&cache, &principal).await?;
    let agencies = services.agencies().list(query.active_only).await?;
    Ok(common::ok(json!({ "items": agencies })))
}

pub async fn get_agency(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cache): Extension<Arc<AuthCache>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require_super_admin(&cache, &principal).await?;
    let agency = services.agencies().get(parse_agency_id(&id)?).await?;
    Ok(common::ok(json!(agency)))
}

pub async fn update_agency(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cache): Extension<Arc<AuthCache>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<AgencyUpdate>,
) -> Result<Response, ApiError> {
    require_super_admin(&cache, &principal).await?;
    let agency = services
        .agencies()
        .update(parse_agency_id(&id)?, body, Utc::now())
        .await?;
    Ok(common::ok(json!(agency)))
}

async fn set_active(
    services: &AppServices,
    cache: &AuthCache,
    principal: &PrincipalContext,
    id: &str,
    active: bool,
) -> Result<Response, ApiError> {
    require_super_admin(cache, principal).await?;
    let agency_id = parse_agency_id(id)?;
    let agency = services
        .agencies()
        .set_active(agency_id, active, Utc::now())
        .await?;
    services.forget_agency_status(agency_id);
    Ok(common::ok(json!(agency)))
}

pub async fn activate_agency(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cache): Extension<Arc<AuthCache>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    set_active(&services, &cache, &principal, &id, true).await
}

pub async fn deactivate_agency(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cache): Extension<Arc<AuthCache>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    set_active(&services, &cache, &principal, &id, false).await
}

pub async fn delete_agency(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cache): Extension<Arc<AuthCache>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require_super_admin(&cache, &principal).await?;
    let agency_id = parse_agency_id(&id)?;
    if agency_id.is_platform() {
        return Err(ApiError::bad_request("validation_error", "the platform namespace cannot be deleted"));
    }
    let removed = services.agencies().delete(agency_id, Utc::now()).await?;
    services.forget_agency_status(agency_id);
    Ok(common::ok(json!({ "deleted": true, "removed_records": removed })))
}

pub async fn agency_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(cache): Extension<Arc<AuthCache>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    require_super_admin(&cache, &principal).await?;
    let usage = services.agencies().usage(parse_agency_id(&id)?).await?;
    Ok(common::ok(json!(usage)))
}
