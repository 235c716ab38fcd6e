use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use agencyhub_auth::{two_factor, Permission};
use agencyhub_core::UserId;
use agencyhub_infra::{hash_backup_code, NewUser, UserProfile};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::common::{self, ApiJson};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{AgencyContext, PrincipalContext};

const BACKUP_CODE_COUNT: usize = 10;
const TOTP_SKEW_STEPS: u64 = 1;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user))
        .route("/:id/roles", put(set_roles))
        .route("/:id/activate", post(activate_user))
        .route("/:id/deactivate", post(deactivate_user))
}

pub fn two_factor_router() -> Router {
    Router::new()
        .route("/setup", post(setup_two_factor))
        .route("/enable", post(enable_two_factor))
        .route("/verify", post(verify_two_factor))
        .route("/disable", post(disable_two_factor))
}

fn parse_user_id(raw: &str) -> Result<UserId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("invalid_id", "invalid user id"))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::USERS_READ)?;
    let users = services.users().list(agency.agency_id()).await?;
    let items = users.iter().map(dto::user_to_json).collect::<Vec<_>>();
    Ok(common::ok(json!({ "items": items })))
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<NewUser>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::USERS_WRITE)?;
    let user = services
        .users()
        .create(agency.agency_id(), body, Utc::now())
        .await?;
    Ok(common::created(dto::user_to_json(&user)))
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let user_id = parse_user_id(&id)?;
    if user_id != principal.user_id() {
        authz::require(&agency, &principal, Permission::USERS_READ)?;
    }
    let user = services
        .users()
        .get(agency.agency_id(), user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(common::ok(dto::user_to_json(&user)))
}

pub async fn set_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::RolesRequest>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::USERS_WRITE)?;
    let user_id = parse_user_id(&id)?;
    if body.roles.iter().any(|r| r.is_super_admin()) && !principal.is_super_admin() {
        return Err(ApiError::forbidden("only super admins can grant super_admin"));
    }
    let user = services
        .users()
        .set_roles(agency.agency_id(), user_id, body.roles)
        .await?;
    info!(agency_id = %agency.agency_id(), user_id = %user_id, "user roles changed");
    Ok(common::ok(dto::user_to_json(&user)))
}

async fn set_user_active(
    services: &AppServices,
    agency: &AgencyContext,
    principal: &PrincipalContext,
    id: &str,
    active: bool,
) -> Result<Response, ApiError> {
    authz::require(agency, principal, Permission::USERS_WRITE)?;
    let user_id = parse_user_id(id)?;
    if !active && user_id == principal.user_id() {
        return Err(ApiError::bad_request("validation_error", "you cannot deactivate yourself"));
    }
    let (mut profile, version) = services
        .users()
        .load(agency.agency_id(), user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    if profile.is_active != active {
        profile.is_active = active;
        services.users().save(&profile, version).await?;
        info!(agency_id = %agency.agency_id(), user_id = %user_id, active, "user activation changed");
    }
    Ok(common::ok(dto::user_to_json(&profile)))
}

pub async fn activate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    set_user_active(&services, &agency, &principal, &id, true).await
}

pub async fn deactivate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    set_user_active(&services, &agency, &principal, &id, false).await
}

/// The caller's own profile with its stored version.
async fn own_profile(
    services: &AppServices,
    agency: &AgencyContext,
    principal: &PrincipalContext,
) -> Result<(UserProfile, u64), ApiError> {
    services
        .users()
        .load(agency.agency_id(), principal.user_id())
        .await?
        .ok_or_else(|| ApiError::not_found("no user profile for this token"))
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

/// The TOTP step a code matches under an encrypted secret.
fn totp_step(services: &AppServices, encrypted: &str, code: &str) -> Result<Option<u64>, ApiError> {
    let secret = services.cipher().decrypt(encrypted)?;
    Ok(two_factor::matching_step(&secret, code, unix_now(), TOTP_SKEW_STEPS)?)
}

pub async fn setup_two_factor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Result<Response, ApiError> {
    let (mut profile, version) = own_profile(&services, &agency, &principal).await?;
    if profile.two_factor.enabled {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "two_factor_enabled",
            "two-factor authentication is already enabled",
        ));
    }

    let secret = two_factor::generate_secret();
    profile.two_factor.pending_secret = Some(services.cipher().encrypt(&secret)?);
    services.users().save(&profile, version).await?;

    let uri = two_factor::provisioning_uri(services.totp_issuer(), &profile.email, &secret);
    Ok(common::ok(json!({ "secret": secret, "otpauth_uri": uri })))
}

/// Confirm the pending secret with a first code; returns fresh backup codes.
pub async fn enable_two_factor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::TwoFactorCodeRequest>,
) -> Result<Response, ApiError> {
    let (mut profile, version) = own_profile(&services, &agency, &principal).await?;
    let pending = profile
        .two_factor
        .pending_secret
        .clone()
        .ok_or_else(|| ApiError::bad_request("two_factor_not_setup", "call /auth/2fa/setup first"))?;
    let Some(step) = totp_step(&services, &pending, &body.code)? else {
        return Err(ApiError::bad_request("invalid_code", "the code is not valid"));
    };

    let codes = two_factor::generate_backup_codes(BACKUP_CODE_COUNT);
    profile.two_factor.enabled = true;
    profile.two_factor.secret = Some(pending);
    profile.two_factor.pending_secret = None;
    profile.two_factor.backup_codes = codes.iter().map(|c| hash_backup_code(c)).collect();
    profile.two_factor.last_totp_step = Some(step);
    services.users().save(&profile, version).await?;

    info!(agency_id = %agency.agency_id(), user_id = %profile.id, "two-factor enabled");
    Ok(common::ok(json!({ "enabled": true, "backup_codes": codes })))
}

/// A TOTP code or an unused backup code; backup codes are consumed.
pub async fn verify_two_factor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::TwoFactorCodeRequest>,
) -> Result<Response, ApiError> {
    let (mut profile, version) = own_profile(&services, &agency, &principal).await?;
    let Some(secret) = profile.two_factor.secret.clone().filter(|_| profile.two_factor.enabled) else {
        return Err(ApiError::bad_request("two_factor_disabled", "two-factor authentication is not enabled"));
    };

    if let Some(step) = totp_step(&services, &secret, &body.code)? {
        if !profile.two_factor.accept_totp_step(step) {
            return Ok(common::ok(json!({ "valid": false, "reason": "code_already_used" })));
        }
        services.users().save(&profile, version).await?;
        return Ok(common::ok(json!({ "valid": true, "method": "totp" })));
    }
    if profile.two_factor.use_backup_code(&body.code) {
        services.users().save(&profile, version).await?;
        return Ok(common::ok(json!({
            "valid": true,
            "method": "backup_code",
            "backup_codes_remaining": profile.two_factor.backup_codes.len(),
        })));
    }
    Ok(common::ok(json!({ "valid": false })))
}

pub async fn disable_two_factor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::TwoFactorCodeRequest>,
) -> Result<Response, ApiError> {
    let (mut profile, version) = own_profile(&services, &agency, &principal).await?;
    let Some(secret) = profile.two_factor.secret.clone().filter(|_| profile.two_factor.enabled) else {
        return Err(ApiError::bad_request("two_factor_disabled", "two-factor authentication is not enabled"));
    };

    let valid = match totp_step(&services, &secret, &body.code)? {
        Some(step) => profile.two_factor.accept_totp_step(step),
        None => profile.two_factor.use_backup_code(&body.code),
    };
    if !valid {
        return Err(ApiError::bad_request("invalid_code", "the code is not valid"));
    }

    profile.two_factor = Default::default();
    services.users().save(&profile, version).await?;
    info!(agency_id = %agency.agency_id(), user_id = %profile.id, "two-factor disabled");
    Ok(common::ok(json!({ "enabled": false })))
}
