use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use agencyhub_auth::{effective_permissions, Permission};
use agencyhub_infra::QueryRequest;

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::common::{self, ApiJson, ApiQuery};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{AgencyContext, PrincipalContext};

const DEFAULT_ACTIVITY_LIMIT: usize = 50;
const MAX_ACTIVITY_LIMIT: usize = 500;

pub async fn health(State(services): State<Arc<AppServices>>) -> Response {
    let database = services.database_status().await;
    let status = if database == "error" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(json!({ "status": "ok", "database": database }))).into_response()
}

pub async fn whoami(
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    common::ok(json!({
        "agency_id": agency.agency_id().to_string(),
        "user_id": principal.user_id().to_string(),
        "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "permissions": effective_permissions(principal.roles())
            .iter()
            .map(|p| p.as_str().to_string())
            .collect::<Vec<_>>(),
    }))
}

/// Recent activity, restricted to record types the caller may read.
pub async fn activity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<dto::ActivityQuery>,
) -> Result<Response, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT);
    let entries = services
        .dispatcher()
        .activity()
        .recent(agency.agency_id(), limit)
        .await?;
    let items = entries
        .iter()
        .filter(|e| authz::can_read(&agency, &principal, e.record_type()))
        .map(dto::activity_to_json)
        .collect::<Vec<_>>();
    Ok(common::ok(json!({ "items": items })))
}

/// Agency-scoped SQL passthrough.
pub async fn database_query(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<QueryRequest>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::DATABASE_QUERY)?;
    let Some(sql) = services.sql() else {
        return Err(ApiError::new(
            StatusCode::NOT_IMPLEMENTED,
            "database_unavailable",
            "no database is configured",
        ));
    };
    let response = sql.execute(agency.agency_id(), &body).await?;
    Ok(common::ok(json!(response)))
}
