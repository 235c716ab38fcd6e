use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{debug, warn};

use agencyhub_auth::{AuthCache, JwtClaims, Role};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::{AgencyContext, PrincipalContext};

/// Authenticate the bearer token and attach the request context.
///
/// Inserts `AgencyContext`, `PrincipalContext` and a fresh `Arc<AuthCache>`
/// that lives exactly as long as the request.
pub async fn auth_middleware(
    State(services): State<Arc<AppServices>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match authenticate(&services, req.headers()).await {
        Ok((agency, principal, cache)) => {
            req.extensions_mut().insert(agency);
            req.extensions_mut().insert(principal);
            req.extensions_mut().insert(cache);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

async fn authenticate(
    services: &AppServices,
    headers: &HeaderMap,
) -> Result<(AgencyContext, PrincipalContext, Arc<AuthCache>), ApiError> {
    let token = extract_bearer(headers)?;
    let claims = services.jwt().validate(token, Utc::now()).map_err(|e| {
        debug!(error = %e, "rejected bearer token");
        ApiError::unauthorized(e.to_string())
    })?;

    if !services.agency_is_active(claims.agency_id).await? {
        warn!(agency_id = %claims.agency_id, user_id = %claims.sub, "token for inactive agency");
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "agency_inactive",
            "agency is deactivated",
        ));
    }

    let cache = Arc::new(AuthCache::new());
    let roles = cache
        .roles_for(claims.sub, || current_roles(services, &claims))
        .await?;

    Ok((
        AgencyContext::new(claims.agency_id),
        PrincipalContext::new(claims.sub, roles),
        cache,
    ))
}

/// Roles from the stored profile, falling back to the token's claims for
/// identities without one.
async fn current_roles(services: &AppServices, claims: &JwtClaims) -> Result<Vec<Role>, ApiError> {
    match services.users().get(claims.agency_id, claims.sub).await? {
        Some(profile) if !profile.is_active => Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "user_inactive",
            "user is deactivated",
        )),
        Some(profile) => Ok(profile.roles),
        None => Ok(claims.roles.clone()),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let missing = || ApiError::unauthorized("missing bearer token");

    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(missing)?;
    let header = header.to_str().map_err(|_| missing())?;
    let token = header.strip_prefix("Bearer ").ok_or_else(missing)?.trim();
    if token.is_empty() {
        return Err(missing());
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use axum::http::header::AUTHORIZATION;

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers).unwrap(), "abc.def");
    }

    #[test]
    fn malformed_authorization_is_unauthorized() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_bearer(&headers).unwrap_err().status(), StatusCode::UNAUTHORIZED);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert!(extract_bearer(&headers).is_err());
    }
}
