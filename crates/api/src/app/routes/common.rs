use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use agencyhub_core::RecordId;
use agencyhub_infra::{Dispatched, Snapshot};

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::authz::{Guarded, authorize_command};
use crate::context::{AgencyContext, PrincipalContext};

/// `Json<T>` whose rejections use the API error envelope.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|r| ApiError::new(r.status(), "invalid_body", r.body_text()))?;
        Ok(Self(value))
    }
}

/// `Query<T>` whose rejections use the API error envelope.
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|r| ApiError::new(r.status(), "invalid_query", r.body_text()))?;
        Ok(Self(value))
    }
}

pub fn parse_id(raw: &str, what: &str) -> Result<RecordId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("invalid_id", format!("invalid {what} id")))
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// `JV-00001` style document number, unique among `taken`.
///
/// A requested number is kept as given and rejected with 409 when already
/// used (case-insensitively). Otherwise numbering starts after the count of
/// existing documents and skips numbers that were claimed explicitly.
pub fn assign_number(prefix: &str, requested: Option<String>, taken: &[&str]) -> Result<String, ApiError> {
    let is_taken = |candidate: &str| taken.iter().any(|t| t.eq_ignore_ascii_case(candidate));

    if let Some(number) = requested.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
        if is_taken(&number) {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                "conflict",
                format!("number '{number}' is already used"),
            ));
        }
        return Ok(number);
    }

    let mut seq = taken.len() + 1;
    loop {
        let candidate = format!("{prefix}-{seq:05}");
        if !is_taken(&candidate) {
            return Ok(candidate);
        }
        seq += 1;
    }
}

pub fn ok(body: JsonValue) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

pub fn created(body: JsonValue) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

/// Authorize a guarded command, then run it through the dispatcher with the
/// principal recorded as the actor.
pub async fn dispatch<A: Snapshot>(
    services: &AppServices,
    agency: &AgencyContext,
    principal: &PrincipalContext,
    record_id: RecordId,
    command: Guarded<A::Command>,
) -> Result<Dispatched<A>, ApiError> {
    authorize_command(agency, principal, &command)?;
    Ok(services
        .dispatcher()
        .dispatch::<A>(agency.agency_id(), record_id, Some(principal.user_id()), command.inner)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_zero_padded_and_sequential() {
        assert_eq!(assign_number("JV", None, &[]).unwrap(), "JV-00001");
        assert_eq!(assign_number("INV", Some("  ".into()), &["INV-00001"]).unwrap(), "INV-00002");
    }

    #[test]
    fn numbers_never_repeat() {
        // INV-00002 was claimed explicitly; automatic numbering moves past it.
        let taken = ["INV-00002"];
        assert_eq!(assign_number("INV", None, &taken).unwrap(), "INV-00003");

        let err = assign_number("INV", Some("inv-00002".into()), &taken).unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(assign_number("INV", Some(" X-9 ".into()), &taken).unwrap(), "X-9");
    }

    #[test]
    fn malformed_ids_are_bad_requests() {
        let err = parse_id("not-a-uuid", "lead").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(parse_id(&RecordId::new().to_string(), "lead").is_ok());
    }
}
