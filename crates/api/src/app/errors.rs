use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use agencyhub_accounting::AccountKind;
use agencyhub_auth::{AuthzError, CryptoError, TotpError};
use agencyhub_core::DomainError;
use agencyhub_infra::{AgencyError, CurrencyError, DispatchError, QueryError, StoreError};

/// An error leaving the API as `{"error": code, "message": text}`.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(code = self.code, message = %self.message, "request failed");
        }
        json_error(self.status, self.code, self.message)
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Concurrency(msg) => Self::new(StatusCode::CONFLICT, "conflict", msg),
            DispatchError::Conflict(msg) => Self::new(StatusCode::CONFLICT, "conflict", msg),
            DispatchError::Validation(msg) => Self::bad_request("validation_error", msg),
            DispatchError::InvariantViolation(msg) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
            }
            DispatchError::NotFound => Self::not_found("not found"),
            DispatchError::TenantIsolation(msg) => {
                Self::new(StatusCode::FORBIDDEN, "tenant_isolation", msg)
            }
            DispatchError::Serialization(msg) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "serialization_error", msg)
            }
            DispatchError::Store(e) => e.into(),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        DispatchError::from(err).into()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Concurrency(msg) => Self::new(StatusCode::CONFLICT, "conflict", msg),
            other => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "store_error", other.to_string()),
        }
    }
}

impl From<AgencyError> for ApiError {
    fn from(err: AgencyError) -> Self {
        match err {
            AgencyError::Validation(msg) => Self::bad_request("validation_error", msg),
            e @ AgencyError::SubdomainTaken(_) => {
                Self::new(StatusCode::CONFLICT, "subdomain_taken", e.to_string())
            }
            AgencyError::NotFound => Self::not_found("agency not found"),
            e @ AgencyError::UserLimitReached(_) => {
                Self::new(StatusCode::CONFLICT, "user_limit_reached", e.to_string())
            }
            AgencyError::Store(e) => e.into(),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Timeout => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "query_timeout", err.to_string())
            }
            QueryError::Database(msg) => Self::bad_request("query_failed", msg),
            other => Self::bad_request("invalid_query", other.to_string()),
        }
    }
}

impl From<CurrencyError> for ApiError {
    fn from(err: CurrencyError) -> Self {
        match err {
            CurrencyError::UnknownCurrency(_) => Self::not_found(err.to_string()),
            CurrencyError::Overflow => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "overflow", err.to_string())
            }
            other => Self::bad_request("invalid_rate", other.to_string()),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        Self::forbidden(err.to_string())
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "crypto_error", err.to_string())
    }
}

impl From<TotpError> for ApiError {
    fn from(err: TotpError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "two_factor_error", err.to_string())
    }
}

pub fn parse_account_kind(s: &str) -> Result<AccountKind, ApiError> {
    AccountKind::parse(&s.to_lowercase()).ok_or_else(|| {
        ApiError::bad_request(
            "invalid_account_kind",
            "kind must be one of: asset, liability, equity, revenue, expense",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_http_statuses() {
        let cases = [
            (DispatchError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (DispatchError::InvariantViolation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (DispatchError::Conflict("x".into()), StatusCode::CONFLICT),
            (DispatchError::Concurrency("x".into()), StatusCode::CONFLICT),
            (DispatchError::NotFound, StatusCode::NOT_FOUND),
            (
                DispatchError::Store(StoreError::Backend("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn agency_errors_have_specific_codes() {
        assert_eq!(ApiError::from(AgencyError::SubdomainTaken("acme".into())).code(), "subdomain_taken");
        assert_eq!(ApiError::from(AgencyError::UserLimitReached(5)).code(), "user_limit_reached");
        assert_eq!(ApiError::from(QueryError::MultipleStatements).status(), StatusCode::BAD_REQUEST);
    }
}
