use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::Response,
    routing::{get, put},
    Router,
};
use serde_json::json;
use tracing::info;

use agencyhub_auth::Permission;
use agencyhub_core::{CurrencyCode, Money};

use crate::app::dto;
use crate::app::errors::ApiError;
use crate::app::routes::common::{self, ApiJson, ApiQuery};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{AgencyContext, PrincipalContext};

pub fn router() -> Router {
    Router::new()
        .route("/convert", get(convert))
        .route("/rates", get(list_rates))
        .route("/rates/:code", put(set_rate))
}

/// Any authenticated user may convert; amounts are in minor units.
pub async fn convert(
    Extension(services): Extension<Arc<AppServices>>,
    ApiQuery(query): ApiQuery<dto::ConvertQuery>,
) -> Result<Response, ApiError> {
    let from = CurrencyCode::parse(&query.from)?;
    let to = CurrencyCode::parse(&query.to)?;
    let converted = services.currency().convert(Money::new(query.amount, from), to)?;
    Ok(common::ok(json!({
        "amount": converted.amount,
        "currency": converted.currency,
        "formatted": services.currency().format(converted),
    })))
}

pub async fn list_rates(
    Extension(services): Extension<Arc<AppServices>>,
) -> Result<Response, ApiError> {
    let rates = services
        .currency()
        .rates()
        .into_iter()
        .map(|(code, rate)| json!({ "currency": code, "rate": rate.to_string() }))
        .collect::<Vec<_>>();
    Ok(common::ok(json!({
        "base": services.currency().base(),
        "rates": rates,
    })))
}

pub async fn set_rate(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(agency): Extension<AgencyContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(code): Path<String>,
    ApiJson(body): ApiJson<dto::RateRequest>,
) -> Result<Response, ApiError> {
    authz::require(&agency, &principal, Permission::ACCOUNTING_WRITE)?;
    let currency = CurrencyCode::parse(&code)?;
    services.currency().set_rate(currency, body.rate)?;
    info!(currency = %currency, rate = %body.rate, "exchange rate updated");
    Ok(common::ok(json!({ "currency": currency, "rate": body.rate.to_string() })))
}
