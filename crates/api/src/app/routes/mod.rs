use axum::{
    routing::{get, post},
    Router,
};

pub mod accounting;
pub mod agencies;
pub mod common;
pub mod crm;
pub mod currency;
pub mod hr;
pub mod invoices;
pub mod projects;
pub mod system;
pub mod users;

/// Router for all authenticated (agency-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/activity", get(system::activity))
        .route("/api/database/query", post(system::database_query))
        .nest("/crm", crm::router())
        .nest("/projects", projects::router())
        .nest("/hr", hr::router())
        .nest("/accounting", accounting::router())
        .nest("/invoices", invoices::router())
        .nest("/users", users::router())
        .nest("/auth/2fa", users::two_factor_router())
        .nest("/currency", currency::router())
        .nest("/system/agencies", agencies::router())
}
