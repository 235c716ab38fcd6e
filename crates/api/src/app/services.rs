//! Process-wide service wiring shared by every handler.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use agencyhub_auth::{FieldCipher, Hs256JwtValidator, JwtValidator};
use agencyhub_core::AgencyId;
use agencyhub_infra::{
    ActivityLog, AgencyDirectory, CommandDispatcher, Config, CurrencyService, InMemoryActivityLog,
    InMemoryRecordStore, PostgresActivityLog, PostgresRecordStore, RecordStore, SqlProxy, TtlCache,
    UserDirectory, schema,
};

/// Which persistence backend the process runs on.
#[derive(Clone)]
pub enum Backend {
    Memory,
    Postgres(Arc<PgPool>),
}

pub struct AppServices {
    backend: Backend,
    store: Arc<dyn RecordStore>,
    dispatcher: CommandDispatcher,
    agencies: AgencyDirectory,
    users: UserDirectory,
    jwt: Arc<Hs256JwtValidator>,
    cipher: FieldCipher,
    currency: CurrencyService,
    agency_status: TtlCache<bool>,
    sql: Option<SqlProxy>,
    totp_issuer: String,
}

/// Build services from configuration: Postgres when `DATABASE_URL` is set,
/// in-memory stores otherwise.
pub async fn build_services(config: &Config) -> Result<AppServices> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await
                .context("failed to connect to DATABASE_URL")?;
            schema::ensure_schema(&pool)
                .await
                .context("failed to apply database migrations")?;
            info!("using postgres stores");
            AppServices::postgres(config, Arc::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; data lives in memory and is lost on restart");
            AppServices::in_memory(config)
        }
    }
}

impl AppServices {
    pub fn in_memory(config: &Config) -> Result<Self> {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        let activity: Arc<dyn ActivityLog> = Arc::new(InMemoryActivityLog::new());
        Self::assemble(config, Backend::Memory, store, activity, None)
    }

    pub fn postgres(config: &Config, pool: Arc<PgPool>) -> Result<Self> {
        let store: Arc<dyn RecordStore> = Arc::new(PostgresRecordStore::from_shared(pool.clone()));
        let activity: Arc<dyn ActivityLog> = Arc::new(PostgresActivityLog::new(pool.clone()));
        let sql = SqlProxy::new(pool.clone(), config.query_row_limit, config.query_timeout_ms);
        Self::assemble(config, Backend::Postgres(pool), store, activity, Some(sql))
    }

    fn assemble(
        config: &Config,
        backend: Backend,
        store: Arc<dyn RecordStore>,
        activity: Arc<dyn ActivityLog>,
        sql: Option<SqlProxy>,
    ) -> Result<Self> {
        let cipher = match &config.encryption_key {
            Some(key) => FieldCipher::from_base64_key(key).context("invalid ENCRYPTION_KEY")?,
            None => FieldCipher::from_passphrase(&config.jwt_secret),
        };
        let agencies = AgencyDirectory::new(store.clone(), activity.clone());

        Ok(Self {
            backend,
            dispatcher: CommandDispatcher::new(store.clone(), activity),
            users: UserDirectory::new(store.clone(), agencies.clone()),
            agencies,
            store,
            jwt: Arc::new(Hs256JwtValidator::new(
                config.jwt_secret.as_bytes(),
                config.jwt_issuer.clone(),
            )),
            cipher,
            currency: CurrencyService::new(config.base_currency),
            agency_status: TtlCache::new(config.cache_ttl),
            sql,
            totp_issuer: config.jwt_issuer.clone(),
        })
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn agencies(&self) -> &AgencyDirectory {
        &self.agencies
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn jwt(&self) -> Arc<dyn JwtValidator> {
        self.jwt.clone()
    }

    /// Token minting for tools and tests sharing the server secret.
    pub fn token_issuer(&self) -> &Hs256JwtValidator {
        &self.jwt
    }

    pub fn cipher(&self) -> &FieldCipher {
        &self.cipher
    }

    pub fn currency(&self) -> &CurrencyService {
        &self.currency
    }

    pub fn sql(&self) -> Option<&SqlProxy> {
        self.sql.as_ref()
    }

    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    /// `"ok"`, `"error"` or `"memory"`.
    pub async fn database_status(&self) -> &'static str {
        match &self.backend {
            Backend::Memory => "memory",
            Backend::Postgres(_) => match self.store.ping().await {
                Ok(()) => "ok",
                Err(err) => {
                    warn!(error = %err, "database health check failed");
                    "error"
                }
            },
        }
    }

    /// Whether tokens for `agency_id` are accepted.
    ///
    /// Agencies without a directory record are accepted; only an explicit
    /// deactivation blocks access. Answers are cached for the configured TTL.
    pub async fn agency_is_active(&self, agency_id: AgencyId) -> Result<bool, agencyhub_infra::AgencyError> {
        if agency_id.is_platform() {
            return Ok(true);
        }
        self.agency_status
            .get_or_insert_with(&agency_status_key(agency_id), || async {
                Ok(self.agencies.is_active(agency_id).await?.unwrap_or(true))
            })
            .await
    }

    /// Drop the cached activation state after a super-admin change.
    pub fn forget_agency_status(&self, agency_id: AgencyId) {
        self.agency_status.invalidate(&agency_status_key(agency_id));
    }
}

fn agency_status_key(agency_id: AgencyId) -> String {
    format!("agency:{agency_id}:active")
}
