//! Super-admin agency directory.
//!
//! Agencies live in the platform namespace (`AgencyId::platform()`) of the
//! record store, keyed by their own id. Deleting an agency wipes its data
//! namespace and activity log and leaves a deactivated tombstone, so tokens
//! issued for it keep being refused.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use agencyhub_core::{AgencyId, RecordId};

use crate::activity::ActivityLog;
use crate::store::{self, Collection, RecordStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Starter,
    Professional,
    Enterprise,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Starter => "starter",
            Plan::Professional => "professional",
            Plan::Enterprise => "enterprise",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "starter" => Some(Plan::Starter),
            "professional" => Some(Plan::Professional),
            "enterprise" => Some(Plan::Enterprise),
            _ => None,
        }
    }

    pub fn default_max_users(&self) -> u32 {
        match self {
            Plan::Starter => 5,
            Plan::Professional => 25,
            Plan::Enterprise => 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agency {
    pub id: AgencyId,
    pub name: String,
    pub subdomain: String,
    pub plan: Plan,
    pub max_users: u32,
    pub is_active: bool,
    pub contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set on delete. Deleted agencies are hidden from every read except
    /// [`AgencyDirectory::is_active`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAgency {
    pub name: String,
    pub subdomain: String,
    pub plan: Option<Plan>,
    pub max_users: Option<u32>,
    pub contact_email: Option<String>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgencyUpdate {
    pub name: Option<String>,
    pub plan: Option<Plan>,
    pub max_users: Option<u32>,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgencyUsage {
    pub agency_id: AgencyId,
    pub records: BTreeMap<String, u64>,
    pub users: u64,
    pub max_users: u32,
    pub users_remaining: u64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgencyError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("subdomain '{0}' is already taken")]
    SubdomainTaken(String),

    #[error("agency not found")]
    NotFound,

    #[error("agency has reached its user limit of {0}")]
    UserLimitReached(u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn record_id(id: AgencyId) -> RecordId {
    RecordId::from_uuid(*id.as_uuid())
}

fn validate_name(name: &str) -> Result<String, AgencyError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AgencyError::Validation("agency name is required".to_string()));
    }
    Ok(name.to_string())
}

/// Subdomains: 3-63 chars of `[a-z0-9-]`, not starting or ending with `-`.
pub fn validate_subdomain(raw: &str) -> Result<String, AgencyError> {
    let sub = raw.trim().to_ascii_lowercase();
    let valid_chars = sub
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
    if !(3..=63).contains(&sub.len())
        || !valid_chars
        || sub.starts_with('-')
        || sub.ends_with('-')
    {
        return Err(AgencyError::Validation(format!(
            "invalid subdomain '{raw}': use 3-63 lowercase letters, digits or '-'"
        )));
    }
    Ok(sub)
}

fn validate_max_users(max_users: u32) -> Result<u32, AgencyError> {
    if max_users == 0 {
        return Err(AgencyError::Validation("max_users must be at least 1".to_string()));
    }
    Ok(max_users)
}

#[derive(Clone)]
pub struct AgencyDirectory {
    store: Arc<dyn RecordStore>,
    activity: Arc<dyn ActivityLog>,
}

impl AgencyDirectory {
    pub fn new(store: Arc<dyn RecordStore>, activity: Arc<dyn ActivityLog>) -> Self {
        Self { store, activity }
    }

    pub async fn create(&self, new: NewAgency, now: DateTime<Utc>) -> Result<Agency, AgencyError> {
        let name = validate_name(&new.name)?;
        let subdomain = validate_subdomain(&new.subdomain)?;
        let plan = new.plan.unwrap_or(Plan::Starter);
        let max_users = validate_max_users(new.max_users.unwrap_or(plan.default_max_users()))?;

        if self.list(false).await?.iter().any(|a| a.subdomain == subdomain) {
            return Err(AgencyError::SubdomainTaken(subdomain));
        }

        let agency = Agency {
            id: AgencyId::new(),
            name,
            subdomain,
            plan,
            max_users,
            is_active: true,
            contact_email: new.contact_email.filter(|e| !e.trim().is_empty()),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        store::save_record(
            self.store.as_ref(),
            AgencyId::platform(),
            Collection::AGENCIES,
            record_id(agency.id),
            &agency,
            0,
        )
        .await?;

        info!(agency_id = %agency.id, subdomain = %agency.subdomain, "agency created");
        Ok(agency)
    }

    pub async fn get(&self, id: AgencyId) -> Result<Agency, AgencyError> {
        Ok(self.load(id).await?.0)
    }

    /// Agencies ordered by name.
    pub async fn list(&self, active_only: bool) -> Result<Vec<Agency>, AgencyError> {
        let mut agencies: Vec<Agency> =
            store::list_records(self.store.as_ref(), AgencyId::platform(), Collection::AGENCIES)
                .await?;
        agencies.retain(|a| a.deleted_at.is_none() && (a.is_active || !active_only));
        agencies.sort_by(|a, b| a.name.cmp(&b.name).then(a.subdomain.cmp(&b.subdomain)));
        Ok(agencies)
    }

    pub async fn update(
        &self,
        id: AgencyId,
        changes: AgencyUpdate,
        now: DateTime<Utc>,
    ) -> Result<Agency, AgencyError> {
        let (mut agency, version) = self.load(id).await?;
        if let Some(name) = changes.name {
            agency.name = validate_name(&name)?;
        }
        if let Some(plan) = changes.plan {
            agency.plan = plan;
        }
        if let Some(max_users) = changes.max_users {
            agency.max_users = validate_max_users(max_users)?;
        }
        if let Some(email) = changes.contact_email {
            agency.contact_email = Some(email).filter(|e| !e.trim().is_empty());
        }
        agency.updated_at = now;
        self.save(&agency, version).await?;
        Ok(agency)
    }

    pub async fn set_active(
        &self,
        id: AgencyId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<Agency, AgencyError> {
        let (mut agency, version) = self.load(id).await?;
        if agency.is_active == active {
            return Ok(agency);
        }
        agency.is_active = active;
        agency.updated_at = now;
        self.save(&agency, version).await?;
        info!(agency_id = %id, active, "agency activation changed");
        Ok(agency)
    }

    /// `None` when the agency was never registered; deleted agencies report
    /// `Some(false)`.
    pub async fn is_active(&self, id: AgencyId) -> Result<Option<bool>, AgencyError> {
        Ok(self
            .load_any(id)
            .await?
            .map(|(agency, _)| agency.is_active && agency.deleted_at.is_none()))
    }

    /// Wipe everything stored for the agency and tombstone its record.
    pub async fn delete(&self, id: AgencyId, now: DateTime<Utc>) -> Result<u64, AgencyError> {
        let (mut agency, version) = self.load(id).await?;
        agency.is_active = false;
        agency.deleted_at = Some(now);
        agency.updated_at = now;
        self.save(&agency, version).await?;

        let removed = self.store.clear_agency(id).await?;
        self.activity.clear_agency(id).await?;
        info!(agency_id = %id, removed_records = removed, "agency deleted");
        Ok(removed)
    }

    /// Drop the record of an agency that was created moments ago and never
    /// held data, e.g. when provisioning its first admin failed.
    pub async fn discard(&self, id: AgencyId) -> Result<(), AgencyError> {
        self.store
            .delete(AgencyId::platform(), Collection::AGENCIES, record_id(id))
            .await?;
        info!(agency_id = %id, "agency creation rolled back");
        Ok(())
    }

    pub async fn usage(&self, id: AgencyId) -> Result<AgencyUsage, AgencyError> {
        let (agency, _) = self.load(id).await?;
        let mut records = BTreeMap::new();
        for collection in Collection::AGENCY_DATA {
            let count = self.store.count(id, collection).await?;
            records.insert(collection.as_str().to_string(), count);
        }
        let users = records
            .get(Collection::USERS.as_str())
            .copied()
            .unwrap_or(0);
        Ok(AgencyUsage {
            agency_id: id,
            records,
            users,
            max_users: agency.max_users,
            users_remaining: u64::from(agency.max_users).saturating_sub(users),
        })
    }

    /// A live (not deleted) agency.
    async fn load(&self, id: AgencyId) -> Result<(Agency, u64), AgencyError> {
        self.load_any(id)
            .await?
            .filter(|(agency, _)| agency.deleted_at.is_none())
            .ok_or(AgencyError::NotFound)
    }

    async fn load_any(&self, id: AgencyId) -> Result<Option<(Agency, u64)>, AgencyError> {
        Ok(store::load_record(
            self.store.as_ref(),
            AgencyId::platform(),
            Collection::AGENCIES,
            record_id(id),
        )
        .await?)
    }

    async fn save(&self, agency: &Agency, version: u64) -> Result<(), AgencyError> {
        store::save_record(
            self.store.as_ref(),
            AgencyId::platform(),
            Collection::AGENCIES,
            record_id(agency.id),
            agency,
            version,
        )
        .await?;
        Ok(())
    }
}
