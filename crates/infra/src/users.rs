//! Agency user profiles.
//!
//! Profiles carry the authoritative role list (tokens may be stale) and the
//! two-factor state. TOTP secrets are stored encrypted; backup codes are
//! stored as SHA-256 digests and consumed on use.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use agencyhub_auth::Role;
use agencyhub_core::{AgencyId, RecordId, UserId};

use crate::agency::{AgencyDirectory, AgencyError};
use crate::store::{self, Collection, RecordStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwoFactorState {
    pub enabled: bool,
    /// Encrypted base32 secret of the enabled factor.
    pub secret: Option<String>,
    /// Encrypted secret awaiting confirmation by a first valid code.
    pub pending_secret: Option<String>,
    /// Hex SHA-256 of unused backup codes.
    pub backup_codes: Vec<String>,
    /// TOTP time step of the last accepted code; codes at or before it are
    /// rejected so a code works once.
    #[serde(default)]
    pub last_totp_step: Option<u64>,
}

impl TwoFactorState {
    /// Consume a backup code. Returns whether it matched an unused one.
    pub fn use_backup_code(&mut self, code: &str) -> bool {
        let digest = hash_backup_code(code);
        match self.backup_codes.iter().position(|c| *c == digest) {
            Some(idx) => {
                self.backup_codes.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Record a matched TOTP step. Returns false for a step that is not
    /// newer than the last accepted one.
    pub fn accept_totp_step(&mut self, step: u64) -> bool {
        if self.last_totp_step.is_some_and(|last| step <= last) {
            return false;
        }
        self.last_totp_step = Some(step);
        true
    }
}

pub fn hash_backup_code(code: &str) -> String {
    let normalized = code.trim().to_ascii_uppercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub agency_id: AgencyId,
    pub email: String,
    pub full_name: String,
    pub roles: Vec<Role>,
    pub is_active: bool,
    #[serde(default)]
    pub two_factor: TwoFactorState,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    /// Lets an identity provider keep its own subject id.
    pub id: Option<UserId>,
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl NewUser {
    /// Normalised `(email, full_name)`, or the first field problem.
    pub fn validate(&self) -> Result<(String, String), AgencyError> {
        let email = self.email.trim().to_ascii_lowercase();
        if !email.contains('@') {
            return Err(AgencyError::Validation("a valid email is required".to_string()));
        }
        let full_name = self.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(AgencyError::Validation("full name is required".to_string()));
        }
        Ok((email, full_name))
    }
}

fn record_id(id: UserId) -> RecordId {
    RecordId::from_uuid(*id.as_uuid())
}

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn RecordStore>,
    agencies: AgencyDirectory,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn RecordStore>, agencies: AgencyDirectory) -> Self {
        Self { store, agencies }
    }

    /// Create a profile, enforcing the agency's `max_users`.
    ///
    /// The platform namespace (super admins) has no limit and no agency record.
    pub async fn create(
        &self,
        agency_id: AgencyId,
        new: NewUser,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, AgencyError> {
        let (email, full_name) = new.validate()?;

        let existing = self.list(agency_id).await?;
        if !agency_id.is_platform() {
            let agency = self.agencies.get(agency_id).await?;
            if existing.len() as u64 >= u64::from(agency.max_users) {
                return Err(AgencyError::UserLimitReached(agency.max_users));
            }
        }
        if existing.iter().any(|u| u.email == email) {
            return Err(AgencyError::Validation(format!("user {email} already exists")));
        }

        let profile = UserProfile {
            id: new.id.unwrap_or_default(),
            agency_id,
            email,
            full_name,
            roles: if new.roles.is_empty() {
                vec![Role::EMPLOYEE]
            } else {
                new.roles
            },
            is_active: true,
            two_factor: TwoFactorState::default(),
            created_at: now,
        };
        store::save_record(
            self.store.as_ref(),
            agency_id,
            Collection::USERS,
            record_id(profile.id),
            &profile,
            0,
        )
        .await
        .map_err(|e| match e {
            store::StoreError::Concurrency(_) => {
                AgencyError::Validation(format!("user {} already exists", profile.id))
            }
            other => AgencyError::Store(other),
        })?;

        info!(agency_id = %agency_id, user_id = %profile.id, "user created");
        Ok(profile)
    }

    pub async fn get(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
    ) -> Result<Option<UserProfile>, AgencyError> {
        Ok(self.load(agency_id, user_id).await?.map(|(p, _)| p))
    }

    /// Profile plus its stored version, for read-modify-write updates.
    pub async fn load(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
    ) -> Result<Option<(UserProfile, u64)>, AgencyError> {
        Ok(store::load_record(
            self.store.as_ref(),
            agency_id,
            Collection::USERS,
            record_id(user_id),
        )
        .await?)
    }

    /// Users ordered by email.
    pub async fn list(&self, agency_id: AgencyId) -> Result<Vec<UserProfile>, AgencyError> {
        let mut users: Vec<UserProfile> =
            store::list_records(self.store.as_ref(), agency_id, Collection::USERS).await?;
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    pub async fn set_roles(
        &self,
        agency_id: AgencyId,
        user_id: UserId,
        roles: Vec<Role>,
    ) -> Result<UserProfile, AgencyError> {
        if roles.is_empty() {
            return Err(AgencyError::Validation("at least one role is required".to_string()));
        }
        let (mut profile, version) = self
            .load(agency_id, user_id)
            .await?
            .ok_or(AgencyError::NotFound)?;
        profile.roles = roles;
        self.save(&profile, version).await?;
        Ok(profile)
    }

    /// Persist a profile loaded at `version`.
    pub async fn save(&self, profile: &UserProfile, version: u64) -> Result<u64, AgencyError> {
        Ok(store::save_record(
            self.store.as_ref(),
            profile.agency_id,
            Collection::USERS,
            record_id(profile.id),
            profile,
            version,
        )
        .await?)
    }
}
