use agencyhub_auth::Role;
use agencyhub_core::{AgencyId, UserId};

/// Agency context for a request.
///
/// This is immutable and must be present for all agency-scoped routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AgencyContext {
    agency_id: AgencyId,
}

impl AgencyContext {
    pub fn new(agency_id: AgencyId) -> Self {
        Self { agency_id }
    }

    pub fn agency_id(&self) -> AgencyId {
        self.agency_id
    }
}

/// Principal context for a request (authenticated identity + roles).
///
/// Roles come from the stored user profile when one exists, otherwise from
/// the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn is_super_admin(&self) -> bool {
        self.roles.iter().any(|r| r.is_super_admin())
    }
}
