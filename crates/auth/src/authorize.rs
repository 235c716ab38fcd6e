use std::collections::HashSet;

use thiserror::Error;

use agencyhub_core::{AgencyId, UserId};

use crate::{AgencyMembership, Permission};

/// A fully resolved principal for authorization decisions.
///
/// Construction is decoupled from storage and transport: the API derives the
/// membership from token claims (refreshed from the user directory when a
/// profile exists) and the role policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_agency_id: AgencyId,
    pub membership: AgencyMembership,
}

impl Principal {
    pub fn is_super_admin(&self) -> bool {
        self.membership.roles.iter().any(|r| r.is_super_admin())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("agency mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Command-side authorization contract.
///
/// Implement this on commands that require permissions; the API layer
/// enforces the requirements before dispatching.
pub trait CommandAuthorization {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal within its active agency context.
///
/// Super admins operate across agencies and skip the membership check.
/// Everyone else must act inside the agency of their membership and hold
/// either the wildcard or the exact permission.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.is_super_admin() {
        return Ok(());
    }

    if principal.active_agency_id != principal.membership.agency_id {
        return Err(AuthzError::TenantMismatch);
    }

    let perms: HashSet<&str> = principal
        .membership
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn principal(roles: Vec<Role>) -> Principal {
        let agency = AgencyId::new();
        Principal {
            user_id: UserId::new(),
            active_agency_id: agency,
            membership: AgencyMembership::from_roles(agency, roles),
        }
    }

    #[test]
    fn wildcard_allows_anything() {
        let p = principal(vec![Role::ADMIN]);
        assert!(authorize(&p, &Permission::DATABASE_QUERY).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let p = principal(vec![Role::EMPLOYEE]);
        assert_eq!(
            authorize(&p, &Permission::ACCOUNTING_POST),
            Err(AuthzError::Forbidden("accounting.post".to_string()))
        );
        assert!(authorize(&p, &Permission::PROJECTS_READ).is_ok());
    }

    #[test]
    fn cross_agency_access_is_rejected() {
        let mut p = principal(vec![Role::ADMIN]);
        p.active_agency_id = AgencyId::new();
        assert_eq!(
            authorize(&p, &Permission::HR_READ),
            Err(AuthzError::TenantMismatch)
        );
    }

    #[test]
    fn super_admin_crosses_agencies() {
        let mut p = principal(vec![Role::SUPER_ADMIN]);
        p.active_agency_id = AgencyId::new();
        assert!(authorize(&p, &Permission::AGENCIES_MANAGE).is_ok());
    }
}
