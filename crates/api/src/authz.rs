//! API-side authorization guards.
//!
//! Authorization happens at the route boundary (before dispatch), keeping
//! domain aggregates and infra auth-agnostic.

use agencyhub_auth::{
    AgencyMembership, AuthCache, AuthzError, CommandAuthorization, Permission, Principal, authorize,
};

use crate::app::errors::ApiError;
use crate::context::{AgencyContext, PrincipalContext};

/// Associates the permissions a command needs with the command itself.
pub struct Guarded<C> {
    pub inner: C,
    pub required: Vec<Permission>,
}

impl<C> Guarded<C> {
    pub fn new(inner: C, required: Permission) -> Self {
        Self {
            inner,
            required: vec![required],
        }
    }
}

impl<C> CommandAuthorization for Guarded<C> {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

fn principal(agency: &AgencyContext, principal: &PrincipalContext) -> Principal {
    Principal {
        user_id: principal.user_id(),
        active_agency_id: agency.agency_id(),
        membership: AgencyMembership::from_roles(agency.agency_id(), principal.roles().to_vec()),
    }
}

/// Check every permission a command requires in the current request context.
pub fn authorize_command<C: CommandAuthorization>(
    agency: &AgencyContext,
    principal_ctx: &PrincipalContext,
    command: &C,
) -> Result<(), AuthzError> {
    let principal = principal(agency, principal_ctx);
    for perm in command.required_permissions() {
        authorize(&principal, perm)?;
    }
    Ok(())
}

/// Guard a read (or any non-command) route on a single permission.
pub fn require(
    agency: &AgencyContext,
    principal_ctx: &PrincipalContext,
    permission: Permission,
) -> Result<(), ApiError> {
    authorize(&principal(agency, principal_ctx), &permission).map_err(ApiError::from)
}

/// Whether the principal may read records of `record_type`.
pub fn can_read(agency: &AgencyContext, principal_ctx: &PrincipalContext, record_type: &str) -> bool {
    let permission = match record_type.split('.').next() {
        Some("crm") => Permission::CRM_LEADS_READ,
        Some("projects") => Permission::PROJECTS_READ,
        Some("hr") => Permission::HR_READ,
        Some("accounting") => Permission::ACCOUNTING_READ,
        Some("invoicing") => Permission::INVOICING_READ,
        _ => Permission::USERS_READ,
    };
    authorize(&principal(agency, principal_ctx), &permission).is_ok()
}

/// Super-admin gate for the agency control panel.
///
/// Agency admins hold the wildcard permission inside their own agency, so
/// the role itself is checked. Roles come from the request's auth cache
/// (already filled by the auth middleware).
pub async fn require_super_admin(
    cache: &AuthCache,
    principal_ctx: &PrincipalContext,
) -> Result<(), ApiError> {
    let is_super_admin = cache
        .is_super_admin(principal_ctx.user_id(), || async {
            Ok::<_, ApiError>(principal_ctx.roles().to_vec())
        })
        .await?;
    if is_super_admin {
        Ok(())
    } else {
        Err(ApiError::forbidden("super admin role required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agencyhub_auth::Role;
    use agencyhub_core::{AgencyId, UserId};

    fn ctx(roles: Vec<Role>) -> (AgencyContext, PrincipalContext) {
        (
            AgencyContext::new(AgencyId::new()),
            PrincipalContext::new(UserId::new(), roles),
        )
    }

    #[test]
    fn sales_can_write_leads_but_not_hr() {
        let (agency, principal) = ctx(vec![Role::SALES]);
        let cmd = Guarded::new((), Permission::CRM_LEADS_WRITE);
        assert!(authorize_command(&agency, &principal, &cmd).is_ok());
        assert!(require(&agency, &principal, Permission::HR_WRITE).is_err());
        assert!(can_read(&agency, &principal, "crm.lead"));
        assert!(!can_read(&agency, &principal, "hr.employee"));
    }

    #[tokio::test]
    async fn admins_are_not_super_admins() {
        let cache = AuthCache::new();
        let (_, admin) = ctx(vec![Role::ADMIN]);
        assert!(require_super_admin(&cache, &admin).await.is_err());

        let (_, root) = ctx(vec![Role::SUPER_ADMIN]);
        assert!(require_super_admin(&cache, &root).await.is_ok());
    }
}
