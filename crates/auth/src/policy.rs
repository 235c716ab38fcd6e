//! Built-in role → permission policy.
//!
//! Agencies get a fixed set of roles. Unknown roles grant nothing, so a token
//! carrying a typo can never widen access.

use std::collections::BTreeSet;

use crate::{Permission, Role};

/// Permissions granted by a single role.
pub fn role_permissions(role: &Role) -> Vec<Permission> {
    match role.as_str() {
        "super_admin" | "admin" => vec![Permission::WILDCARD],
        "manager" => vec![
            Permission::CRM_LEADS_READ,
            Permission::CRM_LEADS_WRITE,
            Permission::PROJECTS_READ,
            Permission::PROJECTS_WRITE,
            Permission::HR_READ,
            Permission::INVOICING_READ,
            Permission::ACCOUNTING_READ,
            Permission::USERS_READ,
        ],
        "hr" => vec![Permission::HR_READ, Permission::HR_WRITE, Permission::USERS_READ],
        "finance" => vec![
            Permission::ACCOUNTING_READ,
            Permission::ACCOUNTING_WRITE,
            Permission::ACCOUNTING_POST,
            Permission::INVOICING_READ,
            Permission::INVOICING_WRITE,
            Permission::CRM_LEADS_READ,
        ],
        "sales" => vec![
            Permission::CRM_LEADS_READ,
            Permission::CRM_LEADS_WRITE,
            Permission::INVOICING_READ,
            Permission::PROJECTS_READ,
        ],
        "employee" => vec![Permission::PROJECTS_READ, Permission::HR_READ],
        _ => Vec::new(),
    }
}

/// Union of the permissions of all roles, deduplicated and sorted.
pub fn effective_permissions(roles: &[Role]) -> Vec<Permission> {
    let set: BTreeSet<String> = roles
        .iter()
        .flat_map(role_permissions)
        .map(|p| p.as_str().to_string())
        .collect();
    set.into_iter().map(Permission::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_roles_get_wildcard() {
        assert_eq!(role_permissions(&Role::ADMIN), vec![Permission::WILDCARD]);
        assert_eq!(role_permissions(&Role::SUPER_ADMIN), vec![Permission::WILDCARD]);
    }

    #[test]
    fn raw_sql_is_never_granted_explicitly() {
        for role in [Role::MANAGER, Role::HR, Role::FINANCE, Role::SALES, Role::EMPLOYEE] {
            assert!(!role_permissions(&role).contains(&Permission::DATABASE_QUERY));
        }
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        assert!(role_permissions(&Role::new("admn")).is_empty());
    }

    #[test]
    fn effective_permissions_are_deduplicated() {
        let perms = effective_permissions(&[Role::SALES, Role::FINANCE]);
        let leads_read = perms.iter().filter(|p| **p == Permission::CRM_LEADS_READ).count();
        assert_eq!(leads_read, 1);
        assert!(perms.contains(&Permission::ACCOUNTING_POST));
    }
}
