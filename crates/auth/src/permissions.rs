use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "crm.leads.read").
/// A special wildcard permission `"*"` is used by the policy layer to indicate
/// "allow all" without hardcoding every permission into admin roles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission::from_static("*");

    pub const CRM_LEADS_READ: Permission = Permission::from_static("crm.leads.read");
    pub const CRM_LEADS_WRITE: Permission = Permission::from_static("crm.leads.write");
    pub const PROJECTS_READ: Permission = Permission::from_static("projects.read");
    pub const PROJECTS_WRITE: Permission = Permission::from_static("projects.write");
    pub const HR_READ: Permission = Permission::from_static("hr.read");
    pub const HR_WRITE: Permission = Permission::from_static("hr.write");
    pub const ACCOUNTING_READ: Permission = Permission::from_static("accounting.read");
    pub const ACCOUNTING_WRITE: Permission = Permission::from_static("accounting.write");
    pub const ACCOUNTING_POST: Permission = Permission::from_static("accounting.post");
    pub const INVOICING_READ: Permission = Permission::from_static("invoicing.read");
    pub const INVOICING_WRITE: Permission = Permission::from_static("invoicing.write");
    pub const DATABASE_QUERY: Permission = Permission::from_static("database.query");
    pub const USERS_READ: Permission = Permission::from_static("users.read");
    pub const USERS_WRITE: Permission = Permission::from_static("users.write");
    pub const AGENCIES_MANAGE: Permission = Permission::from_static("system.agencies.manage");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
