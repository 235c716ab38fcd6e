use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier used for RBAC.
///
/// Roles are opaque strings; the well-known ones below are the roles the
/// built-in policy (`crate::policy`) knows how to map to permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    /// Cross-agency platform operator.
    pub const SUPER_ADMIN: Role = Role::from_static("super_admin");
    /// Agency owner/administrator.
    pub const ADMIN: Role = Role::from_static("admin");
    pub const MANAGER: Role = Role::from_static("manager");
    pub const HR: Role = Role::from_static("hr");
    pub const FINANCE: Role = Role::from_static("finance");
    pub const SALES: Role = Role::from_static("sales");
    pub const EMPLOYEE: Role = Role::from_static("employee");

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_super_admin(&self) -> bool {
        self.as_str() == "super_admin"
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
