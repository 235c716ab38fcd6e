use serde::{Deserialize, Serialize};

use agencyhub_core::AgencyId;

/// A principal's membership in an agency.
///
/// This is an authorization boundary object: it states *which agency* the
/// principal is acting within and which roles/permissions are granted there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyMembership {
    pub agency_id: AgencyId,
    pub roles: Vec<crate::Role>,
    pub permissions: Vec<crate::Permission>,
}

impl AgencyMembership {
    /// Membership whose permissions are derived from its roles.
    pub fn from_roles(agency_id: AgencyId, roles: Vec<crate::Role>) -> Self {
        let permissions = crate::policy::effective_permissions(&roles);
        Self {
            agency_id,
            roles,
            permissions,
        }
    }
}
