use agencyhub_core::AgencyId;

use crate::EventEnvelope;

/// Marks messages that belong to exactly one agency.
///
/// Activity log readers use this to refuse entries from other agencies even
/// when a backend returns them by mistake.
pub trait AgencyScoped {
    fn agency_id(&self) -> AgencyId;
}

impl<E> AgencyScoped for EventEnvelope<E> {
    fn agency_id(&self) -> AgencyId {
        self.agency_id()
    }
}
