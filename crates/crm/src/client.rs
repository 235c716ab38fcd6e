use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agencyhub_core::{AgencyId, DomainError, RecordId};

use crate::lead::{Lead, LeadId, LeadStatus};

/// Client identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub RecordId);

impl ClientId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ClientId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// A customer of the agency. Clients are plain records: they are created
/// once (usually from a won lead) and referenced by projects and invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub agency_id: AgencyId,
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// GSTIN for B2B invoicing.
    pub tax_id: Option<String>,
    /// Two-letter Indian state code, used for place-of-supply decisions.
    pub state_code: Option<String>,
    pub source_lead: Option<LeadId>,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(
        id: ClientId,
        agency_id: AgencyId,
        name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let name = name.into();
        DomainError::require_text("client name", &name)?;
        Ok(Self {
            id,
            agency_id,
            name,
            company: None,
            email: None,
            phone: None,
            tax_id: None,
            state_code: None,
            source_lead: None,
            created_at,
        })
    }
}

/// Build the client record for a lead that has just been converted.
pub fn client_from_lead(lead: &Lead, created_at: DateTime<Utc>) -> Result<Client, DomainError> {
    let (Some(agency_id), Some(client_id)) = (lead.agency_id(), lead.converted_client_id()) else {
        return Err(DomainError::invariant("lead has not been converted"));
    };
    if lead.status() != LeadStatus::Won {
        return Err(DomainError::invariant("lead has not been converted"));
    }

    let details = lead.details();
    let mut client = Client::new(client_id, agency_id, details.name.clone(), created_at)?;
    client.company = details.company.clone();
    client.email = details.email.clone();
    client.phone = details.phone.clone();
    client.source_lead = Some(lead.id_typed());
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lead::{ChangeLeadStatus, ConvertLead, CreateLead, LeadCommand, LeadDetails};
    use agencyhub_core::{Aggregate, CurrencyCode, Money};

    fn step(lead: &mut Lead, cmd: LeadCommand) {
        lead.execute(&cmd).unwrap();
    }

    #[test]
    fn converted_lead_becomes_client() {
        let agency = AgencyId::new();
        let lead_id = LeadId::new(RecordId::new());
        let client_id = ClientId::new(RecordId::new());
        let now = Utc::now();
        let mut lead = Lead::empty(lead_id);

        step(
            &mut lead,
            LeadCommand::Create(CreateLead {
                agency_id: agency,
                lead_id,
                details: LeadDetails {
                    name: "Meera".into(),
                    company: Some("Kite Labs".into()),
                    email: Some("meera@kite.test".into()),
                    phone: Some("+91 98000 00000".into()),
                    source: None,
                    estimated_value: Money::new(10_000_00, CurrencyCode::INR),
                    assigned_to: None,
                    notes: None,
                },
                occurred_at: now,
            }),
        );
        assert!(client_from_lead(&lead, now).is_err());

        step(
            &mut lead,
            LeadCommand::ChangeStatus(ChangeLeadStatus {
                agency_id: agency,
                lead_id,
                status: LeadStatus::Proposal,
                occurred_at: now,
            }),
        );
        step(
            &mut lead,
            LeadCommand::Convert(ConvertLead {
                agency_id: agency,
                lead_id,
                client_id,
                occurred_at: now,
            }),
        );

        let client = client_from_lead(&lead, now).unwrap();
        assert_eq!(client.id, client_id);
        assert_eq!(client.agency_id, agency);
        assert_eq!(client.company.as_deref(), Some("Kite Labs"));
        assert_eq!(client.source_lead, Some(lead_id));
    }

    #[test]
    fn client_needs_a_name() {
        let err = Client::new(ClientId::new(RecordId::new()), AgencyId::new(), " ", Utc::now());
        assert!(matches!(err, Err(DomainError::Validation(_))));
    }
}
