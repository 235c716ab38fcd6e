use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use agencyhub_core::{
    AgencyId, Aggregate, AggregateRoot, CurrencyCode, DomainError, Money, RecordId, UserId,
};
use agencyhub_events::Event;

use crate::client::ClientId;

/// Lead identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub RecordId);

impl LeadId {
    pub fn new(id: RecordId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LeadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Position of a lead in the sales pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Proposal,
    Negotiation,
    Won,
    Lost,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 7] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Qualified,
        LeadStatus::Proposal,
        LeadStatus::Negotiation,
        LeadStatus::Won,
        LeadStatus::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Proposal => "proposal",
            LeadStatus::Negotiation => "negotiation",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|st| st.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LeadStatus::Won | LeadStatus::Lost)
    }

    /// Whether a lead can be converted into a client from this status.
    pub fn is_convertible(&self) -> bool {
        matches!(
            self,
            LeadStatus::Qualified | LeadStatus::Proposal | LeadStatus::Negotiation
        )
    }

    /// Manual status changes: any open stage may move to any other open stage
    /// or to `lost`. `won` is only reachable through conversion.
    pub fn can_transition_to(&self, next: LeadStatus) -> bool {
        !self.is_terminal() && next != LeadStatus::Won && next != *self
    }
}

/// Editable lead attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadDetails {
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub estimated_value: Money,
    pub assigned_to: Option<UserId>,
    pub notes: Option<String>,
}

impl LeadDetails {
    fn validate(&self) -> Result<(), DomainError> {
        DomainError::require_text("lead name", &self.name)?;
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(DomainError::validation("lead email is invalid"));
            }
        }
        if self.estimated_value.is_negative() {
            return Err(DomainError::validation("estimated value cannot be negative"));
        }
        Ok(())
    }
}

/// Aggregate root: Lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    id: LeadId,
    agency_id: Option<AgencyId>,
    status: LeadStatus,
    details: LeadDetails,
    next_follow_up: Option<DateTime<Utc>>,
    converted_client_id: Option<ClientId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Lead {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: LeadId) -> Self {
        Self {
            id,
            agency_id: None,
            status: LeadStatus::New,
            details: LeadDetails {
                name: String::new(),
                company: None,
                email: None,
                phone: None,
                source: None,
                estimated_value: Money::zero(CurrencyCode::INR),
                assigned_to: None,
                notes: None,
            },
            next_follow_up: None,
            converted_client_id: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LeadId {
        self.id
    }

    pub fn agency_id(&self) -> Option<AgencyId> {
        self.agency_id
    }

    pub fn status(&self) -> LeadStatus {
        self.status
    }

    pub fn details(&self) -> &LeadDetails {
        &self.details
    }

    pub fn next_follow_up(&self) -> Option<DateTime<Utc>> {
        self.next_follow_up
    }

    pub fn converted_client_id(&self) -> Option<ClientId> {
        self.converted_client_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Lead {
    type Id = LeadId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLead {
    pub agency_id: AgencyId,
    pub lead_id: LeadId,
    pub details: LeadDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLeadDetails {
    pub agency_id: AgencyId,
    pub lead_id: LeadId,
    pub details: LeadDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLeadStatus {
    pub agency_id: AgencyId,
    pub lead_id: LeadId,
    pub status: LeadStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleFollowUp {
    pub agency_id: AgencyId,
    pub lead_id: LeadId,
    pub at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertLead {
    pub agency_id: AgencyId,
    pub lead_id: LeadId,
    pub client_id: ClientId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadCommand {
    Create(CreateLead),
    UpdateDetails(UpdateLeadDetails),
    ChangeStatus(ChangeLeadStatus),
    ScheduleFollowUp(ScheduleFollowUp),
    Convert(ConvertLead),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadCreated {
    pub agency_id: AgencyId,
    pub lead_id: LeadId,
    pub details: LeadDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadDetailsUpdated {
    pub agency_id: AgencyId,
    pub lead_id: LeadId,
    pub details: LeadDetails,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadStatusChanged {
    pub agency_id: AgencyId,
    pub lead_id: LeadId,
    pub from: LeadStatus,
    pub to: LeadStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpScheduled {
    pub agency_id: AgencyId,
    pub lead_id: LeadId,
    pub at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadConverted {
    pub agency_id: AgencyId,
    pub lead_id: LeadId,
    pub client_id: ClientId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadEvent {
    Created(LeadCreated),
    DetailsUpdated(LeadDetailsUpdated),
    StatusChanged(LeadStatusChanged),
    FollowUpScheduled(FollowUpScheduled),
    Converted(LeadConverted),
}

impl Event for LeadEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LeadEvent::Created(_) => "crm.lead.created",
            LeadEvent::DetailsUpdated(_) => "crm.lead.details_updated",
            LeadEvent::StatusChanged(_) => "crm.lead.status_changed",
            LeadEvent::FollowUpScheduled(_) => "crm.lead.follow_up_scheduled",
            LeadEvent::Converted(_) => "crm.lead.converted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LeadEvent::Created(e) => e.occurred_at,
            LeadEvent::DetailsUpdated(e) => e.occurred_at,
            LeadEvent::StatusChanged(e) => e.occurred_at,
            LeadEvent::FollowUpScheduled(e) => e.occurred_at,
            LeadEvent::Converted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Lead {
    type Command = LeadCommand;
    type Event = LeadEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LeadEvent::Created(e) => {
                self.id = e.lead_id;
                self.agency_id = Some(e.agency_id);
                self.details = e.details.clone();
                self.status = LeadStatus::New;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            LeadEvent::DetailsUpdated(e) => {
                self.details = e.details.clone();
            }
            LeadEvent::StatusChanged(e) => {
                self.status = e.to;
            }
            LeadEvent::FollowUpScheduled(e) => {
                self.next_follow_up = Some(e.at);
            }
            LeadEvent::Converted(e) => {
                self.status = LeadStatus::Won;
                self.converted_client_id = Some(e.client_id);
                self.next_follow_up = None;
            }
        }

        self.updated_at = Some(event.occurred_at());
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LeadCommand::Create(cmd) => self.handle_create(cmd),
            LeadCommand::UpdateDetails(cmd) => self.handle_update(cmd),
            LeadCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            LeadCommand::ScheduleFollowUp(cmd) => self.handle_follow_up(cmd),
            LeadCommand::Convert(cmd) => self.handle_convert(cmd),
        }
    }
}

impl Lead {
    fn ensure_existing(&self, agency_id: AgencyId, lead_id: LeadId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.agency_id != Some(agency_id) {
            return Err(DomainError::invariant("agency mismatch"));
        }
        if self.id != lead_id {
            return Err(DomainError::invariant("lead_id mismatch"));
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "lead is {} and can no longer change",
                self.status.as_str()
            )));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateLead) -> Result<Vec<LeadEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("lead already exists"));
        }
        cmd.details.validate()?;

        Ok(vec![LeadEvent::Created(LeadCreated {
            agency_id: cmd.agency_id,
            lead_id: cmd.lead_id,
            details: cmd.details.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateLeadDetails) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.lead_id)?;
        self.ensure_open()?;
        cmd.details.validate()?;

        if cmd.details == self.details {
            return Ok(vec![]);
        }

        Ok(vec![LeadEvent::DetailsUpdated(LeadDetailsUpdated {
            agency_id: cmd.agency_id,
            lead_id: cmd.lead_id,
            details: cmd.details.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(&self, cmd: &ChangeLeadStatus) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.lead_id)?;
        self.ensure_open()?;

        if cmd.status == LeadStatus::Won {
            return Err(DomainError::invariant(
                "leads are won by converting them into clients",
            ));
        }
        if !self.status.can_transition_to(cmd.status) {
            return Err(DomainError::invariant(format!(
                "cannot move lead from {} to {}",
                self.status.as_str(),
                cmd.status.as_str()
            )));
        }

        Ok(vec![LeadEvent::StatusChanged(LeadStatusChanged {
            agency_id: cmd.agency_id,
            lead_id: cmd.lead_id,
            from: self.status,
            to: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_follow_up(&self, cmd: &ScheduleFollowUp) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.lead_id)?;
        self.ensure_open()?;

        if cmd.at <= cmd.occurred_at {
            return Err(DomainError::validation("follow-up must be in the future"));
        }

        Ok(vec![LeadEvent::FollowUpScheduled(FollowUpScheduled {
            agency_id: cmd.agency_id,
            lead_id: cmd.lead_id,
            at: cmd.at,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_convert(&self, cmd: &ConvertLead) -> Result<Vec<LeadEvent>, DomainError> {
        self.ensure_existing(cmd.agency_id, cmd.lead_id)?;
        if self.converted_client_id.is_some() {
            return Err(DomainError::conflict("lead already converted"));
        }
        self.ensure_open()?;

        if !self.status.is_convertible() {
            return Err(DomainError::invariant(format!(
                "only qualified leads can be converted (status: {})",
                self.status.as_str()
            )));
        }

        Ok(vec![LeadEvent::Converted(LeadConverted {
            agency_id: cmd.agency_id,
            lead_id: cmd.lead_id,
            client_id: cmd.client_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn details(name: &str) -> LeadDetails {
        LeadDetails {
            name: name.to_string(),
            company: Some("Acme".to_string()),
            email: Some("buyer@acme.test".to_string()),
            phone: None,
            source: Some("website".to_string()),
            estimated_value: Money::new(5_000_00, CurrencyCode::INR),
            assigned_to: None,
            notes: None,
        }
    }

    fn run(lead: &mut Lead, cmd: LeadCommand) -> Result<Vec<LeadEvent>, DomainError> {
        lead.execute(&cmd)
    }

    fn created_lead(agency: AgencyId) -> Lead {
        let id = LeadId::new(RecordId::new());
        let mut lead = Lead::empty(id);
        run(
            &mut lead,
            LeadCommand::Create(CreateLead {
                agency_id: agency,
                lead_id: id,
                details: details("Priya"),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        lead
    }

    fn change(lead: &mut Lead, agency: AgencyId, status: LeadStatus) -> Result<Vec<LeadEvent>, DomainError> {
        let id = lead.id_typed();
        run(
            lead,
            LeadCommand::ChangeStatus(ChangeLeadStatus {
                agency_id: agency,
                lead_id: id,
                status,
                occurred_at: Utc::now(),
            }),
        )
    }

    fn convert(lead: &mut Lead, agency: AgencyId) -> Result<Vec<LeadEvent>, DomainError> {
        let id = lead.id_typed();
        run(
            lead,
            LeadCommand::Convert(ConvertLead {
                agency_id: agency,
                lead_id: id,
                client_id: ClientId::new(RecordId::new()),
                occurred_at: Utc::now(),
            }),
        )
    }

    #[test]
    fn create_requires_name_and_sane_email() {
        let id = LeadId::new(RecordId::new());
        let lead = Lead::empty(id);
        let mut bad = details("  ");
        let err = lead
            .handle(&LeadCommand::Create(CreateLead {
                agency_id: AgencyId::new(),
                lead_id: id,
                details: bad.clone(),
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        bad.name = "Ravi".to_string();
        bad.email = Some("no-at-sign".to_string());
        assert!(lead
            .handle(&LeadCommand::Create(CreateLead {
                agency_id: AgencyId::new(),
                lead_id: id,
                details: bad,
                occurred_at: Utc::now(),
            }))
            .is_err());
    }

    #[test]
    fn qualified_lead_converts_to_won() {
        let agency = AgencyId::new();
        let mut lead = created_lead(agency);
        change(&mut lead, agency, LeadStatus::Contacted).unwrap();
        change(&mut lead, agency, LeadStatus::Qualified).unwrap();
        convert(&mut lead, agency).unwrap();

        assert_eq!(lead.status(), LeadStatus::Won);
        assert!(lead.converted_client_id().is_some());
        assert_eq!(lead.version(), 4);
    }

    #[test]
    fn new_lead_cannot_be_converted() {
        let agency = AgencyId::new();
        let mut lead = created_lead(agency);
        let err = convert(&mut lead, agency).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn won_cannot_be_set_directly() {
        let agency = AgencyId::new();
        let mut lead = created_lead(agency);
        assert!(change(&mut lead, agency, LeadStatus::Won).is_err());
    }

    #[test]
    fn lost_lead_is_frozen() {
        let agency = AgencyId::new();
        let mut lead = created_lead(agency);
        change(&mut lead, agency, LeadStatus::Lost).unwrap();
        assert!(change(&mut lead, agency, LeadStatus::Contacted).is_err());
        let id = lead.id_typed();
        assert!(run(
            &mut lead,
            LeadCommand::UpdateDetails(UpdateLeadDetails {
                agency_id: agency,
                lead_id: id,
                details: details("Renamed"),
                occurred_at: Utc::now(),
            })
        )
        .is_err());
    }

    #[test]
    fn other_agency_cannot_touch_lead() {
        let agency = AgencyId::new();
        let mut lead = created_lead(agency);
        let err = change(&mut lead, AgencyId::new(), LeadStatus::Contacted).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn follow_up_must_be_in_future() {
        let agency = AgencyId::new();
        let mut lead = created_lead(agency);
        let id = lead.id_typed();
        let now = Utc::now();
        let past = run(
            &mut lead,
            LeadCommand::ScheduleFollowUp(ScheduleFollowUp {
                agency_id: agency,
                lead_id: id,
                at: now - Duration::hours(1),
                occurred_at: now,
            }),
        );
        assert!(past.is_err());

        run(
            &mut lead,
            LeadCommand::ScheduleFollowUp(ScheduleFollowUp {
                agency_id: agency,
                lead_id: id,
                at: now + Duration::days(2),
                occurred_at: now,
            }),
        )
        .unwrap();
        assert_eq!(lead.next_follow_up(), Some(now + Duration::days(2)));
    }

    #[test]
    fn unchanged_details_emit_nothing() {
        let agency = AgencyId::new();
        let mut lead = created_lead(agency);
        let id = lead.id_typed();
        let events = run(
            &mut lead,
            LeadCommand::UpdateDetails(UpdateLeadDetails {
                agency_id: agency,
                lead_id: id,
                details: details("Priya"),
                occurred_at: Utc::now(),
            }),
        )
        .unwrap();
        assert!(events.is_empty());
    }

    fn status_strategy() -> impl Strategy<Value = LeadStatus> {
        prop::sample::select(LeadStatus::ALL.to_vec())
    }

    proptest! {
        /// Property: whatever sequence of manual status changes is attempted,
        /// a lead never reaches `won` without conversion and never leaves a
        /// terminal status.
        #[test]
        fn manual_changes_never_win_or_reopen(
            steps in prop::collection::vec(status_strategy(), 1..20)
        ) {
            let agency = AgencyId::new();
            let mut lead = created_lead(agency);
            for next in steps {
                let before = lead.status();
                let result = change(&mut lead, agency, next);
                if before.is_terminal() {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(lead.status(), before);
                }
                prop_assert_ne!(lead.status(), LeadStatus::Won);
            }
        }
    }
}
