//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the aggregate snapshot (agency-scoped)
//!   ↓
//! 2. Handle command (pure decision logic, produces events)
//!   ↓
//! 3. Apply events to the snapshot
//!   ↓
//! 4. Persist snapshot (optimistic: expects the loaded version)
//!   ↓
//! 5. Append one activity entry per event
//! ```
//!
//! Aggregates persist as JSON snapshots via [`Snapshot`]; events are not
//! replayed, they are kept as an audit trail.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use agencyhub_accounting::{ChartId, ChartOfAccounts, JournalEntry, JournalEntryId};
use agencyhub_core::{
    AgencyId, Aggregate, AggregateRoot, DomainError, ExpectedVersion, RecordId, UserId,
};
use agencyhub_crm::{Lead, LeadId};
use agencyhub_events::{Event, EventEnvelope};
use agencyhub_hr::{Department, DepartmentId, Employee, EmployeeId};
use agencyhub_invoicing::{Invoice, InvoiceId};
use agencyhub_projects::{Project, ProjectId};

use crate::activity::{ActivityEntry, ActivityLog};
use crate::store::{Collection, RecordStore, StoreError, StoredRecord};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale snapshot version).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    /// A loaded snapshot does not belong to the requesting agency.
    #[error("agency isolation violated: {0}")]
    TenantIsolation(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// Domain-level conflict (duplicate code, already reversed, ...).
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found")]
    NotFound,
    #[error("snapshot (de)serialization failed: {0}")]
    Serialization(String),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for DispatchError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            StoreError::Serialization(msg) => DispatchError::Serialization(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// An aggregate that persists as a JSON snapshot in one collection.
pub trait Snapshot:
    Aggregate<Error = DomainError, Event: Event + Serialize, Command: Send + Sync>
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
{
    const COLLECTION: Collection;
    /// Recorded as `record_type` on activity entries.
    const RECORD_TYPE: &'static str;

    fn empty(id: RecordId) -> Self;
}

impl Snapshot for Lead {
    const COLLECTION: Collection = Collection::LEADS;
    const RECORD_TYPE: &'static str = "crm.lead";

    fn empty(id: RecordId) -> Self {
        Lead::empty(LeadId(id))
    }
}

impl Snapshot for Project {
    const COLLECTION: Collection = Collection::PROJECTS;
    const RECORD_TYPE: &'static str = "projects.project";

    fn empty(id: RecordId) -> Self {
        Project::empty(ProjectId(id))
    }
}

impl Snapshot for Department {
    const COLLECTION: Collection = Collection::DEPARTMENTS;
    const RECORD_TYPE: &'static str = "hr.department";

    fn empty(id: RecordId) -> Self {
        Department::empty(DepartmentId(id))
    }
}

impl Snapshot for Employee {
    const COLLECTION: Collection = Collection::EMPLOYEES;
    const RECORD_TYPE: &'static str = "hr.employee";

    fn empty(id: RecordId) -> Self {
        Employee::empty(EmployeeId(id))
    }
}

impl Snapshot for ChartOfAccounts {
    const COLLECTION: Collection = Collection::CHARTS;
    const RECORD_TYPE: &'static str = "accounting.chart";

    fn empty(id: RecordId) -> Self {
        ChartOfAccounts::empty(ChartId(id))
    }
}

impl Snapshot for JournalEntry {
    const COLLECTION: Collection = Collection::JOURNAL;
    const RECORD_TYPE: &'static str = "accounting.journal_entry";

    fn empty(id: RecordId) -> Self {
        JournalEntry::empty(JournalEntryId(id))
    }
}

impl Snapshot for Invoice {
    const COLLECTION: Collection = Collection::INVOICES;
    const RECORD_TYPE: &'static str = "invoicing.invoice";

    fn empty(id: RecordId) -> Self {
        Invoice::empty(InvoiceId(id))
    }
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone)]
pub struct Dispatched<A: Snapshot> {
    pub aggregate: A,
    pub events: Vec<A::Event>,
}

/// Runs commands against snapshot aggregates and records their activity.
#[derive(Clone)]
pub struct CommandDispatcher {
    store: Arc<dyn RecordStore>,
    activity: Arc<dyn ActivityLog>,
}

impl CommandDispatcher {
    pub fn new(store: Arc<dyn RecordStore>, activity: Arc<dyn ActivityLog>) -> Self {
        Self { store, activity }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn activity(&self) -> &Arc<dyn ActivityLog> {
        &self.activity
    }

    /// Dispatch a command to the aggregate stored under `record_id`.
    ///
    /// A missing record starts from `Snapshot::empty`, so creation commands
    /// go through the same path. Concurrent writers lose with
    /// `DispatchError::Concurrency`; callers may reload and retry.
    pub async fn dispatch<A: Snapshot>(
        &self,
        agency_id: AgencyId,
        record_id: RecordId,
        actor: Option<UserId>,
        command: A::Command,
    ) -> Result<Dispatched<A>, DispatchError> {
        let (mut aggregate, loaded_version) = self.load_or_empty::<A>(agency_id, record_id).await?;

        let events = aggregate.execute(&command)?;
        if events.is_empty() {
            return Ok(Dispatched { aggregate, events });
        }

        let body = serde_json::to_value(&aggregate)
            .map_err(|e| DispatchError::Serialization(e.to_string()))?;
        self.store
            .put(
                agency_id,
                A::COLLECTION,
                record_id,
                aggregate.version(),
                body,
                ExpectedVersion::Exact(loaded_version),
            )
            .await?;

        let entries = events
            .iter()
            .enumerate()
            .map(|(idx, event)| {
                let payload = serde_json::to_value(event)
                    .map_err(|e| DispatchError::Serialization(e.to_string()))?;
                Ok(EventEnvelope::new(
                    Uuid::now_v7(),
                    agency_id,
                    record_id,
                    A::RECORD_TYPE,
                    loaded_version + idx as u64 + 1,
                    event.event_type(),
                    event.occurred_at(),
                    actor,
                    payload,
                ))
            })
            .collect::<Result<Vec<ActivityEntry>, DispatchError>>()?;

        // The snapshot is already committed; a lost audit entry must not
        // turn a successful command into a failed response.
        if let Err(err) = self.activity.append(&entries).await {
            error!(
                agency_id = %agency_id,
                record_id = %record_id,
                error = %err,
                "failed to append activity entries"
            );
        }

        debug!(
            agency_id = %agency_id,
            record_type = A::RECORD_TYPE,
            record_id = %record_id,
            version = aggregate.version(),
            events = events.len(),
            "command dispatched"
        );
        Ok(Dispatched { aggregate, events })
    }

    /// Load an existing aggregate; `NotFound` when nothing is stored.
    pub async fn load<A: Snapshot>(
        &self,
        agency_id: AgencyId,
        record_id: RecordId,
    ) -> Result<A, DispatchError> {
        let (aggregate, version) = self.load_or_empty::<A>(agency_id, record_id).await?;
        if version == 0 {
            return Err(DispatchError::NotFound);
        }
        Ok(aggregate)
    }

    /// Every aggregate of type `A` in the agency.
    pub async fn list<A: Snapshot>(&self, agency_id: AgencyId) -> Result<Vec<A>, DispatchError> {
        let records = self.store.list(agency_id, A::COLLECTION).await?;
        records
            .iter()
            .map(|record| decode_snapshot::<A>(agency_id, record))
            .collect()
    }

    async fn load_or_empty<A: Snapshot>(
        &self,
        agency_id: AgencyId,
        record_id: RecordId,
    ) -> Result<(A, u64), DispatchError> {
        match self.store.get(agency_id, A::COLLECTION, record_id).await? {
            Some(record) => {
                let aggregate = decode_snapshot::<A>(agency_id, &record)?;
                Ok((aggregate, record.version))
            }
            None => Ok((A::empty(record_id), 0)),
        }
    }
}

fn decode_snapshot<A: Snapshot>(
    agency_id: AgencyId,
    record: &StoredRecord,
) -> Result<A, DispatchError> {
    // Enforce agency isolation even if a buggy backend returns foreign rows.
    if record.agency_id != agency_id {
        return Err(DispatchError::TenantIsolation(format!(
            "{} {} belongs to another agency",
            record.collection, record.record_id
        )));
    }
    let aggregate: A = record.decode()?;
    if aggregate.version() != record.version {
        return Err(DispatchError::Serialization(format!(
            "{} {}: snapshot version {} does not match record version {}",
            record.collection,
            record.record_id,
            aggregate.version(),
            record.version
        )));
    }
    Ok(aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::InMemoryActivityLog;
    use crate::store::InMemoryRecordStore;
    use agencyhub_core::{CurrencyCode, Money};
    use agencyhub_crm::{
        ChangeLeadStatus, CreateLead, LeadCommand, LeadDetails, LeadStatus,
    };
    use chrono::Utc;

    fn dispatcher() -> (CommandDispatcher, Arc<InMemoryActivityLog>) {
        let activity = Arc::new(InMemoryActivityLog::new());
        let dispatcher = CommandDispatcher::new(
            Arc::new(InMemoryRecordStore::new()),
            activity.clone(),
        );
        (dispatcher, activity)
    }

    fn details() -> LeadDetails {
        LeadDetails {
            name: "Asha Rao".to_string(),
            company: Some("Rao Textiles".to_string()),
            email: Some("asha@example.com".to_string()),
            phone: None,
            source: Some("referral".to_string()),
            estimated_value: Money::new(500_000, CurrencyCode::INR),
            assigned_to: None,
            notes: None,
        }
    }

    fn create(agency: AgencyId, id: RecordId) -> LeadCommand {
        LeadCommand::Create(CreateLead {
            agency_id: agency,
            lead_id: LeadId(id),
            details: details(),
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn dispatch_persists_snapshot_and_activity() {
        let (dispatcher, activity) = dispatcher();
        let agency = AgencyId::new();
        let id = RecordId::new();
        let actor = UserId::new();

        let created = dispatcher
            .dispatch::<Lead>(agency, id, Some(actor), create(agency, id))
            .await
            .unwrap();
        assert_eq!(created.aggregate.version(), 1);

        dispatcher
            .dispatch::<Lead>(
                agency,
                id,
                Some(actor),
                LeadCommand::ChangeStatus(ChangeLeadStatus {
                    agency_id: agency,
                    lead_id: LeadId(id),
                    status: LeadStatus::Contacted,
                    occurred_at: Utc::now(),
                }),
            )
            .await
            .unwrap();

        let loaded: Lead = dispatcher.load(agency, id).await.unwrap();
        assert_eq!(loaded.status(), LeadStatus::Contacted);
        assert_eq!(loaded.version(), 2);

        let entries = activity.list_for_record(agency, id).await.unwrap();
        let seqs: Vec<u64> = entries.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(entries[0].event_type(), "crm.lead.created");
        assert_eq!(entries[1].actor(), Some(actor));
    }

    #[tokio::test]
    async fn other_agencies_cannot_see_the_record() {
        let (dispatcher, _) = dispatcher();
        let agency = AgencyId::new();
        let id = RecordId::new();
        dispatcher
            .dispatch::<Lead>(agency, id, None, create(agency, id))
            .await
            .unwrap();

        let other = AgencyId::new();
        let res = dispatcher.load::<Lead>(other, id).await;
        assert!(matches!(res, Err(DispatchError::NotFound)));
        assert!(dispatcher.list::<Lead>(other).await.unwrap().is_empty());
        assert_eq!(dispatcher.list::<Lead>(agency).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn domain_errors_are_mapped_and_nothing_is_written() {
        let (dispatcher, activity) = dispatcher();
        let agency = AgencyId::new();
        let id = RecordId::new();
        dispatcher
            .dispatch::<Lead>(agency, id, None, create(agency, id))
            .await
            .unwrap();

        let err = dispatcher
            .dispatch::<Lead>(agency, id, None, create(agency, id))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Conflict(_) | DispatchError::InvariantViolation(_)
        ));
        assert_eq!(activity.recent(agency, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let (dispatcher, _) = dispatcher();
        let res = dispatcher.load::<Lead>(AgencyId::new(), RecordId::new()).await;
        assert!(matches!(res, Err(DispatchError::NotFound)));
    }
}
