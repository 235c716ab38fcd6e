use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use agencyhub_core::{AgencyId, RecordId, UserId};

/// Envelope for an event, containing agency + record metadata.
///
/// This is the unit appended to the activity log.
///
/// Notes:
/// - **Multi-tenancy** is enforced here via `agency_id`.
/// - `sequence_number` is the record version the event produced, so the
///   envelopes of one record are strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    agency_id: AgencyId,

    record_id: RecordId,
    record_type: String,
    sequence_number: u64,

    event_type: String,
    occurred_at: DateTime<Utc>,
    actor: Option<UserId>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_id: Uuid,
        agency_id: AgencyId,
        record_id: RecordId,
        record_type: impl Into<String>,
        sequence_number: u64,
        event_type: impl Into<String>,
        occurred_at: DateTime<Utc>,
        actor: Option<UserId>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            agency_id,
            record_id,
            record_type: record_type.into(),
            sequence_number,
            event_type: event_type.into(),
            occurred_at,
            actor,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn agency_id(&self) -> AgencyId {
        self.agency_id
    }

    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn actor(&self) -> Option<UserId> {
        self.actor
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Re-wrap the payload, keeping all metadata.
    pub fn map_payload<F, T>(self, f: F) -> EventEnvelope<T>
    where
        F: FnOnce(E) -> T,
    {
        EventEnvelope {
            event_id: self.event_id,
            agency_id: self.agency_id,
            record_id: self.record_id,
            record_type: self.record_type,
            sequence_number: self.sequence_number,
            event_type: self.event_type,
            occurred_at: self.occurred_at,
            actor: self.actor,
            payload: f(self.payload),
        }
    }
}
