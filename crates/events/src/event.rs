use chrono::{DateTime, Utc};

/// A fact emitted by an aggregate after a successful command.
///
/// Every write to a business record produces one or more of these; the
/// dispatcher wraps each in an [`EventEnvelope`](crate::EventEnvelope) and
/// appends it to the agency's activity log.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted `area.record.action` name, e.g. `"hr.employee.transferred"`.
    fn event_type(&self) -> &'static str;

    /// Business time of the change.
    fn occurred_at(&self) -> DateTime<Utc>;
}
