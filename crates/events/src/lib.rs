//! Domain events and the envelope used to record them in the activity log.

pub mod envelope;
pub mod event;
pub mod scope;

pub use envelope::EventEnvelope;
pub use event::Event;
pub use scope::AgencyScoped;
