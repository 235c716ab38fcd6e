//! `agencyhub-core`: pure domain building blocks shared by every business crate.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AgencyId, RecordId, UserId};
pub use money::{CurrencyCode, Money};
pub use value_object::ValueObject;
