//! Business records as command-driven state machines.

use crate::error::{DomainError, DomainResult};

/// Identity and version of a stored business record.
pub trait AggregateRoot {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// Number of events applied since the record was created. Zero means the
    /// record does not exist yet.
    fn version(&self) -> u64;
}

/// A record that decides on commands and evolves from the resulting events.
///
/// `handle` is a pure decision over the current state; `apply` is the only
/// place state changes. Neither may touch storage or the clock.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Must bump `version()` by exactly one.
    fn apply(&mut self, event: &Self::Event);

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Decide, then apply every resulting event in order.
    ///
    /// State is untouched when the command is rejected.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle(command)?;
        for event in &events {
            self.apply(event);
        }
        Ok(events)
    }
}

/// Version a writer expects the stored record to be at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Overwrite unconditionally (seeding, directory upserts).
    Any,
    /// `Exact(0)` means the record must not exist yet.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            return Ok(());
        }
        Err(DomainError::conflict(format!(
            "record is at version {actual}, expected {self:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Counter {
        id: u8,
        version: u64,
        total: u32,
    }

    impl AggregateRoot for Counter {
        type Id = u8;

        fn id(&self) -> &u8 {
            &self.id
        }

        fn version(&self) -> u64 {
            self.version
        }
    }

    impl Aggregate for Counter {
        type Command = u32;
        type Event = u32;
        type Error = DomainError;

        fn apply(&mut self, event: &u32) {
            self.total += event;
            self.version += 1;
        }

        fn handle(&self, command: &u32) -> Result<Vec<u32>, DomainError> {
            if *command == 0 {
                return Err(DomainError::validation("amount must be positive"));
            }
            Ok(vec![*command, *command])
        }
    }

    #[test]
    fn execute_applies_all_events() {
        let mut c = Counter::default();
        let events = c.execute(&3).unwrap();
        assert_eq!(events, vec![3, 3]);
        assert_eq!(c.total, 6);
        assert_eq!(c.version(), 2);
    }

    #[test]
    fn rejected_command_leaves_state_alone() {
        let mut c = Counter::default();
        assert!(c.execute(&0).is_err());
        assert_eq!(c.version(), 0);
    }

    #[test]
    fn version_expectations() {
        assert!(ExpectedVersion::Exact(3).matches(3));
        assert!(!ExpectedVersion::Exact(3).matches(4));
        assert!(ExpectedVersion::Any.matches(42));
        let err = ExpectedVersion::Exact(0).check(1).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
