//! Errors raised by business records and value objects.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Failure of a business rule.
///
/// These are deterministic: replaying the same command against the same
/// record state always yields the same error. Storage and transport failures
/// are modelled in `agencyhub-infra`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input that can never be accepted (blank name, negative quantity, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Input that is well-formed but not allowed in the record's current state,
    /// such as converting a lead that was never qualified.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("not found")]
    NotFound,

    /// Stale version or duplicate record.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Shorthand for rejecting a blank required text field.
    pub fn require_text(field: &str, value: &str) -> DomainResult<()> {
        if value.trim().is_empty() {
            Err(Self::validation(format!("{field} is required")))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_rejected_with_the_field_name() {
        let err = DomainError::require_text("client name", "   ").unwrap_err();
        assert_eq!(err, DomainError::validation("client name is required"));
        assert!(DomainError::require_text("client name", "Acme").is_ok());
    }

    #[test]
    fn display_includes_the_message() {
        assert_eq!(
            DomainError::invariant("lead already converted").to_string(),
            "invariant violated: lead already converted"
        );
    }
}
