//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity; two values with the same attributes are
/// equal. They are immutable: "changing" one means building a new value.
/// `Money` and `CurrencyCode` are the canonical examples in this workspace.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
