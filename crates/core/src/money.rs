//! Monetary amounts in minor units.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// ISO-4217 style currency code (three upper-case ASCII letters).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    pub const INR: CurrencyCode = CurrencyCode(*b"INR");
    pub const USD: CurrencyCode = CurrencyCode(*b"USD");
    pub const EUR: CurrencyCode = CurrencyCode(*b"EUR");
    pub const GBP: CurrencyCode = CurrencyCode(*b"GBP");

    /// Parse a currency code; lower-case input is normalised.
    pub fn parse(code: &str) -> Result<Self, DomainError> {
        let bytes = code.trim().as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_alphabetic()) {
            return Err(DomainError::validation(format!(
                "currency code must be three letters, got '{code}'"
            )));
        }
        Ok(Self([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ]))
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII letters are ever stored.
        core::str::from_utf8(&self.0).unwrap_or("???")
    }
}

impl core::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.as_str().to_string()
    }
}

impl ValueObject for CurrencyCode {}

/// An amount of money in the currency's minor unit (paise, cents).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: CurrencyCode,
}

impl Money {
    pub fn new(amount: i64, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: CurrencyCode) -> Self {
        Self { amount: 0, currency }
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn is_negative(&self) -> bool {
        self.amount < 0
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::validation(format!(
                "currency mismatch: {} vs {}",
                self.currency, other.currency
            )));
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| DomainError::invariant("money overflow"))?;
        Ok(Money::new(amount, self.currency))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or_else(|| DomainError::invariant("money overflow"))?;
        Ok(Money::new(amount, self.currency))
    }
}

impl ValueObject for Money {}

/// Divide with half-up rounding (away from zero on ties).
///
/// Shared by tax and discount computations so every module rounds the same way.
pub fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0);
    let q = numerator / denominator;
    let r = numerator % denominator;
    if r.abs() * 2 >= denominator {
        q + numerator.signum()
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_code_is_normalised() {
        assert_eq!(CurrencyCode::parse("inr").unwrap(), CurrencyCode::INR);
        assert!(CurrencyCode::parse("RUPEE").is_err());
        assert!(CurrencyCode::parse("U$D").is_err());
    }

    #[test]
    fn currency_code_serializes_as_string() {
        let json = serde_json::to_string(&Money::new(150, CurrencyCode::USD)).unwrap();
        assert_eq!(json, r#"{"amount":150,"currency":"USD"}"#);
        let bad: Result<Money, _> = serde_json::from_str(r#"{"amount":1,"currency":"XX"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn mixed_currency_arithmetic_is_rejected() {
        let a = Money::new(100, CurrencyCode::INR);
        let b = Money::new(100, CurrencyCode::USD);
        assert!(matches!(a.checked_add(&b), Err(DomainError::Validation(_))));
        assert_eq!(a.checked_add(&a).unwrap().amount, 200);
        assert_eq!(a.checked_sub(&a).unwrap().amount, 0);
    }

    #[test]
    fn half_up_rounding() {
        assert_eq!(div_round_half_up(5, 2), 3);
        assert_eq!(div_round_half_up(4, 3), 1);
        assert_eq!(div_round_half_up(-5, 2), -3);
        assert_eq!(div_round_half_up(1799, 100), 18);
        assert_eq!(div_round_half_up(1749, 100), 17);
    }
}
