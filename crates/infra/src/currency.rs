//! Currency conversion and display formatting.
//!
//! Rates are quoted as "units of currency per one unit of the base
//! currency", so converting goes `from -> base -> to`. Amounts stay in minor
//! units (two decimals) and conversions round half away from zero.

use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

use agencyhub_core::{CurrencyCode, Money};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    #[error("no exchange rate for {0}")]
    UnknownCurrency(CurrencyCode),

    #[error("exchange rate must be positive")]
    InvalidRate,

    #[error("the base currency rate is fixed at 1")]
    BaseRateFixed,

    #[error("converted amount overflows")]
    Overflow,
}

#[derive(Debug)]
pub struct CurrencyService {
    base: CurrencyCode,
    rates: RwLock<HashMap<CurrencyCode, Decimal>>,
}

impl CurrencyService {
    pub fn new(base: CurrencyCode) -> Self {
        let mut rates = HashMap::new();
        rates.insert(base, Decimal::ONE);
        Self {
            base,
            rates: RwLock::new(rates),
        }
    }

    pub fn base(&self) -> CurrencyCode {
        self.base
    }

    pub fn set_rate(&self, currency: CurrencyCode, rate: Decimal) -> Result<(), CurrencyError> {
        if currency == self.base {
            return Err(CurrencyError::BaseRateFixed);
        }
        if rate <= Decimal::ZERO {
            return Err(CurrencyError::InvalidRate);
        }
        self.rates
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(currency, rate);
        Ok(())
    }

    pub fn rate(&self, currency: CurrencyCode) -> Result<Decimal, CurrencyError> {
        self.rates
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&currency)
            .copied()
            .ok_or(CurrencyError::UnknownCurrency(currency))
    }

    /// All known rates, sorted by currency code.
    pub fn rates(&self) -> Vec<(CurrencyCode, Decimal)> {
        let mut out: Vec<_> = self
            .rates
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(c, r)| (*c, *r))
            .collect();
        out.sort_by_key(|(c, _)| *c);
        out
    }

    pub fn convert(&self, money: Money, to: CurrencyCode) -> Result<Money, CurrencyError> {
        if money.currency == to {
            return Ok(money);
        }
        let from_rate = self.rate(money.currency)?;
        let to_rate = self.rate(to)?;

        let converted = Decimal::from(money.amount)
            .checked_mul(to_rate)
            .and_then(|v| v.checked_div(from_rate))
            .ok_or(CurrencyError::Overflow)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        let amount = converted.to_i64().ok_or(CurrencyError::Overflow)?;
        Ok(Money::new(amount, to))
    }

    /// `₹12,34,567.89`, `$1,234,567.89`, `-€0.05`, `CHF 10.00`.
    pub fn format(&self, money: Money) -> String {
        format_money(money)
    }
}

fn symbol(currency: CurrencyCode) -> Option<&'static str> {
    match currency.as_str() {
        "INR" => Some("₹"),
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" => Some("¥"),
        _ => None,
    }
}

pub fn format_money(money: Money) -> String {
    let negative = money.amount < 0;
    let abs = money.amount.unsigned_abs();
    let whole = (abs / 100).to_string();
    let fraction = abs % 100;

    let grouped = if money.currency == CurrencyCode::INR {
        group_indian(&whole)
    } else {
        group_western(&whole)
    };

    let sign = if negative { "-" } else { "" };
    match symbol(money.currency) {
        Some(sym) => format!("{sign}{sym}{grouped}.{fraction:02}"),
        None => format!("{sign}{} {grouped}.{fraction:02}", money.currency),
    }
}

fn group_western(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Last three digits, then groups of two (lakh/crore).
fn group_indian(digits: &str) -> String {
    if digits.len() <= 3 {
        return digits.to_string();
    }
    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut out = String::with_capacity(digits.len() + digits.len() / 2);
    for (i, ch) in head.chars().enumerate() {
        if i > 0 && (head.len() - i) % 2 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out.push(',');
    out.push_str(tail);
    out
}
