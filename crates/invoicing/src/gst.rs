//! Indian Goods and Services Tax computation.
//!
//! Quantities are in milli-units (1 unit = 1000), prices and amounts in
//! minor currency units, discounts in basis points (1% = 100). Every
//! division rounds half-up, once, at line level.

use serde::{Deserialize, Serialize};

use agencyhub_core::money::div_round_half_up;
use agencyhub_core::DomainError;

pub const QUANTITY_SCALE: i64 = 1000;
pub const MAX_DISCOUNT_BPS: u32 = 10_000;

/// Statutory GST slabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum GstRate {
    Zero,
    Five,
    Twelve,
    Eighteen,
    TwentyEight,
}

impl GstRate {
    pub fn percent(&self) -> u8 {
        match self {
            GstRate::Zero => 0,
            GstRate::Five => 5,
            GstRate::Twelve => 12,
            GstRate::Eighteen => 18,
            GstRate::TwentyEight => 28,
        }
    }
}

impl TryFrom<u8> for GstRate {
    type Error = DomainError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(GstRate::Zero),
            5 => Ok(GstRate::Five),
            12 => Ok(GstRate::Twelve),
            18 => Ok(GstRate::Eighteen),
            28 => Ok(GstRate::TwentyEight),
            other => Err(DomainError::validation(format!(
                "GST rate must be one of 0, 5, 12, 18, 28 (got {other})"
            ))),
        }
    }
}

impl From<GstRate> for u8 {
    fn from(value: GstRate) -> Self {
        value.percent()
    }
}

/// Place-of-supply outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyType {
    /// Same state: tax split into CGST and SGST.
    IntraState,
    /// Different states: a single IGST charge.
    InterState,
}

impl SupplyType {
    /// Compare two state codes (case-insensitive, trimmed).
    pub fn between(seller_state: &str, buyer_state: &str) -> Self {
        if seller_state.trim().eq_ignore_ascii_case(buyer_state.trim()) {
            SupplyType::IntraState
        } else {
            SupplyType::InterState
        }
    }
}

/// Per-line amounts, all in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineAmounts {
    pub gross: i64,
    pub discount: i64,
    pub taxable: i64,
    pub cgst: i64,
    pub sgst: i64,
    pub igst: i64,
}

impl LineAmounts {
    pub fn tax(&self) -> i64 {
        self.cgst + self.sgst + self.igst
    }

    pub fn total(&self) -> i64 {
        self.taxable + self.tax()
    }
}

fn to_i64(value: i128) -> Result<i64, DomainError> {
    i64::try_from(value).map_err(|_| DomainError::invariant("amount overflow"))
}

fn mul(a: i128, b: i128) -> Result<i128, DomainError> {
    a.checked_mul(b)
        .ok_or_else(|| DomainError::invariant("amount overflow"))
}

/// Compute one line.
pub fn compute_line(
    quantity_milli: i64,
    unit_price: i64,
    discount_bps: u32,
    rate: GstRate,
    supply: SupplyType,
) -> Result<LineAmounts, DomainError> {
    if quantity_milli <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    if unit_price < 0 {
        return Err(DomainError::validation("unit price cannot be negative"));
    }
    if discount_bps > MAX_DISCOUNT_BPS {
        return Err(DomainError::validation("discount cannot exceed 100%"));
    }

    // Every intermediate must fit in i64 minor units, including the line total.
    let gross = div_round_half_up(
        mul(quantity_milli as i128, unit_price as i128)?,
        QUANTITY_SCALE as i128,
    );
    to_i64(gross)?;
    let discount = div_round_half_up(mul(gross, discount_bps as i128)?, MAX_DISCOUNT_BPS as i128);
    let taxable = gross - discount;
    let tax = div_round_half_up(mul(taxable, rate.percent() as i128)?, 100);
    to_i64(taxable + tax)?;

    let (cgst, sgst, igst) = match supply {
        SupplyType::IntraState => {
            let cgst = tax / 2;
            (cgst, tax - cgst, 0)
        }
        SupplyType::InterState => (0, 0, tax),
    };

    Ok(LineAmounts {
        gross: to_i64(gross)?,
        discount: to_i64(discount)?,
        taxable: to_i64(taxable)?,
        cgst: to_i64(cgst)?,
        sgst: to_i64(sgst)?,
        igst: to_i64(igst)?,
    })
}

/// Invoice-level totals. `subtotal + cgst + sgst + igst == total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    /// Sum of taxable values (after discount).
    pub subtotal: i64,
    pub discount: i64,
    pub cgst: i64,
    pub sgst: i64,
    pub igst: i64,
    pub total: i64,
}

impl InvoiceTotals {
    pub fn add_line(&mut self, line: &LineAmounts) -> Result<(), DomainError> {
        let add = |a: i64, b: i64| {
            a.checked_add(b)
                .ok_or_else(|| DomainError::invariant("invoice total overflow"))
        };
        self.subtotal = add(self.subtotal, line.taxable)?;
        self.discount = add(self.discount, line.discount)?;
        self.cgst = add(self.cgst, line.cgst)?;
        self.sgst = add(self.sgst, line.sgst)?;
        self.igst = add(self.igst, line.igst)?;
        self.total = add(self.total, line.total())?;
        Ok(())
    }

    pub fn tax(&self) -> i64 {
        self.cgst + self.sgst + self.igst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rates_are_restricted_to_slabs() {
        assert_eq!(GstRate::try_from(18).unwrap(), GstRate::Eighteen);
        assert!(GstRate::try_from(7).is_err());
        let json = serde_json::to_string(&GstRate::TwentyEight).unwrap();
        assert_eq!(json, "28");
        assert!(serde_json::from_str::<GstRate>("15").is_err());
    }

    #[test]
    fn intra_state_splits_evenly_with_sgst_taking_the_odd_paisa() {
        // 1 unit at 10.01 @ 5% -> tax 0.50 (50.05 rounds half-up to 50)
        let line = compute_line(1000, 1001, 0, GstRate::Five, SupplyType::IntraState).unwrap();
        assert_eq!(line.taxable, 1001);
        assert_eq!(line.tax(), 50);
        assert_eq!((line.cgst, line.sgst, line.igst), (25, 25, 0));

        // tax 51 -> cgst 25, sgst 26
        let line = compute_line(1000, 1020, 0, GstRate::Five, SupplyType::IntraState).unwrap();
        assert_eq!(line.tax(), 51);
        assert_eq!((line.cgst, line.sgst), (25, 26));
    }

    #[test]
    fn inter_state_charges_igst_only() {
        let line = compute_line(2000, 50_000, 0, GstRate::Eighteen, SupplyType::InterState).unwrap();
        assert_eq!(line.taxable, 100_000);
        assert_eq!((line.cgst, line.sgst, line.igst), (0, 0, 18_000));
        assert_eq!(line.total(), 118_000);
    }

    #[test]
    fn fractional_quantity_and_discount_round_half_up() {
        // 1.5 units x 333 = 499.5 -> 500; 10% discount -> 50; taxable 450
        let line = compute_line(1500, 333, 1000, GstRate::Twelve, SupplyType::IntraState).unwrap();
        assert_eq!(line.gross, 500);
        assert_eq!(line.discount, 50);
        assert_eq!(line.taxable, 450);
        assert_eq!(line.tax(), 54);
    }

    #[test]
    fn bad_inputs_are_rejected() {
        assert!(compute_line(0, 100, 0, GstRate::Zero, SupplyType::IntraState).is_err());
        assert!(compute_line(1000, -1, 0, GstRate::Zero, SupplyType::IntraState).is_err());
        assert!(compute_line(1000, 100, 10_001, GstRate::Zero, SupplyType::IntraState).is_err());
    }

    #[test]
    fn oversized_lines_fail_with_overflow_instead_of_panicking() {
        let overflow = DomainError::invariant("amount overflow");
        let err = compute_line(i64::MAX, i64::MAX, 10_000, GstRate::Eighteen, SupplyType::IntraState)
            .unwrap_err();
        assert_eq!(err, overflow);

        // Taxable value fits but taxable + GST does not.
        let near_max = i64::MAX / 1000 * 1000;
        let err = compute_line(1000, near_max, 0, GstRate::TwentyEight, SupplyType::InterState)
            .unwrap_err();
        assert_eq!(err, overflow);
    }

    #[test]
    fn place_of_supply_ignores_case() {
        assert_eq!(SupplyType::between("KA", " ka"), SupplyType::IntraState);
        assert_eq!(SupplyType::between("KA", "MH"), SupplyType::InterState);
    }

    fn rate_strategy() -> impl Strategy<Value = GstRate> {
        prop::sample::select(vec![
            GstRate::Zero,
            GstRate::Five,
            GstRate::Twelve,
            GstRate::Eighteen,
            GstRate::TwentyEight,
        ])
    }

    proptest! {
        /// Property: totals always reconcile, whatever the mix of lines.
        #[test]
        fn totals_reconcile(
            lines in prop::collection::vec(
                (1i64..100_000, 0i64..10_000_000, 0u32..=10_000, rate_strategy()),
                1..20
            ),
            intra in any::<bool>()
        ) {
            let supply = if intra { SupplyType::IntraState } else { SupplyType::InterState };
            let mut totals = InvoiceTotals::default();
            for (qty, price, disc, rate) in lines {
                let line = compute_line(qty, price, disc, rate, supply).unwrap();
                prop_assert!(line.cgst <= line.sgst);
                prop_assert!(line.sgst - line.cgst <= 1);
                totals.add_line(&line).unwrap();
            }
            prop_assert_eq!(totals.subtotal + totals.cgst + totals.sgst + totals.igst, totals.total);
            if intra {
                prop_assert_eq!(totals.igst, 0);
            } else {
                prop_assert_eq!(totals.cgst + totals.sgst, 0);
            }
        }
    }
}
