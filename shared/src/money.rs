//! Money helpers
//!
//! All amounts are `Decimal` in currency units. Tax is a flat rate applied
//! to the order subtotal.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

/// Flat tax rate applied at checkout (5%)
pub const TAX_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Order totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl Totals {
    /// Compute totals from `(unit price, quantity)` lines
    pub fn from_lines<I>(lines: I) -> Self
    where
        I: IntoIterator<Item = (Decimal, i32)>,
    {
        let subtotal: Decimal = lines
            .into_iter()
            .map(|(price, qty)| price * Decimal::from(qty))
            .sum();
        Self::from_subtotal(subtotal)
    }

    pub fn from_subtotal(subtotal: Decimal) -> Self {
        let tax = subtotal * TAX_RATE;
        Self {
            subtotal,
            tax,
            total: subtotal + tax,
        }
    }
}

/// Format an amount with exactly two decimals (e.g. `262.50`)
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}", rounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate() {
        assert_eq!(TAX_RATE, Decimal::new(5, 2));
    }

    #[test]
    fn test_totals_from_lines() {
        let totals = Totals::from_lines([(Decimal::from(100), 2), (Decimal::from(50), 1)]);
        assert_eq!(totals.subtotal, Decimal::from(250));
        assert_eq!(totals.tax, Decimal::new(125, 1));
        assert_eq!(totals.total, Decimal::new(2625, 1));
        assert_eq!(format_amount(totals.total), "262.50");
    }

    #[test]
    fn test_format_amount_rounds() {
        assert_eq!(format_amount(Decimal::new(12345, 3)), "12.35");
        assert_eq!(format_amount(Decimal::ZERO), "0.00");
        assert_eq!(format_amount(Decimal::from(7)), "7.00");
    }

    #[test]
    fn test_empty_totals() {
        let totals = Totals::from_lines(std::iter::empty());
        assert_eq!(totals, Totals::default());
    }
}
