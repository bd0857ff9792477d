//! Fixed-point price encoding for exact, hashable price-level comparison.
//!
//! `Decimal` comparisons are exact but `Decimal` is not a good `BTreeMap`
//! key in a hot loop — scaling to an `i64` gives cheap ordering and lets
//! `PriceLevel` be `Copy`.

use rust_decimal::Decimal;
use std::cmp::Ordering;

const SCALE: i64 = 100_000_000; // 8 decimal places, matches tick-size granularity used across symbols

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PriceLevel(i64);

impl PriceLevel {
    pub fn from_decimal(price: Decimal) -> Self {
        let scaled = price * Decimal::from(SCALE);
        let truncated = scaled.trunc();
        let value = truncated.mantissa() / 10i128.pow(truncated.scale());
        PriceLevel(value as i64)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::from(self.0) / Decimal::from(SCALE)
    }

    pub fn raw(self) -> i64 {
        self.0
    }
}

impl Ord for PriceLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for PriceLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_trips_through_decimal() {
        let price = dec!(97500.12345678);
        let level = PriceLevel::from_decimal(price);
        assert_eq!(level.to_decimal(), price);
    }

    #[test]
    fn orders_by_raw_value() {
        let a = PriceLevel::from_decimal(dec!(100.0));
        let b = PriceLevel::from_decimal(dec!(100.01));
        assert!(a < b);
    }
}
