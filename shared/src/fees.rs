//! Rental and late-return fee arithmetic.
//!
//! All amounts are rounded to cents with half-up rounding, so `0.005`
//! becomes `0.01` rather than the banker's `0.00`.

use bigdecimal::{BigDecimal, RoundingMode};
use num_traits::Zero;

pub const FEE_SCALE: i64 = 2;

/// Fraction of the book price charged per day of delay (15%).
pub fn late_fee_rate() -> BigDecimal {
    BigDecimal::new(15.into(), 2)
}

pub fn round_money(amount: &BigDecimal) -> BigDecimal {
    amount.with_scale_round(FEE_SCALE, RoundingMode::HalfUp)
}

pub fn zero_fee() -> BigDecimal {
    BigDecimal::zero().with_scale(FEE_SCALE)
}

/// `daily_rate × rental_days`, rounded to cents.
pub fn total_fee(daily_rate: &BigDecimal, rental_days: u32) -> BigDecimal {
    round_money(&(daily_rate * BigDecimal::from(rental_days)))
}

/// `price × 0.15 × days_late`, rounded to cents. Zero when the book is not late.
pub fn late_fee(price: &BigDecimal, days_late: i64) -> BigDecimal {
    if days_late <= 0 {
        return zero_fee();
    }
    round_money(&(price * late_fee_rate() * BigDecimal::from(days_late)))
}
