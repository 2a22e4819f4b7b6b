#![deny(warnings)]

//! Money generator economics for Stock Clicker.
//!
//! This crate provides:
//! - Cost curves for upgrading and boosting the generator
//! - The [`MoneyGenerator`] itself: click yield, timed boosts and upgrades
//!   paid for through a [`sim_core::Bank`]

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

mod generator;

pub use generator::{MoneyGenerator, TIME_WATCH_INTERVAL_MS};

/// Exponent of the boost cost power law.
pub const BOOST_COST_EXPONENT: f64 = 1.85;

/// Multiplier of the quadratic upgrade cost.
pub const UPGRADE_COST_FACTOR: u64 = 20;

/// Truncates to two decimal places.
///
/// Example:
/// assert_eq!(floor2(Decimal::new(12_349, 3)), Decimal::new(1234, 2)); // 12.349 -> 12.34
pub fn floor2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::ToZero)
}

/// Cost of the next upgrade from `base_cash_per_click`: `floor2(20 * b^2)`.
/// Saturates at `Decimal::MAX` instead of overflowing.
///
/// Example:
/// assert_eq!(upgrade_cost(3), Decimal::from(180));
pub fn upgrade_cost(base_cash_per_click: u64) -> Decimal {
    let base = Decimal::from(base_cash_per_click);
    let cost = base
        .checked_mul(base)
        .and_then(|squared| squared.checked_mul(Decimal::from(UPGRADE_COST_FACTOR)))
        .unwrap_or(Decimal::MAX);
    floor2(cost)
}

/// Cost of boosting for `seconds`: `floor2(seconds * b^1.85)`.
///
/// Example:
/// assert_eq!(boost_cost(0, 50), Decimal::ZERO);
/// assert_eq!(boost_cost(30, 1), Decimal::from(30));
pub fn boost_cost(seconds: u32, base_cash_per_click: u64) -> Decimal {
    let raw = f64::from(seconds) * (base_cash_per_click as f64).powf(BOOST_COST_EXPONENT);
    let cost = Decimal::from_f64(raw).unwrap_or(Decimal::MAX);
    floor2(cost)
}
