//! Exact money helpers.
//!
//! Stakes, rates and rewards are `Decimal`. Rounding happens once, when a
//! reward or commission is finalised. Arithmetic is checked: an amount past
//! `Decimal::MAX` is an `AmountOverflow` error, never a panic.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{SettlementError, SettlementResult};

/// Smallest currency unit, in decimal places.
pub const CURRENCY_DP: u32 = 2;

/// Round half-up to the smallest currency unit.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Half of a payout multiplier, unrounded.
pub fn half_rate(rate: Decimal) -> Decimal {
    rate / Decimal::TWO
}

/// stake × rate, rounded to the currency unit.
pub fn reward(stake: Decimal, rate: Decimal) -> SettlementResult<Decimal> {
    stake
        .checked_mul(rate)
        .map(round_currency)
        .ok_or(SettlementError::AmountOverflow("reward"))
}

/// `percent` of `amount`, rounded to the currency unit.
pub fn percent_of(amount: Decimal, percent: u8) -> SettlementResult<Decimal> {
    amount
        .checked_mul(Decimal::from(percent))
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .map(round_currency)
        .ok_or(SettlementError::AmountOverflow("commission"))
}

pub fn add(a: Decimal, b: Decimal, what: &'static str) -> SettlementResult<Decimal> {
    a.checked_add(b).ok_or(SettlementError::AmountOverflow(what))
}

pub fn sub(a: Decimal, b: Decimal, what: &'static str) -> SettlementResult<Decimal> {
    a.checked_sub(b).ok_or(SettlementError::AmountOverflow(what))
}

/// Exact sum of `amounts`.
pub fn sum(
    amounts: impl IntoIterator<Item = Decimal>,
    what: &'static str,
) -> SettlementResult<Decimal> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| add(acc, v, what))
}
