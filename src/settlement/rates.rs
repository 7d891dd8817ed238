//! Rate Table and Half-Price Registry snapshots.
//!
//! Both are captured once per settlement run and passed in explicitly, so a
//! concurrent admin edit can never mix old and new rates inside one run.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{SettlementError, SettlementResult};
use crate::models::{BetCategory, HalfPriceEntry, RateEntry};
use crate::money::half_rate;

/// Category -> payout multiplier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateTable {
    rates: BTreeMap<BetCategory, Decimal>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, category: BetCategory, multiplier: Decimal) -> Self {
        self.set(category, multiplier);
        self
    }

    pub fn set(&mut self, category: BetCategory, multiplier: Decimal) {
        self.rates.insert(category, multiplier);
    }

    /// Multiplier for `category`. A missing entry is an error, never zero.
    pub fn rate_for(&self, category: BetCategory) -> SettlementResult<Decimal> {
        self.rates
            .get(&category)
            .copied()
            .ok_or(SettlementError::ConfigMissing(category))
    }

    pub fn contains(&self, category: BetCategory) -> bool {
        self.rates.contains_key(&category)
    }

    pub fn entries(&self) -> impl Iterator<Item = RateEntry> + '_ {
        self.rates.iter().map(|(category, multiplier)| RateEntry {
            category: *category,
            multiplier: *multiplier,
        })
    }
}

impl FromIterator<RateEntry> for RateTable {
    fn from_iter<I: IntoIterator<Item = RateEntry>>(iter: I) -> Self {
        let mut table = RateTable::new();
        for entry in iter {
            table.set(entry.category, entry.multiplier);
        }
        table
    }
}

/// (category, number) pairs paid at half rate for one period
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalfPriceSet {
    entries: BTreeSet<(BetCategory, String)>,
}

impl HalfPriceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: BetCategory, number: impl Into<String>) {
        self.entries.insert((category, number.into()));
    }

    pub fn with(mut self, category: BetCategory, number: impl Into<String>) -> Self {
        self.insert(category, number);
        self
    }

    pub fn contains(&self, category: BetCategory, number: &str) -> bool {
        self.entries.contains(&(category, number.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<HalfPriceEntry> for HalfPriceSet {
    fn from_iter<I: IntoIterator<Item = HalfPriceEntry>>(iter: I) -> Self {
        let mut set = HalfPriceSet::new();
        for entry in iter {
            set.insert(entry.category, entry.number);
        }
        set
    }
}

/// Rate applied to one winning component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveRate {
    pub base: Decimal,
    pub is_half_price: bool,
    pub effective: Decimal,
}

/// Resolve the rate for a win rated under `rate_category` on `number`.
///
/// The win is half price when `number` is flagged under either the rate
/// category or the category the wager was placed in; the two differ for the
/// components of a straight-plus-any-order wager.
pub fn resolve_rate(
    rates: &RateTable,
    half_price: &HalfPriceSet,
    rate_category: BetCategory,
    wager_category: BetCategory,
    number: &str,
) -> SettlementResult<EffectiveRate> {
    let base = rates.rate_for(rate_category)?;
    let is_half_price = half_price.contains(rate_category, number)
        || half_price.contains(wager_category, number);
    let effective = if is_half_price { half_rate(base) } else { base };
    Ok(EffectiveRate {
        base,
        is_half_price,
        effective,
    })
}
