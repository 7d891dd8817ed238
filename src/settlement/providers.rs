//! Collaborator interfaces the engine reads from, and the snapshot built from
//! them.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::SettlementResult;
use crate::models::{BetCategory, DrawResult, PeriodId, Wager};
use crate::settlement::rates::{HalfPriceSet, RateTable};

pub trait PeriodProvider {
    /// The period's result, or `NotFound`.
    fn result_for(&self, period_id: PeriodId) -> SettlementResult<DrawResult>;
}

pub trait WagerProvider {
    fn wagers_for(&self, period_id: PeriodId, category: BetCategory) -> SettlementResult<Vec<Wager>>;

    /// Every running wager of the period, high and low.
    fn running_wagers_for(&self, period_id: PeriodId) -> SettlementResult<Vec<Wager>> {
        let mut wagers = self.wagers_for(period_id, BetCategory::RunningHigh)?;
        wagers.extend(self.wagers_for(period_id, BetCategory::RunningLow)?);
        Ok(wagers)
    }
}

pub trait RateProvider {
    /// `ConfigMissing` when the category has no entry.
    fn rate_for(&self, category: BetCategory) -> SettlementResult<rust_decimal::Decimal>;
}

pub trait HalfPriceProvider {
    fn half_price_set(&self, period_id: PeriodId) -> SettlementResult<HalfPriceSet>;
}

/// Everything one settlement run reads, captured up front.
#[derive(Debug, Clone)]
pub struct SettlementSnapshot {
    pub result: DrawResult,
    pub wagers: BTreeMap<BetCategory, Vec<Wager>>,
    pub rates: RateTable,
    pub half_price: HalfPriceSet,
}

impl SettlementSnapshot {
    /// Read result, half-price set, wagers and the rates they need.
    ///
    /// Fails on the first provider error. Rates are required for every
    /// category that has wagers, whether or not any of them win.
    pub fn capture<P>(period_id: PeriodId, provider: &P) -> SettlementResult<Self>
    where
        P: PeriodProvider + WagerProvider + RateProvider + HalfPriceProvider + ?Sized,
    {
        let result = provider.result_for(period_id)?;
        let half_price = provider.half_price_set(period_id)?;

        let mut wagers: BTreeMap<BetCategory, Vec<Wager>> = BTreeMap::new();
        for category in BetCategory::ALL.iter().filter(|c| !c.is_running()) {
            let list = provider.wagers_for(period_id, *category)?;
            if !list.is_empty() {
                wagers.insert(*category, list);
            }
        }
        for wager in provider.running_wagers_for(period_id)? {
            wagers.entry(wager.category).or_default().push(wager);
        }

        let needed: BTreeSet<BetCategory> = wagers
            .keys()
            .flat_map(|c| c.rate_categories().iter().copied())
            .collect();
        let mut rates = RateTable::new();
        for category in needed {
            rates.set(category, provider.rate_for(category)?);
        }

        Ok(Self {
            result,
            wagers,
            rates,
            half_price,
        })
    }

    pub fn period_id(&self) -> PeriodId {
        self.result.period_id
    }

    pub fn wager_count(&self) -> usize {
        self.wagers.values().map(Vec::len).sum()
    }

    pub fn wagers_in(&self, category: BetCategory) -> &[Wager] {
        self.wagers.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::MemoryProvider;
    use super::*;
    use crate::error::SettlementError;
    use crate::models::{DrawNumbers, RateEntry, ResultStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn wager(id: i64, category: BetCategory, number: &str) -> Wager {
        Wager {
            id,
            period_id: 1,
            agent_id: 1,
            bill_id: 1,
            category,
            number: number.to_string(),
            stake: dec!(10),
            secondary_stake: None,
        }
    }

    fn result() -> DrawResult {
        DrawResult {
            period_id: 1,
            announced_at: Utc::now(),
            numbers: DrawNumbers::default(),
            status: ResultStatus::Announced,
        }
    }

    #[test]
    fn test_capture_requires_result() {
        let provider = MemoryProvider::default();
        let err = SettlementSnapshot::capture(1, &provider).unwrap_err();
        assert!(matches!(err, SettlementError::NotFound { id: 1, .. }));
    }

    #[test]
    fn test_capture_requires_rates_for_categories_in_use() {
        let provider = MemoryProvider {
            results: vec![result()],
            wagers: vec![wager(1, BetCategory::ThreeDigitStraightAnyOrder, "123")],
            rates: vec![RateEntry {
                category: BetCategory::ThreeDigitStraight,
                multiplier: dec!(500),
            }],
            ..Default::default()
        };
        let err = SettlementSnapshot::capture(1, &provider).unwrap_err();
        assert!(matches!(
            err,
            SettlementError::ConfigMissing(BetCategory::ThreeDigitAnyOrder)
        ));
    }

    #[test]
    fn test_capture_groups_running_wagers_by_category() {
        let provider = MemoryProvider {
            results: vec![result()],
            wagers: vec![
                wager(1, BetCategory::RunningHigh, "7"),
                wager(2, BetCategory::RunningLow, "7"),
                wager(3, BetCategory::RunningHigh, "1"),
            ],
            rates: vec![
                RateEntry {
                    category: BetCategory::RunningHigh,
                    multiplier: dec!(3),
                },
                RateEntry {
                    category: BetCategory::RunningLow,
                    multiplier: dec!(4),
                },
            ],
            ..Default::default()
        };
        let snapshot = SettlementSnapshot::capture(1, &provider).unwrap();
        assert_eq!(snapshot.wagers_in(BetCategory::RunningHigh).len(), 2);
        assert_eq!(snapshot.wagers_in(BetCategory::RunningLow).len(), 1);
        assert_eq!(snapshot.wager_count(), 3);
        assert!(!snapshot.rates.contains(BetCategory::TwoDigitHigh));
    }
}
