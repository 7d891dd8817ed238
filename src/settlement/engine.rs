//! Settlement Engine
//!
//! Turns one period's [`SettlementSnapshot`] into the complete set of winning
//! [`Outcome`]s:
//! - every result field that is populated is checked against the wagers of
//!   the categories that settle on it
//! - each match is rated from the snapshot's Rate Table, halved when the
//!   number is in the Half-Price Registry under the wager's category or the
//!   category the match is rated under
//! - reward = component stake × effective rate, rounded half-up to the
//!   currency unit
//!
//! **CRITICAL**: settlement is all-or-nothing. A malformed wager, a wager
//! from another period, a malformed result, a missing rate or an amount
//! overflow fails the whole run; no partial outcome set is ever
//! returned. The engine performs no I/O, so a run can be used as a preview.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{SettlementError, SettlementResult};
use crate::models::{
    validate_number, BetCategory, DrawNumbers, Outcome, OutcomeSet, PeriodId, ResultKind, Wager,
    WagerId,
};
use crate::money;
use crate::settlement::providers::SettlementSnapshot;
use crate::settlement::rates::resolve_rate;
use crate::settlement::rules::{match_wager, winning_number};

// =============================================================================
// Settlement order
// =============================================================================

/// Result fields in settlement order, with the categories settled on each.
const SETTLEMENT_PLAN: [(ResultField, &[BetCategory]); 3] = [
    (ResultField::TwoDigitHigh, &[BetCategory::TwoDigitHigh]),
    (
        ResultField::TwoDigitLow,
        &[BetCategory::TwoDigitLow, BetCategory::RunningLow],
    ),
    (
        ResultField::ThreeDigit,
        &[
            BetCategory::ThreeDigitStraight,
            BetCategory::ThreeDigitAnyOrder,
            BetCategory::ThreeDigitStraightAnyOrder,
            BetCategory::RunningHigh,
        ],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultField {
    TwoDigitHigh,
    TwoDigitLow,
    ThreeDigit,
}

impl ResultField {
    fn is_populated(&self, numbers: &DrawNumbers) -> bool {
        match self {
            ResultField::TwoDigitHigh => numbers.two_digit_high.is_some(),
            ResultField::TwoDigitLow => numbers.two_digit_low.is_some(),
            ResultField::ThreeDigit => numbers.three_digit.is_some(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Per-run settlement statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementStats {
    pub wagers_examined: u64,
    pub winning_wagers: u64,
    pub outcomes: u64,
    pub half_price_hits: u64,
    pub total_reward: Decimal,
    pub outcomes_by_kind: BTreeMap<ResultKind, u64>,
}

impl SettlementStats {
    fn record(&mut self, outcome: &Outcome) -> SettlementResult<()> {
        self.outcomes += 1;
        self.total_reward = money::add(self.total_reward, outcome.reward, "total reward")?;
        if outcome.is_half_price {
            self.half_price_hits += 1;
        }
        *self.outcomes_by_kind.entry(outcome.result_kind).or_default() += 1;
        Ok(())
    }
}

/// Output of one settlement run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRun {
    pub outcomes: OutcomeSet,
    pub stats: SettlementStats,
}

// =============================================================================
// Settlement Engine
// =============================================================================

/// Stateless settlement computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementEngine;

impl SettlementEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compute every outcome for the snapshot's period.
    pub fn settle(&self, snapshot: &SettlementSnapshot) -> SettlementResult<SettlementRun> {
        let period_id = snapshot.period_id();
        let numbers = &snapshot.result.numbers;

        self.validate(snapshot)?;

        let mut outcomes = Vec::new();
        let mut stats = SettlementStats::default();
        let mut winners: BTreeSet<WagerId> = BTreeSet::new();

        for (field, categories) in SETTLEMENT_PLAN.iter() {
            if !field.is_populated(numbers) {
                debug!(period_id, ?field, "Result field empty, skipping");
                continue;
            }

            for category in categories.iter() {
                for wager in snapshot.wagers_in(*category) {
                    stats.wagers_examined += 1;
                    let before = outcomes.len();
                    self.settle_wager(snapshot, wager, &mut outcomes)?;
                    if outcomes.len() > before {
                        winners.insert(wager.id);
                    }
                }
            }
        }

        outcomes.sort_by(|a, b| {
            (a.category, a.wager_id, a.result_kind, a.occurrence).cmp(&(
                b.category,
                b.wager_id,
                b.result_kind,
                b.occurrence,
            ))
        });
        for outcome in &outcomes {
            stats.record(outcome)?;
        }
        stats.winning_wagers = winners.len() as u64;

        info!(
            period_id,
            wagers = stats.wagers_examined,
            outcomes = stats.outcomes,
            half_price_hits = stats.half_price_hits,
            total_reward = %stats.total_reward,
            "Settlement computed"
        );

        Ok(SettlementRun {
            outcomes: OutcomeSet::new(period_id, outcomes),
            stats,
        })
    }

    /// Reject the run before any matching if an input is unusable.
    fn validate(&self, snapshot: &SettlementSnapshot) -> SettlementResult<()> {
        snapshot.result.numbers.validate()?;

        for (category, wagers) in &snapshot.wagers {
            for rate_category in category.rate_categories() {
                snapshot.rates.rate_for(*rate_category)?;
            }
            for wager in wagers {
                if wager.period_id != snapshot.period_id() {
                    return Err(SettlementError::PeriodMismatch {
                        expected: snapshot.period_id(),
                        found: wager.period_id,
                    });
                }
                validate_number(wager.category, &wager.number, category.digits())?;
            }
        }
        Ok(())
    }

    fn settle_wager(
        &self,
        snapshot: &SettlementSnapshot,
        wager: &Wager,
        outcomes: &mut Vec<Outcome>,
    ) -> SettlementResult<()> {
        let numbers = &snapshot.result.numbers;

        for m in match_wager(wager.category, &wager.number, numbers) {
            let stake = component_stake(wager, m.kind);
            if stake <= Decimal::ZERO {
                continue;
            }

            let rate_category = m.kind.rate_category();
            let rate = resolve_rate(
                &snapshot.rates,
                &snapshot.half_price,
                rate_category,
                wager.category,
                &wager.number,
            )?;
            let reward = money::reward(stake, rate.effective)?;
            let winning = winning_number(m.kind, numbers).unwrap_or_default();

            for occurrence in 0..m.count {
                outcomes.push(Outcome {
                    id: outcome_id(snapshot.period_id(), wager.id, m.kind, occurrence),
                    period_id: snapshot.period_id(),
                    agent_id: wager.agent_id,
                    bill_id: wager.bill_id,
                    wager_id: wager.id,
                    category: wager.category,
                    number: wager.number.clone(),
                    stake,
                    base_rate: rate.base,
                    is_half_price: rate.is_half_price,
                    effective_rate: rate.effective,
                    reward,
                    winning_number: winning.to_string(),
                    result_kind: m.kind,
                    occurrence,
                });
            }
        }
        Ok(())
    }
}

/// Stake backing a win of `kind`.
///
/// The any-order half of a straight-plus-any-order wager is backed by the
/// secondary stake; everything else by the primary stake.
fn component_stake(wager: &Wager, kind: ResultKind) -> Decimal {
    match (wager.category, kind) {
        (BetCategory::ThreeDigitStraightAnyOrder, ResultKind::ThreeDigitAnyOrder) => {
            wager.secondary_stake.unwrap_or(Decimal::ZERO)
        }
        _ => wager.stake,
    }
}

/// Stable outcome id, identical across re-runs on the same inputs.
pub fn outcome_id(period_id: PeriodId, wager_id: WagerId, kind: ResultKind, occurrence: u32) -> String {
    let name = format!("{period_id}:{wager_id}:{}:{occurrence}", kind.as_str());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

// =============================================================================
// Tests
// =============================================================================
