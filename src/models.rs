//! Domain types for periods, wagers, draw results and settled outcomes.
//!
//! Numbers are kept as digit strings ("07", "345") because leading zeros are
//! significant. All money values are `Decimal`.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SettlementError;

pub type PeriodId = i64;
pub type AgentId = i64;
pub type BillId = i64;
pub type WagerId = i64;

/// Bet categories
///
/// Declaration order is the canonical settlement order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetCategory {
    TwoDigitHigh,
    TwoDigitLow,
    ThreeDigitStraight,
    ThreeDigitAnyOrder,
    ThreeDigitStraightAnyOrder,
    RunningHigh,
    RunningLow,
}

impl BetCategory {
    pub const ALL: [BetCategory; 7] = [
        BetCategory::TwoDigitHigh,
        BetCategory::TwoDigitLow,
        BetCategory::ThreeDigitStraight,
        BetCategory::ThreeDigitAnyOrder,
        BetCategory::ThreeDigitStraightAnyOrder,
        BetCategory::RunningHigh,
        BetCategory::RunningLow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BetCategory::TwoDigitHigh => "two_digit_high",
            BetCategory::TwoDigitLow => "two_digit_low",
            BetCategory::ThreeDigitStraight => "three_digit_straight",
            BetCategory::ThreeDigitAnyOrder => "three_digit_any_order",
            BetCategory::ThreeDigitStraightAnyOrder => "three_digit_straight_any_order",
            BetCategory::RunningHigh => "running_high",
            BetCategory::RunningLow => "running_low",
        }
    }

    /// Number of digits a wager in this category must carry.
    pub fn digits(&self) -> usize {
        match self {
            BetCategory::TwoDigitHigh | BetCategory::TwoDigitLow => 2,
            BetCategory::ThreeDigitStraight
            | BetCategory::ThreeDigitAnyOrder
            | BetCategory::ThreeDigitStraightAnyOrder => 3,
            BetCategory::RunningHigh | BetCategory::RunningLow => 1,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, BetCategory::RunningHigh | BetCategory::RunningLow)
    }

    /// Categories whose Rate Table entries a wager of this category draws on.
    ///
    /// Straight-plus-any-order pays its two components at the straight and
    /// any-order rates respectively.
    pub fn rate_categories(&self) -> &'static [BetCategory] {
        match self {
            BetCategory::ThreeDigitStraightAnyOrder => &[
                BetCategory::ThreeDigitStraight,
                BetCategory::ThreeDigitAnyOrder,
            ],
            BetCategory::TwoDigitHigh => &[BetCategory::TwoDigitHigh],
            BetCategory::TwoDigitLow => &[BetCategory::TwoDigitLow],
            BetCategory::ThreeDigitStraight => &[BetCategory::ThreeDigitStraight],
            BetCategory::ThreeDigitAnyOrder => &[BetCategory::ThreeDigitAnyOrder],
            BetCategory::RunningHigh => &[BetCategory::RunningHigh],
            BetCategory::RunningLow => &[BetCategory::RunningLow],
        }
    }
}

impl fmt::Display for BetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BetCategory {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BetCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| SettlementError::InvalidCategory(s.to_string()))
    }
}

/// Check that `number` is exactly `digits` ASCII digits.
pub fn validate_number(
    category: BetCategory,
    number: &str,
    digits: usize,
) -> Result<(), SettlementError> {
    if number.len() == digits && number.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(SettlementError::InvalidNumber {
            category,
            number: number.to_string(),
            expected_digits: digits,
        })
    }
}

// =============================================================================
// Periods and agents
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    Open,
    Closed,
}

impl PeriodStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodStatus::Open => "open",
            PeriodStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(PeriodStatus::Open),
            "closed" => Some(PeriodStatus::Closed),
            _ => None,
        }
    }
}

/// One draw cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: PeriodId,
    pub name: String,
    pub draw_date: NaiveDate,
    pub status: PeriodStatus,
    pub is_current: bool,
}

/// A ticket-selling agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    /// Income share in whole percent, 0..=100
    pub income_share_percent: u8,
}

// =============================================================================
// Wagers
// =============================================================================

/// One ticket line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    pub period_id: PeriodId,
    pub agent_id: AgentId,
    pub bill_id: BillId,
    pub category: BetCategory,
    pub number: String,
    pub stake: Decimal,
    /// Any-order stake, only for `ThreeDigitStraightAnyOrder`
    pub secondary_stake: Option<Decimal>,
}

impl Wager {
    /// Validate the number shape for the wager's category.
    pub fn validate(&self) -> Result<(), SettlementError> {
        validate_number(self.category, &self.number, self.category.digits())
    }

    /// Everything staked on this line, both components included.
    pub fn total_stake(&self) -> Result<Decimal, SettlementError> {
        crate::money::add(
            self.stake,
            self.secondary_stake.unwrap_or(Decimal::ZERO),
            "stake",
        )
    }
}

// =============================================================================
// Draw results
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Pending,
    Announced,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "pending",
            ResultStatus::Announced => "announced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ResultStatus::Pending),
            "announced" => Some(ResultStatus::Announced),
            _ => None,
        }
    }
}

/// The winning numbers of a draw. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawNumbers {
    pub two_digit_high: Option<String>,
    pub two_digit_low: Option<String>,
    pub three_digit: Option<String>,
}

impl DrawNumbers {
    pub fn validate(&self) -> Result<(), SettlementError> {
        if let Some(n) = &self.two_digit_high {
            validate_number(BetCategory::TwoDigitHigh, n, 2)?;
        }
        if let Some(n) = &self.two_digit_low {
            validate_number(BetCategory::TwoDigitLow, n, 2)?;
        }
        if let Some(n) = &self.three_digit {
            validate_number(BetCategory::ThreeDigitStraight, n, 3)?;
        }
        Ok(())
    }
}

/// The announced outcome of one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawResult {
    pub period_id: PeriodId,
    pub announced_at: DateTime<Utc>,
    pub numbers: DrawNumbers,
    pub status: ResultStatus,
}

// =============================================================================
// Configuration entries
// =============================================================================

/// Half-price flag on (period, category, number)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalfPriceEntry {
    pub period_id: PeriodId,
    pub category: BetCategory,
    pub number: String,
}

/// Payout multiplier for one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEntry {
    pub category: BetCategory,
    pub multiplier: Decimal,
}

// =============================================================================
// Outcomes
// =============================================================================

/// Which result field and rule produced an outcome.
///
/// Differs from the wager category for straight-plus-any-order wagers, whose
/// components settle as `ThreeDigitStraight` or `ThreeDigitAnyOrder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    TwoDigitHigh,
    TwoDigitLow,
    ThreeDigitStraight,
    ThreeDigitAnyOrder,
    RunningHigh,
    RunningLow,
}

impl ResultKind {
    pub const ALL: [ResultKind; 6] = [
        ResultKind::TwoDigitHigh,
        ResultKind::TwoDigitLow,
        ResultKind::ThreeDigitStraight,
        ResultKind::ThreeDigitAnyOrder,
        ResultKind::RunningHigh,
        ResultKind::RunningLow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::TwoDigitHigh => "two_digit_high",
            ResultKind::TwoDigitLow => "two_digit_low",
            ResultKind::ThreeDigitStraight => "three_digit_straight",
            ResultKind::ThreeDigitAnyOrder => "three_digit_any_order",
            ResultKind::RunningHigh => "running_high",
            ResultKind::RunningLow => "running_low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ResultKind::ALL.iter().copied().find(|k| k.as_str() == s)
    }

    /// Category whose rate and half-price flags apply to this kind of win.
    pub fn rate_category(&self) -> BetCategory {
        match self {
            ResultKind::TwoDigitHigh => BetCategory::TwoDigitHigh,
            ResultKind::TwoDigitLow => BetCategory::TwoDigitLow,
            ResultKind::ThreeDigitStraight => BetCategory::ThreeDigitStraight,
            ResultKind::ThreeDigitAnyOrder => BetCategory::ThreeDigitAnyOrder,
            ResultKind::RunningHigh => BetCategory::RunningHigh,
            ResultKind::RunningLow => BetCategory::RunningLow,
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One settled win
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Deterministic id, stable across re-settlement of unchanged inputs
    pub id: String,
    pub period_id: PeriodId,
    pub agent_id: AgentId,
    pub bill_id: BillId,
    pub wager_id: WagerId,
    pub category: BetCategory,
    pub number: String,
    /// Stake of the component that won
    pub stake: Decimal,
    pub base_rate: Decimal,
    pub is_half_price: bool,
    pub effective_rate: Decimal,
    pub reward: Decimal,
    pub winning_number: String,
    pub result_kind: ResultKind,
    /// Index among several wins of the same kind for one wager (running bets)
    pub occurrence: u32,
}

/// Every outcome for one period, in settlement order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeSet {
    pub period_id: PeriodId,
    pub outcomes: Vec<Outcome>,
}

impl OutcomeSet {
    pub fn new(period_id: PeriodId, outcomes: Vec<Outcome>) -> Self {
        Self {
            period_id,
            outcomes,
        }
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn total_reward(&self) -> Result<Decimal, SettlementError> {
        crate::money::sum(self.outcomes.iter().map(|o| o.reward), "total reward")
    }

    pub fn for_wager(&self, wager_id: WagerId) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(move |o| o.wager_id == wager_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_category_round_trip_codes() {
        for category in BetCategory::ALL {
            assert_eq!(category.as_str().parse::<BetCategory>().unwrap(), category);
        }
    }

    #[test]
    fn test_unknown_category_rejected() {
        let err = "four_digit".parse::<BetCategory>().unwrap_err();
        assert!(matches!(err, SettlementError::InvalidCategory(ref s) if s == "four_digit"));
    }

    #[test]
    fn test_wager_number_validation() {
        let mut wager = Wager {
            id: 1,
            period_id: 1,
            agent_id: 1,
            bill_id: 1,
            category: BetCategory::ThreeDigitAnyOrder,
            number: "045".to_string(),
            stake: dec!(10),
            secondary_stake: None,
        };
        assert!(wager.validate().is_ok());

        wager.number = "45".to_string();
        assert!(matches!(
            wager.validate(),
            Err(SettlementError::InvalidNumber { expected_digits: 3, .. })
        ));

        wager.number = "4a5".to_string();
        assert!(wager.validate().is_err());
    }

    #[test]
    fn test_total_stake_includes_secondary() {
        let wager = Wager {
            id: 1,
            period_id: 1,
            agent_id: 1,
            bill_id: 1,
            category: BetCategory::ThreeDigitStraightAnyOrder,
            number: "123".to_string(),
            stake: dec!(20),
            secondary_stake: Some(dec!(15.50)),
        };
        assert_eq!(wager.total_stake().unwrap(), dec!(35.50));
    }

    #[test]
    fn test_draw_numbers_validation() {
        let numbers = DrawNumbers {
            two_digit_high: Some("12".to_string()),
            two_digit_low: None,
            three_digit: Some("3456".to_string()),
        };
        assert!(numbers.validate().is_err());
    }
}
