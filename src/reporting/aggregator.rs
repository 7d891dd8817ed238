//! Aggregator
//!
//! Folds wagers and persisted outcomes into per-agent and system summaries.
//! All sums are exact decimals; only commission is rounded.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::error::{SettlementError, SettlementResult};
use crate::models::{Agent, AgentId, BetCategory, Outcome, PeriodId, Wager, WagerId};
use crate::money;

/// Totals for one agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub agent_id: AgentId,
    pub name: String,
    pub income_share_percent: u8,
    pub wager_count: u64,
    pub total_stake: Decimal,
    /// Number of outcomes (running wagers may win more than once)
    pub win_count: u64,
    pub winning_wagers: u64,
    pub total_reward: Decimal,
    /// total_stake - total_reward, from the house's side
    pub profit_loss: Decimal,
    pub commission: Decimal,
}

/// Stake and reward for one bet category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub wager_count: u64,
    pub total_stake: Decimal,
    pub win_count: u64,
    pub total_reward: Decimal,
}

/// Totals across every agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSummary {
    pub period_id: Option<PeriodId>,
    pub agent_count: u64,
    pub wager_count: u64,
    pub total_stake: Decimal,
    pub win_count: u64,
    pub winning_wagers: u64,
    pub total_reward: Decimal,
    pub profit_loss: Decimal,
    pub commission: Decimal,
    pub by_category: BTreeMap<BetCategory, CategoryTotals>,
}

#[derive(Debug, Default)]
struct AgentTotals {
    wager_count: u64,
    total_stake: Decimal,
    win_count: u64,
    winners: BTreeSet<WagerId>,
    total_reward: Decimal,
}

/// Single-pass fold over wagers and outcomes.
#[derive(Debug, Default)]
pub struct Aggregator {
    period_id: Option<PeriodId>,
    agents: BTreeMap<AgentId, AgentTotals>,
    categories: BTreeMap<BetCategory, CategoryTotals>,
}

impl Aggregator {
    pub fn new(period_id: Option<PeriodId>) -> Self {
        Self {
            period_id,
            ..Default::default()
        }
    }

    pub fn add_wager(&mut self, wager: &Wager) -> SettlementResult<()> {
        let stake = wager.total_stake()?;

        let agent = self.agents.entry(wager.agent_id).or_default();
        agent.wager_count += 1;
        agent.total_stake = money::add(agent.total_stake, stake, "agent stake")?;

        let category = self.categories.entry(wager.category).or_default();
        category.wager_count += 1;
        category.total_stake = money::add(category.total_stake, stake, "category stake")?;
        Ok(())
    }

    pub fn add_outcome(&mut self, outcome: &Outcome) -> SettlementResult<()> {
        let agent = self.agents.entry(outcome.agent_id).or_default();
        agent.win_count += 1;
        agent.winners.insert(outcome.wager_id);
        agent.total_reward = money::add(agent.total_reward, outcome.reward, "agent reward")?;

        let category = self.categories.entry(outcome.category).or_default();
        category.win_count += 1;
        category.total_reward =
            money::add(category.total_reward, outcome.reward, "category reward")?;
        Ok(())
    }

    pub fn extend<'a>(
        &mut self,
        wagers: impl IntoIterator<Item = &'a Wager>,
        outcomes: impl IntoIterator<Item = &'a Outcome>,
    ) -> SettlementResult<()> {
        for wager in wagers {
            self.add_wager(wager)?;
        }
        for outcome in outcomes {
            self.add_outcome(outcome)?;
        }
        Ok(())
    }

    /// Per-agent summaries, by agent id.
    ///
    /// Every agent with activity must have a record; commission is never
    /// computed from a guessed share.
    pub fn agent_summaries(&self, agents: &[Agent]) -> SettlementResult<Vec<AgentSummary>> {
        let known: BTreeMap<AgentId, &Agent> = agents.iter().map(|a| (a.id, a)).collect();

        self.agents
            .iter()
            .map(|(agent_id, totals)| -> SettlementResult<AgentSummary> {
                let agent = known.get(agent_id).ok_or_else(|| {
                    warn!(agent_id, "Agent has activity but no record");
                    SettlementError::NotFound {
                        entity: "Agent",
                        id: *agent_id,
                    }
                })?;
                let share = agent.income_share_percent;
                Ok(AgentSummary {
                    agent_id: *agent_id,
                    name: agent.name.clone(),
                    income_share_percent: share,
                    wager_count: totals.wager_count,
                    total_stake: totals.total_stake,
                    win_count: totals.win_count,
                    winning_wagers: totals.winners.len() as u64,
                    total_reward: totals.total_reward,
                    profit_loss: money::sub(totals.total_stake, totals.total_reward, "profit/loss")?,
                    commission: money::percent_of(totals.total_stake, share)?,
                })
            })
            .collect()
    }

    pub fn system_summary(&self, agents: &[Agent]) -> SettlementResult<SystemSummary> {
        let per_agent = self.agent_summaries(agents)?;

        let mut summary = SystemSummary {
            period_id: self.period_id,
            agent_count: per_agent.len() as u64,
            wager_count: 0,
            total_stake: Decimal::ZERO,
            win_count: 0,
            winning_wagers: 0,
            total_reward: Decimal::ZERO,
            profit_loss: Decimal::ZERO,
            commission: Decimal::ZERO,
            by_category: self.categories.clone(),
        };
        for agent in &per_agent {
            summary.wager_count += agent.wager_count;
            summary.total_stake = money::add(summary.total_stake, agent.total_stake, "total stake")?;
            summary.win_count += agent.win_count;
            summary.winning_wagers += agent.winning_wagers;
            summary.total_reward =
                money::add(summary.total_reward, agent.total_reward, "total reward")?;
            summary.commission = money::add(summary.commission, agent.commission, "commission")?;
        }
        summary.profit_loss = money::sub(summary.total_stake, summary.total_reward, "profit/loss")?;
        Ok(summary)
    }
}
