//! Reporting over persisted outcomes
//!
//! Summaries read the Wager Store and the Outcome Store only, inside one
//! transaction. Nothing here re-runs matching; a period that has not been
//! settled reports zero rewards.

pub mod aggregator;

pub use aggregator::{AgentSummary, Aggregator, CategoryTotals, SystemSummary};

use tracing::debug;

use crate::error::SettlementResult;
use crate::models::{Agent, PeriodId};
use crate::storage::LotteryDb;

/// Fold one consistent read of agents, wagers and outcomes.
fn fold(db: &LotteryDb, period_id: Option<PeriodId>) -> SettlementResult<(Aggregator, Vec<Agent>)> {
    let inputs = db.load_report_inputs(period_id)?;
    debug!(
        ?period_id,
        wagers = inputs.wagers.len(),
        outcomes = inputs.outcomes.len(),
        "Aggregating"
    );

    let mut aggregator = Aggregator::new(period_id);
    aggregator.extend(&inputs.wagers, &inputs.outcomes)?;
    Ok((aggregator, inputs.agents))
}

/// Per-agent totals, across all periods or one.
pub fn agent_summary(
    db: &LotteryDb,
    period_id: Option<PeriodId>,
) -> SettlementResult<Vec<AgentSummary>> {
    let (aggregator, agents) = fold(db, period_id)?;
    aggregator.agent_summaries(&agents)
}

/// Totals across every agent, with a per-category breakdown.
pub fn system_summary(db: &LotteryDb, period_id: Option<PeriodId>) -> SettlementResult<SystemSummary> {
    let (aggregator, agents) = fold(db, period_id)?;
    aggregator.system_summary(&agents)
}
