//! Settlement Service
//!
//! Binds the engine to the store: snapshot, settle, persist. Every write for
//! a period runs under that period's lock, and a persisted settlement reads
//! and writes inside one database transaction.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::SettlementResult;
use crate::models::{DrawNumbers, OutcomeSet, PeriodId, ResultStatus};
use crate::settlement::engine::{SettlementEngine, SettlementRun, SettlementStats};
use crate::settlement::lock::PeriodLocks;
use crate::storage::{LotteryDb, SettlementRunRecord};

/// What a persisted settlement produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub run: SettlementRunRecord,
    pub stats: SettlementStats,
    pub outcomes: OutcomeSet,
}

pub struct SettlementService {
    db: LotteryDb,
    engine: SettlementEngine,
    locks: Arc<PeriodLocks>,
}

impl SettlementService {
    pub fn new(db: LotteryDb) -> Self {
        Self {
            db,
            engine: SettlementEngine::new(),
            locks: Arc::new(PeriodLocks::new()),
        }
    }

    /// Share a lock registry with other services on the same database.
    pub fn with_locks(db: LotteryDb, locks: Arc<PeriodLocks>) -> Self {
        Self {
            db,
            engine: SettlementEngine::new(),
            locks,
        }
    }

    pub fn db(&self) -> &LotteryDb {
        &self.db
    }

    /// Compute the period's outcomes without persisting anything.
    pub fn settle(&self, period_id: PeriodId) -> SettlementResult<SettlementRun> {
        let snapshot = self.db.load_snapshot(period_id)?;
        self.engine.settle(&snapshot)
    }

    /// Replace the period's persisted outcomes with `outcomes`.
    pub fn replace_outcomes(
        &self,
        period_id: PeriodId,
        outcomes: &OutcomeSet,
    ) -> SettlementResult<SettlementRunRecord> {
        self.locks
            .with_period(period_id, || self.db.replace_outcomes(period_id, outcomes))
    }

    /// Settle the period and persist the result as one step.
    ///
    /// On any failure the previously persisted outcomes stay in place.
    pub fn settle_and_persist(&self, period_id: PeriodId) -> SettlementResult<SettlementReport> {
        self.locks
            .with_period(period_id, || self.settle_locked(period_id, None))
    }

    /// Store `numbers` as the period's announced result and re-settle.
    ///
    /// The result write and the settlement commit together: if settlement
    /// fails, the previous result and outcomes stay exactly as they were.
    pub fn announce_result(
        &self,
        period_id: PeriodId,
        numbers: &DrawNumbers,
    ) -> SettlementResult<SettlementReport> {
        self.locks.with_period(period_id, || {
            let previous = self.db.get_result(period_id)?;
            let report =
                self.settle_locked(period_id, Some((numbers, ResultStatus::Announced)))?;
            match previous {
                Some(prev) if prev.numbers != *numbers => {
                    info!(period_id, "🔁 Result re-announced, outcomes regenerated")
                }
                Some(_) => {}
                None => info!(period_id, "📣 Result announced"),
            }
            Ok(report)
        })
    }

    /// Remove the period's result together with its outcomes.
    pub fn delete_result(&self, period_id: PeriodId) -> SettlementResult<usize> {
        self.locks
            .with_period(period_id, || self.db.delete_result(period_id))
    }

    fn settle_locked(
        &self,
        period_id: PeriodId,
        pending_result: Option<(&DrawNumbers, ResultStatus)>,
    ) -> SettlementResult<SettlementReport> {
        let (run, record) = self
            .db
            .settle_atomically(period_id, pending_result, |snapshot| {
                self.engine.settle(snapshot)
            })
            .map_err(|e| {
                warn!(period_id, error = %e, "Settlement rejected, keeping previous outcomes");
                e
            })?;

        info!(
            period_id,
            run_id = record.id,
            outcomes = record.outcome_count,
            total_reward = %record.total_reward,
            "✅ Period settled"
        );

        Ok(SettlementReport {
            run: record,
            stats: run.stats,
            outcomes: run.outcomes,
        })
    }
}
