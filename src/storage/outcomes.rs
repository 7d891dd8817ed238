//! Persisted outcomes and the settlement run log

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{corrupt, parse_decimal, LotteryDb};
use crate::error::{SettlementError, SettlementResult};
use crate::models::{AgentId, Outcome, OutcomeSet, PeriodId, ResultKind};

/// One completed settlement of a period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementRunRecord {
    pub id: i64,
    pub period_id: PeriodId,
    pub settled_at: DateTime<Utc>,
    pub outcome_count: u64,
    pub total_reward: Decimal,
}

const OUTCOME_COLUMNS: &str = "id, period_id, agent_id, bill_id, wager_id, category, number, \
     stake, base_rate, is_half_price, effective_rate, reward, winning_number, result_kind, occurrence";

struct OutcomeRow {
    id: String,
    period_id: PeriodId,
    agent_id: AgentId,
    bill_id: i64,
    wager_id: i64,
    category: String,
    number: String,
    stake: String,
    base_rate: String,
    is_half_price: bool,
    effective_rate: String,
    reward: String,
    winning_number: String,
    result_kind: String,
    occurrence: u32,
}

impl OutcomeRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            period_id: row.get(1)?,
            agent_id: row.get(2)?,
            bill_id: row.get(3)?,
            wager_id: row.get(4)?,
            category: row.get(5)?,
            number: row.get(6)?,
            stake: row.get(7)?,
            base_rate: row.get(8)?,
            is_half_price: row.get(9)?,
            effective_rate: row.get(10)?,
            reward: row.get(11)?,
            winning_number: row.get(12)?,
            result_kind: row.get(13)?,
            occurrence: row.get(14)?,
        })
    }

    fn into_outcome(self) -> SettlementResult<Outcome> {
        let result_kind = ResultKind::parse(&self.result_kind)
            .ok_or_else(|| corrupt("outcomes.result_kind", &self.result_kind))?;
        Ok(Outcome {
            id: self.id,
            period_id: self.period_id,
            agent_id: self.agent_id,
            bill_id: self.bill_id,
            wager_id: self.wager_id,
            category: self.category.parse()?,
            number: self.number,
            stake: parse_decimal("outcomes.stake", &self.stake)?,
            base_rate: parse_decimal("outcomes.base_rate", &self.base_rate)?,
            is_half_price: self.is_half_price,
            effective_rate: parse_decimal("outcomes.effective_rate", &self.effective_rate)?,
            reward: parse_decimal("outcomes.reward", &self.reward)?,
            winning_number: self.winning_number,
            result_kind,
            occurrence: self.occurrence,
        })
    }
}

// Same order the engine produces.
pub(super) fn select_outcomes(
    conn: &Connection,
    period_id: Option<PeriodId>,
    agent_id: Option<AgentId>,
) -> SettlementResult<Vec<Outcome>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {OUTCOME_COLUMNS} FROM outcomes
         WHERE (?1 IS NULL OR period_id = ?1) AND (?2 IS NULL OR agent_id = ?2)"
    ))?;
    let rows = stmt
        .query_map(params![period_id, agent_id], OutcomeRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    let mut outcomes = rows
        .into_iter()
        .map(OutcomeRow::into_outcome)
        .collect::<SettlementResult<Vec<_>>>()?;
    outcomes.sort_by(|a, b| {
        (a.period_id, a.category, a.wager_id, a.result_kind, a.occurrence).cmp(&(
            b.period_id,
            b.category,
            b.wager_id,
            b.result_kind,
            b.occurrence,
        ))
    });
    Ok(outcomes)
}

/// Replace every outcome of `period_id` with `set` and append a run log
/// entry, on a connection the caller has already put inside a transaction.
///
/// Returns the run record and the number of outcomes removed.
pub(super) fn write_outcomes(
    conn: &Connection,
    period_id: PeriodId,
    set: &OutcomeSet,
) -> SettlementResult<(SettlementRunRecord, usize)> {
    if set.period_id != period_id {
        return Err(SettlementError::PeriodMismatch {
            expected: period_id,
            found: set.period_id,
        });
    }
    if let Some(stray) = set.outcomes.iter().find(|o| o.period_id != period_id) {
        return Err(SettlementError::PeriodMismatch {
            expected: period_id,
            found: stray.period_id,
        });
    }

    let settled_at = Utc::now();
    let total_reward = set.total_reward()?;

    let removed = conn.execute("DELETE FROM outcomes WHERE period_id = ?1", [period_id])?;
    {
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO outcomes ({OUTCOME_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
        ))?;
        for o in &set.outcomes {
            stmt.execute(params![
                o.id,
                o.period_id,
                o.agent_id,
                o.bill_id,
                o.wager_id,
                o.category.as_str(),
                o.number,
                o.stake.to_string(),
                o.base_rate.to_string(),
                o.is_half_price,
                o.effective_rate.to_string(),
                o.reward.to_string(),
                o.winning_number,
                o.result_kind.as_str(),
                o.occurrence,
            ])?;
        }
    }
    conn.execute(
        "INSERT INTO settlement_runs (period_id, settled_at, outcome_count, total_reward)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            period_id,
            settled_at.to_rfc3339(),
            set.len() as i64,
            total_reward.to_string()
        ],
    )?;

    let record = SettlementRunRecord {
        id: conn.last_insert_rowid(),
        period_id,
        settled_at,
        outcome_count: set.len() as u64,
        total_reward,
    };
    Ok((record, removed))
}

impl LotteryDb {
    /// Atomically replace every outcome of `period_id` with `set`.
    ///
    /// The delete, the inserts and the run log entry share one
    /// `BEGIN IMMEDIATE` transaction; any failure leaves the previous
    /// outcomes untouched.
    pub fn replace_outcomes(
        &self,
        period_id: PeriodId,
        set: &OutcomeSet,
    ) -> SettlementResult<SettlementRunRecord> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (record, removed) = write_outcomes(&tx, period_id, set)?;
        tx.commit()?;

        info!(
            period_id,
            removed,
            inserted = set.len(),
            total_reward = %record.total_reward,
            "💾 Outcomes replaced"
        );
        Ok(record)
    }

    /// Persisted outcomes of one period, optionally for one agent only.
    pub fn outcomes_for_period(
        &self,
        period_id: PeriodId,
        agent_id: Option<AgentId>,
    ) -> SettlementResult<OutcomeSet> {
        let conn = self.conn.lock();
        let outcomes = select_outcomes(&conn, Some(period_id), agent_id)?;
        Ok(OutcomeSet::new(period_id, outcomes))
    }

    /// Persisted outcomes across all periods, or one period.
    pub fn outcomes_in_scope(&self, period_id: Option<PeriodId>) -> SettlementResult<Vec<Outcome>> {
        let conn = self.conn.lock();
        select_outcomes(&conn, period_id, None)
    }

    /// Run log of one period, newest first
    pub fn settlement_runs(&self, period_id: PeriodId) -> SettlementResult<Vec<SettlementRunRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, period_id, settled_at, outcome_count, total_reward
             FROM settlement_runs WHERE period_id = ?1 ORDER BY id DESC",
        )?;
        let rows = stmt
            .query_map([period_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, PeriodId>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, period_id, settled_at, outcome_count, total_reward)| {
                let settled_at = DateTime::parse_from_rfc3339(&settled_at)
                    .map_err(|_| corrupt("settlement_runs.settled_at", &settled_at))?
                    .with_timezone(&Utc);
                let outcome_count = u64::try_from(outcome_count).map_err(|_| {
                    corrupt("settlement_runs.outcome_count", &outcome_count.to_string())
                })?;
                Ok(SettlementRunRecord {
                    id,
                    period_id,
                    settled_at,
                    outcome_count,
                    total_reward: parse_decimal("settlement_runs.total_reward", &total_reward)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::create_test_db;
    use super::*;
    use crate::models::BetCategory;
    use crate::settlement::engine::outcome_id;
    use rust_decimal_macros::dec;

    fn outcome(period_id: PeriodId, wager_id: i64, agent_id: AgentId, reward: Decimal) -> Outcome {
        Outcome {
            id: outcome_id(period_id, wager_id, ResultKind::TwoDigitHigh, 0),
            period_id,
            agent_id,
            bill_id: 1,
            wager_id,
            category: BetCategory::TwoDigitHigh,
            number: "12".to_string(),
            stake: dec!(10),
            base_rate: dec!(70),
            is_half_price: false,
            effective_rate: dec!(70),
            reward,
            winning_number: "12".to_string(),
            result_kind: ResultKind::TwoDigitHigh,
            occurrence: 0,
        }
    }

    #[test]
    fn test_replace_is_idempotent() {
        let (db, _temp) = create_test_db();
        let set = OutcomeSet::new(1, vec![outcome(1, 1, 1, dec!(700)), outcome(1, 2, 2, dec!(700))]);

        db.replace_outcomes(1, &set).unwrap();
        db.replace_outcomes(1, &set).unwrap();

        let stored = db.outcomes_for_period(1, None).unwrap();
        assert_eq!(stored, set);
        assert_eq!(db.settlement_runs(1).unwrap().len(), 2);
    }

    #[test]
    fn test_replace_removes_stale_outcomes() {
        let (db, _temp) = create_test_db();
        db.replace_outcomes(1, &OutcomeSet::new(1, vec![outcome(1, 1, 1, dec!(700))]))
            .unwrap();
        db.replace_outcomes(1, &OutcomeSet::new(1, vec![])).unwrap();
        assert!(db.outcomes_for_period(1, None).unwrap().is_empty());

        let runs = db.settlement_runs(1).unwrap();
        assert_eq!(runs[0].outcome_count, 0);
        assert_eq!(runs[1].total_reward, dec!(700));
    }

    #[test]
    fn test_failed_replace_keeps_previous_outcomes() {
        let (db, _temp) = create_test_db();
        let original = OutcomeSet::new(1, vec![outcome(1, 1, 1, dec!(700))]);
        db.replace_outcomes(1, &original).unwrap();

        // Two rows with the same id violate the primary key mid-transaction.
        let duplicate = outcome(1, 2, 1, dec!(350));
        let broken = OutcomeSet::new(1, vec![duplicate.clone(), duplicate]);
        let err = db.replace_outcomes(1, &broken).unwrap_err();
        assert!(matches!(err, SettlementError::PersistenceFailure(_)));

        assert_eq!(db.outcomes_for_period(1, None).unwrap(), original);
        assert_eq!(db.settlement_runs(1).unwrap().len(), 1);
    }

    #[test]
    fn test_replace_rejects_foreign_period() {
        let (db, _temp) = create_test_db();
        let set = OutcomeSet::new(1, vec![outcome(2, 1, 1, dec!(700))]);
        assert!(matches!(
            db.replace_outcomes(1, &set),
            Err(SettlementError::PeriodMismatch { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn test_filters_by_agent_and_period() {
        let (db, _temp) = create_test_db();
        db.replace_outcomes(1, &OutcomeSet::new(1, vec![outcome(1, 1, 1, dec!(1)), outcome(1, 2, 2, dec!(2))]))
            .unwrap();
        db.replace_outcomes(2, &OutcomeSet::new(2, vec![outcome(2, 3, 1, dec!(3))]))
            .unwrap();

        let agent_one = db.outcomes_for_period(1, Some(1)).unwrap();
        assert_eq!(agent_one.len(), 1);
        assert_eq!(agent_one.outcomes[0].wager_id, 1);

        assert_eq!(db.outcomes_in_scope(None).unwrap().len(), 3);
        assert_eq!(db.outcomes_in_scope(Some(2)).unwrap().len(), 1);
    }
}
