//! Periods and draw results

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::info;

use super::{corrupt, LotteryDb};
use crate::error::{SettlementError, SettlementResult};
use crate::models::{DrawNumbers, DrawResult, Period, PeriodId, PeriodStatus, ResultStatus};

const DATE_FMT: &str = "%Y-%m-%d";

struct PeriodRow {
    id: PeriodId,
    name: String,
    draw_date: String,
    status: String,
    is_current: bool,
}

impl PeriodRow {
    fn into_period(self) -> SettlementResult<Period> {
        let draw_date = NaiveDate::parse_from_str(&self.draw_date, DATE_FMT)
            .map_err(|_| corrupt("periods.draw_date", &self.draw_date))?;
        let status =
            PeriodStatus::parse(&self.status).ok_or_else(|| corrupt("periods.status", &self.status))?;
        Ok(Period {
            id: self.id,
            name: self.name,
            draw_date,
            status,
            is_current: self.is_current,
        })
    }
}

struct ResultRow {
    period_id: PeriodId,
    announced_at: String,
    two_digit_high: Option<String>,
    two_digit_low: Option<String>,
    three_digit: Option<String>,
    status: String,
}

impl ResultRow {
    fn into_result(self) -> SettlementResult<DrawResult> {
        let announced_at = DateTime::parse_from_rfc3339(&self.announced_at)
            .map_err(|_| corrupt("results.announced_at", &self.announced_at))?
            .with_timezone(&Utc);
        let status =
            ResultStatus::parse(&self.status).ok_or_else(|| corrupt("results.status", &self.status))?;
        let numbers = DrawNumbers {
            two_digit_high: self.two_digit_high,
            two_digit_low: self.two_digit_low,
            three_digit: self.three_digit,
        };
        numbers.validate()?;
        Ok(DrawResult {
            period_id: self.period_id,
            announced_at,
            numbers,
            status,
        })
    }
}

pub(super) fn select_result(
    conn: &Connection,
    period_id: PeriodId,
) -> SettlementResult<Option<DrawResult>> {
    let row = conn
        .query_row(
            "SELECT period_id, announced_at, two_digit_high, two_digit_low, three_digit, status
             FROM results WHERE period_id = ?1",
            [period_id],
            |row| {
                Ok(ResultRow {
                    period_id: row.get(0)?,
                    announced_at: row.get(1)?,
                    two_digit_high: row.get(2)?,
                    two_digit_low: row.get(3)?,
                    three_digit: row.get(4)?,
                    status: row.get(5)?,
                })
            },
        )
        .optional()?;
    row.map(ResultRow::into_result).transpose()
}

fn select_period(conn: &Connection, period_id: PeriodId) -> SettlementResult<Option<Period>> {
    let row = conn
        .query_row(
            "SELECT id, name, draw_date, status, is_current FROM periods WHERE id = ?1",
            [period_id],
            |row| {
                Ok(PeriodRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    draw_date: row.get(2)?,
                    status: row.get(3)?,
                    is_current: row.get(4)?,
                })
            },
        )
        .optional()?;
    row.map(PeriodRow::into_period).transpose()
}

/// Validate and upsert a result for an existing period.
pub(super) fn write_result(
    conn: &Connection,
    period_id: PeriodId,
    numbers: &DrawNumbers,
    status: ResultStatus,
) -> SettlementResult<DrawResult> {
    numbers.validate()?;
    if select_period(conn, period_id)?.is_none() {
        return Err(SettlementError::NotFound {
            entity: "Period",
            id: period_id,
        });
    }

    let announced_at = Utc::now();
    conn.execute(
        "INSERT INTO results (period_id, announced_at, two_digit_high, two_digit_low, three_digit, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(period_id) DO UPDATE SET
            announced_at = excluded.announced_at,
            two_digit_high = excluded.two_digit_high,
            two_digit_low = excluded.two_digit_low,
            three_digit = excluded.three_digit,
            status = excluded.status",
        params![
            period_id,
            announced_at.to_rfc3339(),
            numbers.two_digit_high,
            numbers.two_digit_low,
            numbers.three_digit,
            status.as_str(),
        ],
    )?;

    Ok(DrawResult {
        period_id,
        announced_at,
        numbers: numbers.clone(),
        status,
    })
}

impl LotteryDb {
    /// Create an open, non-current period
    pub fn create_period(&self, name: &str, draw_date: NaiveDate) -> SettlementResult<Period> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO periods (name, draw_date, status, is_current) VALUES (?1, ?2, 'open', 0)",
            params![name, draw_date.format(DATE_FMT).to_string()],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Period {
            id,
            name: name.to_string(),
            draw_date,
            status: PeriodStatus::Open,
            is_current: false,
        })
    }

    pub fn get_period(&self, period_id: PeriodId) -> SettlementResult<Period> {
        let conn = self.conn.lock();
        select_period(&conn, period_id)?.ok_or(SettlementError::NotFound {
            entity: "Period",
            id: period_id,
        })
    }

    pub fn current_period(&self) -> SettlementResult<Option<Period>> {
        let conn = self.conn.lock();
        let id: Option<PeriodId> = conn
            .query_row("SELECT id FROM periods WHERE is_current = 1", [], |row| row.get(0))
            .optional()?;
        match id {
            Some(id) => select_period(&conn, id),
            None => Ok(None),
        }
    }

    /// Make `period_id` the only current period.
    pub fn set_current_period(&self, period_id: PeriodId) -> SettlementResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("UPDATE periods SET is_current = 0 WHERE is_current = 1", [])?;
        let changed = tx.execute(
            "UPDATE periods SET is_current = 1 WHERE id = ?1",
            [period_id],
        )?;
        if changed == 0 {
            // Dropping the transaction rolls back the reset above.
            return Err(SettlementError::NotFound {
                entity: "Period",
                id: period_id,
            });
        }
        tx.commit()?;
        info!(period_id, "Current period changed");
        Ok(())
    }

    pub fn set_period_status(&self, period_id: PeriodId, status: PeriodStatus) -> SettlementResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "UPDATE periods SET status = ?1 WHERE id = ?2",
            params![status.as_str(), period_id],
        )?;
        if changed == 0 {
            return Err(SettlementError::NotFound {
                entity: "Period",
                id: period_id,
            });
        }
        Ok(())
    }

    pub fn get_result(&self, period_id: PeriodId) -> SettlementResult<Option<DrawResult>> {
        let conn = self.conn.lock();
        select_result(&conn, period_id)
    }

    /// Insert or replace the period's result.
    pub fn upsert_result(
        &self,
        period_id: PeriodId,
        numbers: &DrawNumbers,
        status: ResultStatus,
    ) -> SettlementResult<DrawResult> {
        let conn = self.conn.lock();
        write_result(&conn, period_id, numbers, status)
    }

    /// Remove the result and every outcome settled from it.
    ///
    /// Returns the number of outcomes removed.
    pub fn delete_result(&self, period_id: PeriodId) -> SettlementResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed_result = tx.execute("DELETE FROM results WHERE period_id = ?1", [period_id])?;
        if removed_result == 0 {
            return Err(SettlementError::result_not_found(period_id));
        }
        let removed_outcomes =
            tx.execute("DELETE FROM outcomes WHERE period_id = ?1", [period_id])?;
        tx.commit()?;
        info!(period_id, removed_outcomes, "Result deleted");
        Ok(removed_outcomes)
    }
}
