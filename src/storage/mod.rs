//! SQLite-backed stores
//!
//! One database holds periods, agents, wagers, results, the Rate Table, the
//! Half-Price Registry, persisted outcomes and the settlement run log.
//!
//! - WAL mode for concurrent reads during writes
//! - money and rates stored as TEXT decimals, never REAL
//! - settlement snapshots read inside one transaction
//! - outcome replacement inside one `BEGIN IMMEDIATE` transaction, together
//!   with the result write when a result is announced
//! - report inputs read inside one transaction

mod outcomes;
mod periods;
mod wagers;

pub use outcomes::SettlementRunRecord;
pub use wagers::NewWager;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{SettlementError, SettlementResult};
use crate::models::{
    Agent, BetCategory, DrawNumbers, DrawResult, Outcome, PeriodId, ResultStatus, Wager,
};
use crate::settlement::engine::SettlementRun;
use crate::settlement::providers::{
    HalfPriceProvider, PeriodProvider, RateProvider, SettlementSnapshot, WagerProvider,
};
use crate::settlement::rates::HalfPriceSet;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS periods (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    draw_date TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'open',
    is_current INTEGER NOT NULL DEFAULT 0
);

-- At most one current period
CREATE UNIQUE INDEX IF NOT EXISTS idx_periods_current
    ON periods(is_current) WHERE is_current = 1;

CREATE TABLE IF NOT EXISTS agents (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    income_share_percent INTEGER NOT NULL
        CHECK (income_share_percent BETWEEN 0 AND 100)
);

CREATE TABLE IF NOT EXISTS wagers (
    id INTEGER PRIMARY KEY,
    period_id INTEGER NOT NULL REFERENCES periods(id),
    agent_id INTEGER NOT NULL,
    bill_id INTEGER NOT NULL,
    category TEXT NOT NULL,
    number TEXT NOT NULL,
    stake TEXT NOT NULL,
    secondary_stake TEXT
);

CREATE INDEX IF NOT EXISTS idx_wagers_period_category
    ON wagers(period_id, category, id);

CREATE INDEX IF NOT EXISTS idx_wagers_agent_period
    ON wagers(agent_id, period_id);

CREATE TABLE IF NOT EXISTS results (
    period_id INTEGER PRIMARY KEY REFERENCES periods(id),
    announced_at TEXT NOT NULL,
    two_digit_high TEXT,
    two_digit_low TEXT,
    three_digit TEXT,
    status TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rates (
    category TEXT PRIMARY KEY,
    multiplier TEXT NOT NULL,
    updated_at TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS half_price (
    period_id INTEGER NOT NULL,
    category TEXT NOT NULL,
    number TEXT NOT NULL,
    PRIMARY KEY (period_id, category, number)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS outcomes (
    id TEXT PRIMARY KEY,
    period_id INTEGER NOT NULL,
    agent_id INTEGER NOT NULL,
    bill_id INTEGER NOT NULL,
    wager_id INTEGER NOT NULL,
    category TEXT NOT NULL,
    number TEXT NOT NULL,
    stake TEXT NOT NULL,
    base_rate TEXT NOT NULL,
    is_half_price INTEGER NOT NULL,
    effective_rate TEXT NOT NULL,
    reward TEXT NOT NULL,
    winning_number TEXT NOT NULL,
    result_kind TEXT NOT NULL,
    occurrence INTEGER NOT NULL
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_outcomes_period
    ON outcomes(period_id, category, wager_id);

CREATE INDEX IF NOT EXISTS idx_outcomes_agent_period
    ON outcomes(agent_id, period_id);

CREATE TABLE IF NOT EXISTS settlement_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    period_id INTEGER NOT NULL,
    settled_at TEXT NOT NULL,
    outcome_count INTEGER NOT NULL,
    total_reward TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_settlement_runs_period
    ON settlement_runs(period_id, id DESC);
"#;

/// Consistent read of everything a summary needs
#[derive(Debug, Clone, Default)]
pub struct ReportInputs {
    pub agents: Vec<Agent>,
    pub wagers: Vec<Wager>,
    pub outcomes: Vec<Outcome>,
}

/// Lottery database
#[derive(Clone)]
pub struct LotteryDb {
    conn: Arc<Mutex<Connection>>,
}

impl LotteryDb {
    /// Open (or create) the database and apply the schema.
    pub fn new(db_path: &str) -> SettlementResult<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking

        let conn = Connection::open_with_flags(db_path, flags)?;
        conn.execute_batch(SCHEMA_SQL)?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!("WAL mode not active, journal_mode = {}", journal_mode);
        }

        let wagers: i64 = conn.query_row("SELECT COUNT(*) FROM wagers", [], |row| row.get(0))?;
        info!(db_path, wagers, "📊 Lottery database initialized");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Capture a consistent settlement snapshot for one period.
    ///
    /// Result, wagers, rates and half-price entries are all read inside a
    /// single read transaction.
    pub fn load_snapshot(&self, period_id: PeriodId) -> SettlementResult<SettlementSnapshot> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let snapshot = SettlementSnapshot::capture(period_id, &StoreView { conn: &tx })?;
        tx.commit()?;
        Ok(snapshot)
    }

    /// Settle one period and persist the outcomes in a single
    /// `BEGIN IMMEDIATE` transaction.
    ///
    /// When `pending_result` is given it is written first, so the result,
    /// the snapshot `settle` sees, the outcomes and the run log entry commit
    /// together. Any error rolls all of it back.
    pub fn settle_atomically<F>(
        &self,
        period_id: PeriodId,
        pending_result: Option<(&DrawNumbers, ResultStatus)>,
        settle: F,
    ) -> SettlementResult<(SettlementRun, SettlementRunRecord)>
    where
        F: FnOnce(&SettlementSnapshot) -> SettlementResult<SettlementRun>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some((numbers, status)) = pending_result {
            periods::write_result(&tx, period_id, numbers, status)?;
        }
        let snapshot = SettlementSnapshot::capture(period_id, &StoreView { conn: &tx })?;
        let run = settle(&snapshot)?;
        let (record, removed) = outcomes::write_outcomes(&tx, period_id, &run.outcomes)?;
        tx.commit()?;

        debug!(period_id, removed, inserted = run.outcomes.len(), "Outcomes replaced");
        Ok((run, record))
    }

    /// Agents, wagers and outcomes for a report, read inside one transaction.
    pub fn load_report_inputs(&self, period_id: Option<PeriodId>) -> SettlementResult<ReportInputs> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let inputs = ReportInputs {
            agents: wagers::select_agents(&tx)?,
            wagers: wagers::select_wagers_in_scope(&tx, period_id)?,
            outcomes: outcomes::select_outcomes(&tx, period_id, None)?,
        };
        tx.commit()?;
        Ok(inputs)
    }

    fn view<T>(&self, f: impl FnOnce(&StoreView<'_>) -> SettlementResult<T>) -> SettlementResult<T> {
        let conn = self.conn.lock();
        f(&StoreView { conn: &conn })
    }
}

// =============================================================================
// Read view implementing the settlement providers
// =============================================================================

/// Read-only view over a connection or an open transaction.
pub(crate) struct StoreView<'a> {
    pub(crate) conn: &'a Connection,
}

impl PeriodProvider for StoreView<'_> {
    fn result_for(&self, period_id: PeriodId) -> SettlementResult<DrawResult> {
        periods::select_result(self.conn, period_id)?
            .ok_or_else(|| SettlementError::result_not_found(period_id))
    }
}

impl WagerProvider for StoreView<'_> {
    fn wagers_for(&self, period_id: PeriodId, category: BetCategory) -> SettlementResult<Vec<Wager>> {
        wagers::select_wagers(self.conn, period_id, &[category])
    }

    fn running_wagers_for(&self, period_id: PeriodId) -> SettlementResult<Vec<Wager>> {
        wagers::select_wagers(
            self.conn,
            period_id,
            &[BetCategory::RunningHigh, BetCategory::RunningLow],
        )
    }
}

impl RateProvider for StoreView<'_> {
    fn rate_for(&self, category: BetCategory) -> SettlementResult<Decimal> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT multiplier FROM rates WHERE category = ?1",
                [category.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => parse_decimal("rates.multiplier", &raw),
            None => Err(SettlementError::ConfigMissing(category)),
        }
    }
}

impl HalfPriceProvider for StoreView<'_> {
    fn half_price_set(&self, period_id: PeriodId) -> SettlementResult<HalfPriceSet> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT category, number FROM half_price WHERE period_id = ?1",
        )?;
        let rows = stmt
            .query_map([period_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut set = HalfPriceSet::new();
        for (category, number) in rows {
            set.insert(category.parse::<BetCategory>()?, number);
        }
        Ok(set)
    }
}

// The database itself is a provider too; each call is its own read.
impl PeriodProvider for LotteryDb {
    fn result_for(&self, period_id: PeriodId) -> SettlementResult<DrawResult> {
        self.view(|v| v.result_for(period_id))
    }
}

impl WagerProvider for LotteryDb {
    fn wagers_for(&self, period_id: PeriodId, category: BetCategory) -> SettlementResult<Vec<Wager>> {
        self.view(|v| v.wagers_for(period_id, category))
    }

    fn running_wagers_for(&self, period_id: PeriodId) -> SettlementResult<Vec<Wager>> {
        self.view(|v| v.running_wagers_for(period_id))
    }
}

impl RateProvider for LotteryDb {
    fn rate_for(&self, category: BetCategory) -> SettlementResult<Decimal> {
        self.view(|v| v.rate_for(category))
    }
}

impl HalfPriceProvider for LotteryDb {
    fn half_price_set(&self, period_id: PeriodId) -> SettlementResult<HalfPriceSet> {
        self.view(|v| v.half_price_set(period_id))
    }
}

// =============================================================================
// Column helpers
// =============================================================================

pub(crate) fn parse_decimal(column: &'static str, raw: &str) -> SettlementResult<Decimal> {
    Decimal::from_str(raw).map_err(|_| SettlementError::CorruptValue {
        column,
        value: raw.to_string(),
    })
}

pub(crate) fn parse_optional_decimal(
    column: &'static str,
    raw: Option<&str>,
) -> SettlementResult<Option<Decimal>> {
    raw.map(|r| parse_decimal(column, r)).transpose()
}

pub(crate) fn corrupt(column: &'static str, value: &str) -> SettlementError {
    SettlementError::CorruptValue {
        column,
        value: value.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::NamedTempFile;

    pub fn create_test_db() -> (LotteryDb, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();
        let db = LotteryDb::new(&db_path).unwrap();
        (db, temp_file)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::create_test_db;
    use super::*;
    use crate::models::{DrawNumbers, ResultStatus};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_db_create_is_idempotent() {
        let (db, temp) = create_test_db();
        drop(db);
        let reopened = LotteryDb::new(temp.path().to_str().unwrap());
        assert!(reopened.is_ok());
    }

    #[test]
    fn test_snapshot_reads_everything_for_period() {
        let (db, _temp) = create_test_db();
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let p1 = db.create_period("16 Oct", date).unwrap();
        let p2 = db.create_period("01 Nov", date).unwrap();

        db.set_rate(BetCategory::TwoDigitHigh, dec!(70)).unwrap();
        db.add_half_price(p1.id, BetCategory::TwoDigitHigh, "12").unwrap();
        db.add_half_price(p2.id, BetCategory::TwoDigitHigh, "34").unwrap();
        db.insert_wager(&NewWager::new(p1.id, 1, 1, BetCategory::TwoDigitHigh, "12", dec!(10)))
            .unwrap();
        db.insert_wager(&NewWager::new(p2.id, 1, 2, BetCategory::TwoDigitHigh, "12", dec!(10)))
            .unwrap();
        db.upsert_result(
            p1.id,
            &DrawNumbers {
                two_digit_high: Some("12".to_string()),
                ..Default::default()
            },
            ResultStatus::Announced,
        )
        .unwrap();

        let snapshot = db.load_snapshot(p1.id).unwrap();
        assert_eq!(snapshot.wager_count(), 1);
        assert!(snapshot.half_price.contains(BetCategory::TwoDigitHigh, "12"));
        assert!(!snapshot.half_price.contains(BetCategory::TwoDigitHigh, "34"));
        assert_eq!(snapshot.rates.rate_for(BetCategory::TwoDigitHigh).unwrap(), dec!(70));
    }

    #[test]
    fn test_snapshot_without_result_is_not_found() {
        let (db, _temp) = create_test_db();
        let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        let period = db.create_period("16 Oct", date).unwrap();

        let err = db.load_snapshot(period.id).unwrap_err();
        assert!(matches!(err, SettlementError::NotFound { .. }));
    }

    #[test]
    fn test_missing_rate_is_config_missing() {
        let (db, _temp) = create_test_db();
        let err = db.rate_for(BetCategory::RunningHigh).unwrap_err();
        assert!(matches!(err, SettlementError::ConfigMissing(BetCategory::RunningHigh)));
    }

    #[test]
    fn test_corrupt_stored_category_is_reported() {
        let (db, _temp) = create_test_db();
        db.conn
            .lock()
            .execute(
                "INSERT INTO half_price (period_id, category, number) VALUES (1, 'four_digit', '1234')",
                [],
            )
            .unwrap();
        let err = db.half_price_set(1).unwrap_err();
        assert!(matches!(err, SettlementError::InvalidCategory(_)));
    }
}
