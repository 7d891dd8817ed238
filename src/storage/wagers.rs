//! Wagers, agents, the Rate Table and the Half-Price Registry

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::{corrupt, parse_decimal, parse_optional_decimal, LotteryDb};
use crate::error::{SettlementError, SettlementResult};
use crate::models::{
    Agent, AgentId, BetCategory, BillId, HalfPriceEntry, PeriodId, RateEntry, Wager,
};

/// A wager as entered, before it has an id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWager {
    pub period_id: PeriodId,
    pub agent_id: AgentId,
    pub bill_id: BillId,
    pub category: BetCategory,
    pub number: String,
    pub stake: Decimal,
    pub secondary_stake: Option<Decimal>,
}

impl NewWager {
    pub fn new(
        period_id: PeriodId,
        agent_id: AgentId,
        bill_id: BillId,
        category: BetCategory,
        number: &str,
        stake: Decimal,
    ) -> Self {
        Self {
            period_id,
            agent_id,
            bill_id,
            category,
            number: number.to_string(),
            stake,
            secondary_stake: None,
        }
    }

    pub fn with_secondary_stake(mut self, stake: Decimal) -> Self {
        self.secondary_stake = Some(stake);
        self
    }

    fn validate(&self) -> SettlementResult<()> {
        crate::models::validate_number(self.category, &self.number, self.category.digits())?;
        if self.stake <= Decimal::ZERO {
            return Err(SettlementError::InvalidWager(format!(
                "stake must be positive, got {}",
                self.stake
            )));
        }
        match (self.category, self.secondary_stake) {
            (BetCategory::ThreeDigitStraightAnyOrder, Some(s)) if s < Decimal::ZERO => Err(
                SettlementError::InvalidWager(format!("secondary stake must not be negative, got {s}")),
            ),
            (BetCategory::ThreeDigitStraightAnyOrder, _) | (_, None) => Ok(()),
            (category, Some(_)) => Err(SettlementError::InvalidWager(format!(
                "secondary stake is only valid for {}, not {category}",
                BetCategory::ThreeDigitStraightAnyOrder
            ))),
        }
    }
}

struct WagerRow {
    id: i64,
    period_id: PeriodId,
    agent_id: AgentId,
    bill_id: BillId,
    category: String,
    number: String,
    stake: String,
    secondary_stake: Option<String>,
}

impl WagerRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            period_id: row.get(1)?,
            agent_id: row.get(2)?,
            bill_id: row.get(3)?,
            category: row.get(4)?,
            number: row.get(5)?,
            stake: row.get(6)?,
            secondary_stake: row.get(7)?,
        })
    }

    fn into_wager(self) -> SettlementResult<Wager> {
        Ok(Wager {
            id: self.id,
            period_id: self.period_id,
            agent_id: self.agent_id,
            bill_id: self.bill_id,
            category: self.category.parse()?,
            number: self.number,
            stake: parse_decimal("wagers.stake", &self.stake)?,
            secondary_stake: parse_optional_decimal(
                "wagers.secondary_stake",
                self.secondary_stake.as_deref(),
            )?,
        })
    }
}

const WAGER_COLUMNS: &str =
    "id, period_id, agent_id, bill_id, category, number, stake, secondary_stake";

/// Wagers of `period_id` in any of `categories`, by id.
pub(super) fn select_wagers(
    conn: &Connection,
    period_id: PeriodId,
    categories: &[BetCategory],
) -> SettlementResult<Vec<Wager>> {
    let placeholders = (0..categories.len())
        .map(|i| format!("?{}", i + 2))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {WAGER_COLUMNS} FROM wagers
         WHERE period_id = ?1 AND category IN ({placeholders})
         ORDER BY id"
    );

    let mut values: Vec<rusqlite::types::Value> = vec![period_id.into()];
    values.extend(categories.iter().map(|c| c.as_str().to_string().into()));

    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), WagerRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(WagerRow::into_wager).collect()
}

/// Every wager, optionally limited to one period.
pub(super) fn select_wagers_in_scope(
    conn: &Connection,
    period_id: Option<PeriodId>,
) -> SettlementResult<Vec<Wager>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {WAGER_COLUMNS} FROM wagers
         WHERE ?1 IS NULL OR period_id = ?1
         ORDER BY id"
    ))?;
    let rows = stmt
        .query_map([period_id], WagerRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(WagerRow::into_wager).collect()
}

pub(super) fn select_agents(conn: &Connection) -> SettlementResult<Vec<Agent>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, name, income_share_percent FROM agents ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, AgentId>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(id, name, share)| {
            let income_share_percent = u8::try_from(share)
                .ok()
                .filter(|s| *s <= 100)
                .ok_or_else(|| corrupt("agents.income_share_percent", &share.to_string()))?;
            Ok(Agent {
                id,
                name,
                income_share_percent,
            })
        })
        .collect()
}

impl LotteryDb {
    /// Insert one validated wager and return it with its id.
    pub fn insert_wager(&self, wager: &NewWager) -> SettlementResult<Wager> {
        wager.validate()?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO wagers (period_id, agent_id, bill_id, category, number, stake, secondary_stake)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                wager.period_id,
                wager.agent_id,
                wager.bill_id,
                wager.category.as_str(),
                wager.number,
                wager.stake.to_string(),
                wager.secondary_stake.map(|s| s.to_string()),
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(wager_id = id, period_id = wager.period_id, category = %wager.category, "Wager stored");

        Ok(Wager {
            id,
            period_id: wager.period_id,
            agent_id: wager.agent_id,
            bill_id: wager.bill_id,
            category: wager.category,
            number: wager.number.clone(),
            stake: wager.stake,
            secondary_stake: wager.secondary_stake,
        })
    }

    /// Insert all lines of one bill atomically.
    pub fn insert_bill(&self, wagers: &[NewWager]) -> SettlementResult<Vec<Wager>> {
        for wager in wagers {
            wager.validate()?;
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut stored = Vec::with_capacity(wagers.len());
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO wagers (period_id, agent_id, bill_id, category, number, stake, secondary_stake)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for wager in wagers {
                stmt.execute(params![
                    wager.period_id,
                    wager.agent_id,
                    wager.bill_id,
                    wager.category.as_str(),
                    wager.number,
                    wager.stake.to_string(),
                    wager.secondary_stake.map(|s| s.to_string()),
                ])?;
                stored.push(Wager {
                    id: tx.last_insert_rowid(),
                    period_id: wager.period_id,
                    agent_id: wager.agent_id,
                    bill_id: wager.bill_id,
                    category: wager.category,
                    number: wager.number.clone(),
                    stake: wager.stake,
                    secondary_stake: wager.secondary_stake,
                });
            }
        }
        tx.commit()?;
        Ok(stored)
    }

    /// Delete every line of a bill and any outcome settled from it.
    ///
    /// Returns the number of lines removed.
    pub fn delete_bill(&self, bill_id: BillId) -> SettlementResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed_outcomes = tx.execute("DELETE FROM outcomes WHERE bill_id = ?1", [bill_id])?;
        let removed_wagers = tx.execute("DELETE FROM wagers WHERE bill_id = ?1", [bill_id])?;
        tx.commit()?;
        info!(bill_id, removed_wagers, removed_outcomes, "Bill deleted");
        Ok(removed_wagers)
    }

    pub fn wagers_in_scope(&self, period_id: Option<PeriodId>) -> SettlementResult<Vec<Wager>> {
        let conn = self.conn.lock();
        select_wagers_in_scope(&conn, period_id)
    }

    // -------------------------------------------------------------------------
    // Agents
    // -------------------------------------------------------------------------

    pub fn upsert_agent(&self, agent: &Agent) -> SettlementResult<()> {
        if agent.income_share_percent > 100 {
            return Err(SettlementError::InvalidWager(format!(
                "income share must be 0-100, got {}",
                agent.income_share_percent
            )));
        }
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO agents (id, name, income_share_percent) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                income_share_percent = excluded.income_share_percent",
            params![agent.id, agent.name, agent.income_share_percent],
        )?;
        Ok(())
    }

    pub fn agents(&self) -> SettlementResult<Vec<Agent>> {
        let conn = self.conn.lock();
        select_agents(&conn)
    }

    // -------------------------------------------------------------------------
    // Rate Table
    // -------------------------------------------------------------------------

    pub fn set_rate(&self, category: BetCategory, multiplier: Decimal) -> SettlementResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO rates (category, multiplier, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(category) DO UPDATE SET
                multiplier = excluded.multiplier,
                updated_at = excluded.updated_at",
            params![
                category.as_str(),
                multiplier.to_string(),
                Utc::now().to_rfc3339()
            ],
        )?;
        info!(category = %category, multiplier = %multiplier, "Rate updated");
        Ok(())
    }

    pub fn rates(&self) -> SettlementResult<Vec<RateEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT category, multiplier FROM rates ORDER BY category")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(category, multiplier)| {
                Ok(RateEntry {
                    category: category.parse()?,
                    multiplier: parse_decimal("rates.multiplier", &multiplier)?,
                })
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Half-Price Registry
    // -------------------------------------------------------------------------

    pub fn add_half_price(
        &self,
        period_id: PeriodId,
        category: BetCategory,
        number: &str,
    ) -> SettlementResult<()> {
        crate::models::validate_number(category, number, category.digits())?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO half_price (period_id, category, number) VALUES (?1, ?2, ?3)",
            params![period_id, category.as_str(), number],
        )?;
        Ok(())
    }

    /// Returns false when the entry did not exist.
    pub fn remove_half_price(
        &self,
        period_id: PeriodId,
        category: BetCategory,
        number: &str,
    ) -> SettlementResult<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM half_price WHERE period_id = ?1 AND category = ?2 AND number = ?3",
            params![period_id, category.as_str(), number],
        )?;
        Ok(removed > 0)
    }

    pub fn half_price_entries(&self, period_id: PeriodId) -> SettlementResult<Vec<HalfPriceEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT category, number FROM half_price WHERE period_id = ?1 ORDER BY category, number",
        )?;
        let rows = stmt
            .query_map([period_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(category, number)| {
                Ok(HalfPriceEntry {
                    period_id,
                    category: category.parse()?,
                    number,
                })
            })
            .collect()
    }

    pub fn agent(&self, agent_id: AgentId) -> SettlementResult<Option<Agent>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT id, name, income_share_percent FROM agents WHERE id = ?1",
                [agent_id],
                |row| {
                    Ok((
                        row.get::<_, AgentId>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, u8>(2)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(id, name, income_share_percent)| Agent {
            id,
            name,
            income_share_percent,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::create_test_db;
    use super::*;
    use crate::settlement::providers::WagerProvider;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn period(db: &LotteryDb) -> PeriodId {
        db.create_period("p", NaiveDate::from_ymd_opt(2026, 12, 1).unwrap())
            .unwrap()
            .id
    }

    #[test]
    fn test_insert_and_query_by_category() {
        let (db, _temp) = create_test_db();
        let p = period(&db);
        db.insert_wager(&NewWager::new(p, 1, 1, BetCategory::TwoDigitLow, "07", dec!(12.50)))
            .unwrap();
        db.insert_wager(&NewWager::new(p, 1, 1, BetCategory::RunningLow, "7", dec!(5)))
            .unwrap();
        db.insert_wager(&NewWager::new(p, 2, 2, BetCategory::RunningHigh, "3", dec!(5)))
            .unwrap();

        let low = db.wagers_for(p, BetCategory::TwoDigitLow).unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].number, "07");
        assert_eq!(low[0].stake, dec!(12.50));

        let running = db.running_wagers_for(p).unwrap();
        assert_eq!(running.len(), 2);
        assert!(running.iter().all(|w| w.category.is_running()));
    }

    #[test]
    fn test_wager_validation() {
        let (db, _temp) = create_test_db();
        let p = period(&db);

        let bad_number = NewWager::new(p, 1, 1, BetCategory::ThreeDigitStraight, "12", dec!(1));
        assert!(matches!(
            db.insert_wager(&bad_number),
            Err(SettlementError::InvalidNumber { .. })
        ));

        let zero_stake = NewWager::new(p, 1, 1, BetCategory::TwoDigitHigh, "12", dec!(0));
        assert!(matches!(
            db.insert_wager(&zero_stake),
            Err(SettlementError::InvalidWager(_))
        ));

        let stray_secondary = NewWager::new(p, 1, 1, BetCategory::TwoDigitHigh, "12", dec!(1))
            .with_secondary_stake(dec!(1));
        assert!(matches!(
            db.insert_wager(&stray_secondary),
            Err(SettlementError::InvalidWager(_))
        ));

        let combo = NewWager::new(p, 1, 1, BetCategory::ThreeDigitStraightAnyOrder, "123", dec!(1))
            .with_secondary_stake(dec!(2));
        let stored = db.insert_wager(&combo).unwrap();
        assert_eq!(stored.secondary_stake, Some(dec!(2)));
    }

    #[test]
    fn test_insert_bill_is_atomic() {
        let (db, _temp) = create_test_db();
        let p = period(&db);
        let lines = vec![
            NewWager::new(p, 1, 10, BetCategory::TwoDigitHigh, "12", dec!(1)),
            NewWager::new(p, 1, 10, BetCategory::TwoDigitHigh, "1", dec!(1)),
        ];
        assert!(db.insert_bill(&lines).is_err());
        assert!(db.wagers_in_scope(Some(p)).unwrap().is_empty());

        let stored = db.insert_bill(&lines[..1]).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(db.delete_bill(10).unwrap(), 1);
    }

    #[test]
    fn test_delete_bill_removes_its_outcomes() {
        use crate::models::{DrawNumbers, ResultStatus};
        use crate::settlement::SettlementService;

        let (db, _temp) = create_test_db();
        let p = period(&db);
        db.set_rate(BetCategory::TwoDigitHigh, dec!(70)).unwrap();
        db.insert_wager(&NewWager::new(p, 1, 20, BetCategory::TwoDigitHigh, "12", dec!(10)))
            .unwrap();
        db.insert_wager(&NewWager::new(p, 1, 21, BetCategory::TwoDigitHigh, "12", dec!(10)))
            .unwrap();
        let numbers = DrawNumbers {
            two_digit_high: Some("12".to_string()),
            ..Default::default()
        };
        db.upsert_result(p, &numbers, ResultStatus::Announced).unwrap();
        SettlementService::new(db.clone()).settle_and_persist(p).unwrap();
        assert_eq!(db.outcomes_for_period(p, None).unwrap().len(), 2);

        assert_eq!(db.delete_bill(20).unwrap(), 1);

        let remaining = db.outcomes_for_period(p, None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining.outcomes[0].bill_id, 21);
        assert_eq!(remaining.total_reward().unwrap(), dec!(700));
    }

    #[test]
    fn test_rates_round_trip_exactly() {
        let (db, _temp) = create_test_db();
        db.set_rate(BetCategory::RunningHigh, dec!(3.2)).unwrap();
        db.set_rate(BetCategory::RunningHigh, dec!(3.3)).unwrap();
        let rates = db.rates().unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].multiplier, dec!(3.3));
    }

    #[test]
    fn test_half_price_add_remove() {
        let (db, _temp) = create_test_db();
        let p = period(&db);
        db.add_half_price(p, BetCategory::ThreeDigitAnyOrder, "453").unwrap();
        db.add_half_price(p, BetCategory::ThreeDigitAnyOrder, "453").unwrap();
        assert_eq!(db.half_price_entries(p).unwrap().len(), 1);

        assert!(db.remove_half_price(p, BetCategory::ThreeDigitAnyOrder, "453").unwrap());
        assert!(!db.remove_half_price(p, BetCategory::ThreeDigitAnyOrder, "453").unwrap());
        assert!(db.add_half_price(p, BetCategory::ThreeDigitAnyOrder, "45").is_err());
    }

    #[test]
    fn test_agents_upsert() {
        let (db, _temp) = create_test_db();
        db.upsert_agent(&Agent {
            id: 1,
            name: "North".to_string(),
            income_share_percent: 10,
        })
        .unwrap();
        db.upsert_agent(&Agent {
            id: 1,
            name: "North".to_string(),
            income_share_percent: 15,
        })
        .unwrap();
        let agents = db.agents().unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].income_share_percent, 15);
        assert_eq!(db.agent(1).unwrap().unwrap().name, "North");
        assert!(db.agent(2).unwrap().is_none());

        let too_much = Agent {
            id: 2,
            name: "South".to_string(),
            income_share_percent: 101,
        };
        assert!(db.upsert_agent(&too_much).is_err());
    }
}
