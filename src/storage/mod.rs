//! Persistence layer.
//!
//! Every stage reads and writes through `Store`, a thin wrapper over a `PgPool`.
//! Bankroll debits and bet creation happen inside a single serializable
//! transaction so two concurrent executor calls can never double-spend the
//! same bankroll.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::types::{
    Bet, BetPerformance, BetResult, BetType, ClosingLine, Event, ExecutionLogEntry, ExecutionStage,
    ExecutionStatus, Opportunity, OpportunityLeg, OpportunityType, UserSettings,
};

pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect_with_retry(database_url: &str, max_retries: u32) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match PgPoolOptions::new()
                .max_connections(25)
                .min_connections(5)
                .max_lifetime(StdDuration::from_secs(5 * 60))
                .connect(database_url)
                .await
            {
                Ok(pool) => {
                    info!("connected to postgres store");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries {
                        return Err(anyhow!(
                            "failed to connect to postgres after {attempt} attempts: {e}"
                        ));
                    }
                    warn!(attempt, error = %e, "postgres connection attempt failed, retrying");
                    tokio::time::sleep(StdDuration::from_secs(2u64.pow(attempt))).await;
                }
            }
        }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./db/migrations")
            .run(&self.pool)
            .await
            .context("failed to run database migrations")
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -- Events ------------------------------------------------------------

    pub async fn upsert_event(&self, event: &Event) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (event_id, sport_key, home_team, away_team, commence_time, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (event_id) DO UPDATE SET
                status = EXCLUDED.status,
                commence_time = EXCLUDED.commence_time
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.sport_key)
        .bind(&event.home_team)
        .bind(&event.away_team)
        .bind(event.commence_time)
        .bind(event.status.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn event(&self, event_id: &str) -> Result<Option<Event>> {
        let row = sqlx::query(
            "SELECT event_id, sport_key, home_team, away_team, commence_time, status FROM events WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let status: String = row.get("status");
        Ok(Some(Event {
            event_id: row.get("event_id"),
            sport_key: row.get("sport_key"),
            home_team: row.get("home_team"),
            away_team: row.get("away_team"),
            commence_time: row.get("commence_time"),
            status: status.parse().map_err(|e: String| anyhow!(e))?,
        }))
    }

    // -- Sharp book resolution (component 4) --------------------------------

    /// Operator-managed override for whether `book_key` counts as sharp for `sport_key`.
    /// `None` means "no override on file" — the caller falls back to its static default list.
    pub async fn sharp_book_flag(&self, sport_key: &str, book_key: &str) -> Result<Option<bool>> {
        let row = sqlx::query("SELECT is_sharp FROM sharp_book_flags WHERE sport_key = $1 AND book_key = $2")
            .bind(sport_key)
            .bind(book_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<bool, _>("is_sharp")))
    }

    /// Every operator override on file for `sport_key`, keyed by book key.
    pub async fn sharp_book_flags_for_sport(&self, sport_key: &str) -> Result<HashMap<String, bool>> {
        let rows = sqlx::query("SELECT book_key, is_sharp FROM sharp_book_flags WHERE sport_key = $1")
            .bind(sport_key)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("book_key"), r.get::<bool, _>("is_sharp")))
            .collect())
    }

    // -- Opportunities -------------------------------------------------------

    /// Insert an opportunity and its legs in one transaction, returning the generated id.
    pub async fn insert_opportunity(&self, opportunity: &Opportunity) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO opportunities
                (id, opportunity_type, sport_key, event_id, market_key, edge_percent,
                 fair_price, detected_at, data_age_seconds)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(id)
        .bind(opportunity.opportunity_type.to_string())
        .bind(&opportunity.sport_key)
        .bind(&opportunity.event_id)
        .bind(&opportunity.market_key)
        .bind(opportunity.edge_percent)
        .bind(opportunity.fair_price)
        .bind(opportunity.detected_at)
        .bind(opportunity.data_age_seconds)
        .execute(&mut *tx)
        .await?;

        for leg in &opportunity.legs {
            sqlx::query(
                r#"
                INSERT INTO opportunity_legs
                    (opportunity_id, book_key, outcome_name, price, point, leg_edge)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(id)
            .bind(&leg.book_key)
            .bind(&leg.outcome_name)
            .bind(leg.price)
            .bind(leg.point)
            .bind(leg.leg_edge)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    pub async fn opportunity_legs(&self, opportunity_id: Uuid) -> Result<Vec<OpportunityLeg>> {
        let rows = sqlx::query(
            "SELECT book_key, outcome_name, price, point, leg_edge FROM opportunity_legs WHERE opportunity_id = $1",
        )
        .bind(opportunity_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OpportunityLeg {
                book_key: row.get("book_key"),
                outcome_name: row.get("outcome_name"),
                price: row.get("price"),
                point: row.get("point"),
                leg_edge: row.get("leg_edge"),
            })
            .collect())
    }

    pub async fn opportunity(&self, opportunity_id: Uuid) -> Result<Option<Opportunity>> {
        let row = sqlx::query(
            r#"
            SELECT opportunity_type, sport_key, event_id, market_key, edge_percent,
                   fair_price, detected_at, data_age_seconds
            FROM opportunities WHERE id = $1
            "#,
        )
        .bind(opportunity_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let legs = self.opportunity_legs(opportunity_id).await?;
        let opportunity_type: String = row.get("opportunity_type");

        Ok(Some(Opportunity {
            id: Some(opportunity_id),
            opportunity_type: parse_opportunity_type(&opportunity_type)?,
            sport_key: row.get("sport_key"),
            event_id: row.get("event_id"),
            market_key: row.get("market_key"),
            edge_percent: row.get("edge_percent"),
            fair_price: row.get("fair_price"),
            detected_at: row.get("detected_at"),
            data_age_seconds: row.get("data_age_seconds"),
            legs,
        }))
    }

    // -- User settings / bankroll --------------------------------------------

    pub async fn user_settings(&self, user_id: &str) -> Result<Option<UserSettings>> {
        let row = sqlx::query(
            "SELECT kelly_fraction, min_edge_threshold, max_stake_pct FROM user_settings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let bankroll_rows = sqlx::query("SELECT sport_key, amount FROM bankrolls WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        let mut bankrolls = HashMap::new();
        for r in bankroll_rows {
            bankrolls.insert(r.get::<String, _>("sport_key"), r.get::<Decimal, _>("amount"));
        }

        Ok(Some(UserSettings {
            user_id: user_id.to_string(),
            bankrolls,
            kelly_fraction: row.get("kelly_fraction"),
            min_edge_threshold: row.get("min_edge_threshold"),
            max_stake_pct: row.get("max_stake_pct"),
        }))
    }

    /// Debit `bet.user_id`'s `sport_key` bankroll and insert the bet atomically under
    /// `SERIALIZABLE` isolation, so a racing debit can never overdraw the balance.
    pub async fn debit_bankroll_and_place_bet(&self, bet: &Bet) -> Result<()> {
        let user_id = bet.user_id.as_str();
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let balance: Option<Decimal> = sqlx::query_scalar(
            "SELECT amount FROM bankrolls WHERE user_id = $1 AND sport_key = $2 FOR UPDATE",
        )
        .bind(user_id)
        .bind(&bet.sport_key)
        .fetch_optional(&mut *tx)
        .await?;

        let balance = balance.ok_or_else(|| {
            anyhow!("no bankroll on file for user {user_id} sport {}", bet.sport_key)
        })?;

        if balance < bet.stake_amount {
            return Err(anyhow!(
                "insufficient bankroll: have {balance}, need {}",
                bet.stake_amount
            ));
        }

        sqlx::query("UPDATE bankrolls SET amount = amount - $1 WHERE user_id = $2 AND sport_key = $3")
            .bind(bet.stake_amount)
            .bind(user_id)
            .bind(&bet.sport_key)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO bets
                (id, user_id, opportunity_id, sport_key, event_id, market_key, book_key, outcome_name,
                 point, bet_type, stake_amount, bet_price, placed_at, result)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'pending')
            "#,
        )
        .bind(bet.id)
        .bind(&bet.user_id)
        .bind(bet.opportunity_id)
        .bind(&bet.sport_key)
        .bind(&bet.event_id)
        .bind(&bet.market_key)
        .bind(&bet.book_key)
        .bind(&bet.outcome_name)
        .bind(bet.point)
        .bind(bet_type_str(bet.bet_type))
        .bind(bet.stake_amount)
        .bind(bet.bet_price)
        .bind(bet.placed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn insert_execution_log(&self, entry: &ExecutionLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO execution_log
                (bet_id, opportunity_id, stage, status, latency_ms, error_message, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.bet_id)
        .bind(entry.opportunity_id)
        .bind(execution_stage_str(entry.stage))
        .bind(execution_status_str(entry.status))
        .bind(entry.latency_ms)
        .bind(&entry.error_message)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -- Settlement ------------------------------------------------------------

    pub async fn pending_bets_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Bet>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, opportunity_id, sport_key, event_id, market_key, book_key, outcome_name,
                   point, bet_type, stake_amount, bet_price, placed_at, settled_at, result, payout_amount
            FROM bets
            WHERE result = 'pending' AND placed_at < $1
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_bet).collect()
    }

    pub async fn pending_bets_for_event(&self, event_id: &str) -> Result<Vec<Bet>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, opportunity_id, sport_key, event_id, market_key, book_key, outcome_name,
                   point, bet_type, stake_amount, bet_price, placed_at, settled_at, result, payout_amount
            FROM bets
            WHERE result = 'pending' AND event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_bet).collect()
    }


    /// Idempotent: only rows still `result = 'pending'` are updated, so replaying a
    /// settlement tick after a crash never double-settles a bet.
    pub async fn settle_bet(&self, bet_id: Uuid, result: BetResult, payout: Option<Decimal>) -> Result<bool> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE bets SET result = $1, payout_amount = $2, settled_at = now()
            WHERE id = $3 AND result = 'pending'
            "#,
        )
        .bind(result.to_string())
        .bind(payout)
        .bind(bet_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(rows_affected > 0)
    }

    pub async fn credit_bankroll(&self, user_id: &str, sport_key: &str, amount: Decimal) -> Result<()> {
        sqlx::query("UPDATE bankrolls SET amount = amount + $1 WHERE user_id = $2 AND sport_key = $3")
            .bind(amount)
            .bind(user_id)
            .bind(sport_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- CLV ---------------------------------------------------------------

    pub async fn closing_lines_for_event(&self, event_id: &str) -> Result<Vec<ClosingLine>> {
        let rows = sqlx::query(
            "SELECT event_id, market_key, book_key, outcome_name, point, price, captured_at \
             FROM closing_lines WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| ClosingLine {
                event_id: row.get("event_id"),
                market_key: row.get("market_key"),
                book_key: row.get("book_key"),
                outcome_name: row.get("outcome_name"),
                point: row.get("point"),
                price: row.get("price"),
                captured_at: row.get("captured_at"),
            })
            .collect())
    }

    pub async fn upsert_bet_performance(&self, perf: &BetPerformance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bet_performance (bet_id, closing_line_price, clv_cents, hold_time_seconds, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (bet_id) DO UPDATE SET
                closing_line_price = EXCLUDED.closing_line_price,
                clv_cents = EXCLUDED.clv_cents,
                hold_time_seconds = EXCLUDED.hold_time_seconds,
                recorded_at = EXCLUDED.recorded_at
            "#,
        )
        .bind(perf.bet_id)
        .bind(perf.closing_line_price)
        .bind(perf.clv_cents)
        .bind(perf.hold_time_seconds)
        .bind(perf.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn bet_type_str(bet_type: BetType) -> &'static str {
    match bet_type {
        BetType::Straight => "straight",
        BetType::Middle => "middle",
        BetType::Scalp => "scalp",
    }
}

fn execution_stage_str(stage: ExecutionStage) -> &'static str {
    match stage {
        ExecutionStage::HealthCheck => "health_check",
        ExecutionStage::BotCall => "bot_call",
        ExecutionStage::BankrollDebit => "bankroll_debit",
        ExecutionStage::BetRecordCreation => "bet_record_creation",
    }
}

fn execution_status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Ok => "ok",
        ExecutionStatus::Error => "error",
    }
}

fn parse_opportunity_type(s: &str) -> Result<OpportunityType> {
    match s {
        "edge" => Ok(OpportunityType::Edge),
        "middle" => Ok(OpportunityType::Middle),
        "scalp" => Ok(OpportunityType::Scalp),
        other => Err(anyhow!("unknown opportunity_type in store: {other}")),
    }
}

fn parse_bet_type(s: &str) -> Result<BetType> {
    match s {
        "straight" => Ok(BetType::Straight),
        "middle" => Ok(BetType::Middle),
        "scalp" => Ok(BetType::Scalp),
        other => Err(anyhow!("unknown bet_type in store: {other}")),
    }
}

fn parse_bet_result(s: &str) -> Result<BetResult> {
    match s {
        "pending" => Ok(BetResult::Pending),
        "win" => Ok(BetResult::Win),
        "loss" => Ok(BetResult::Loss),
        "push" => Ok(BetResult::Push),
        "void" => Ok(BetResult::Void),
        other => Err(anyhow!("unknown bet result in store: {other}")),
    }
}

fn row_to_bet(row: sqlx::postgres::PgRow) -> Result<Bet> {
    let bet_type: String = row.get("bet_type");
    let result: String = row.get("result");
    Ok(Bet {
        id: row.get("id"),
        user_id: row.get("user_id"),
        opportunity_id: row.get("opportunity_id"),
        sport_key: row.get("sport_key"),
        event_id: row.get("event_id"),
        market_key: row.get("market_key"),
        book_key: row.get("book_key"),
        outcome_name: row.get("outcome_name"),
        point: row.get("point"),
        bet_type: parse_bet_type(&bet_type)?,
        stake_amount: row.get("stake_amount"),
        bet_price: row.get("bet_price"),
        placed_at: row.get("placed_at"),
        settled_at: row.get("settled_at"),
        result: parse_bet_result(&result)?,
        payout_amount: row.get("payout_amount"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bet_type_round_trips_through_str() {
        for bt in [BetType::Straight, BetType::Middle, BetType::Scalp] {
            let s = bet_type_str(bt);
            assert_eq!(parse_bet_type(s).unwrap(), bt);
        }
    }

    #[test]
    fn bet_result_round_trips_through_str() {
        for r in [BetResult::Pending, BetResult::Win, BetResult::Loss, BetResult::Push, BetResult::Void] {
            assert_eq!(parse_bet_result(&r.to_string()).unwrap(), r);
        }
    }

    #[test]
    fn opportunity_type_round_trips_through_str() {
        for ot in [OpportunityType::Edge, OpportunityType::Middle, OpportunityType::Scalp] {
            assert_eq!(parse_opportunity_type(&ot.to_string()).unwrap(), ot);
        }
    }

    #[test]
    fn parse_bet_type_rejects_unknown() {
        assert!(parse_bet_type("parlay").is_err());
    }
}
