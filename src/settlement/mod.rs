//! Settlement: periodically grades pending bets whose events have finished
//! and pays out (or refunds) their bankroll impact.

pub mod grading;
pub mod score_client;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::HealthState;
use crate::executor::transform;
use crate::storage::Store;
use crate::types::{Bet, BetResult};
use grading::Grade;
use score_client::ScoreClient;

const GRACE_PERIOD_HOURS: i64 = 1;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("could not resolve which team bet '{bet_id}' backed: {source}")]
    UnresolvedTeam { bet_id: uuid::Uuid, source: transform::TransformError },
}

pub struct Settlement {
    store: Arc<Store>,
    scores: ScoreClient,
    health: Arc<HealthState>,
}

impl Settlement {
    pub fn new(store: Arc<Store>, scores: ScoreClient, health: Arc<HealthState>) -> Self {
        Self { store, scores, health }
    }

    pub async fn run(&self, poll_interval: std::time::Duration, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(poll_interval);
        info!(?poll_interval, "settlement loop starting");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "settlement tick failed");
                    }
                    self.health.record_iteration().await;
                }
                _ = shutdown.changed() => {
                    info!("settlement loop shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// One settlement pass: find stale-enough pending bets, group by event,
    /// fetch each event's score once, and grade every bet on it.
    pub async fn tick(&self) -> anyhow::Result<()> {
        let pending = self.store.pending_bets_older_than(settlement_cutoff(Utc::now())).await?;
        if pending.is_empty() {
            return Ok(());
        }

        let mut by_event: HashMap<(String, String), Vec<Bet>> = HashMap::new();
        for bet in pending {
            by_event
                .entry((bet.event_id.clone(), bet.sport_key.clone()))
                .or_default()
                .push(bet);
        }

        for ((event_id, sport_key), bets) in by_event {
            if let Err(e) = self.settle_event(&event_id, &sport_key, bets).await {
                error!(event_id, sport_key, error = %e, "failed to settle event's pending bets");
            }
        }

        Ok(())
    }

    async fn settle_event(&self, event_id: &str, sport_key: &str, bets: Vec<Bet>) -> anyhow::Result<()> {
        let event = self
            .store
            .event(event_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("event {event_id} not on file"))?;

        let scores = self.scores.scores(sport_key, &[event_id.to_string()]).await?;
        let Some(score) = scores.into_iter().find(|s| s.id == event_id) else {
            warn!(event_id, "score feed returned no entry for event");
            return Ok(());
        };
        if !score.completed {
            return Ok(());
        }

        for bet in bets {
            if let Err(e) = self.settle_bet(&bet, &event, &score).await {
                warn!(bet_id = %bet.id, error = %e, "failed to settle bet");
            }
        }
        Ok(())
    }

    async fn settle_bet(&self, bet: &Bet, event: &crate::types::Event, score: &score_client::EventScore) -> anyhow::Result<()> {
        let grade = match self.grade_bet(bet, event, score) {
            Ok(grade) => grade,
            Err(e) => {
                warn!(bet_id = %bet.id, error = %e, "could not grade bet, voiding");
                Grade::Void
            }
        };

        let payout = grading::payout(bet, grade)?;
        let settled = self.store.settle_bet(bet.id, BetResult::from(grade), Some(payout)).await?;
        if !settled {
            // Already settled by a previous tick; nothing further to do.
            return Ok(());
        }

        if payout > rust_decimal::Decimal::ZERO {
            self.store.credit_bankroll(&bet.user_id, &bet.sport_key, payout).await?;
        }

        info!(bet_id = %bet.id, ?grade, %payout, "bet settled");
        Ok(())
    }

    fn grade_bet(&self, bet: &Bet, event: &crate::types::Event, score: &score_client::EventScore) -> Result<Grade, SettlementError> {
        if bet.market_key == "totals" {
            let home = score.score_for(&event.home_team).unwrap_or(0);
            let away = score.score_for(&event.away_team).unwrap_or(0);
            return Ok(grading::grade(bet, home, away));
        }

        let backed_team = transform::bet_team(&bet.outcome_name, event)
            .map_err(|source| SettlementError::UnresolvedTeam { bet_id: bet.id, source })?;
        let opponent = if backed_team == event.home_team { &event.away_team } else { &event.home_team };

        let team_score = score.score_for(&backed_team).unwrap_or(0);
        let opponent_score = score.score_for(opponent).unwrap_or(0);
        Ok(grading::grade(bet, team_score, opponent_score))
    }
}

/// Earliest timestamp a pending bet becomes eligible for settlement.
pub fn settlement_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - ChronoDuration::hours(GRACE_PERIOD_HOURS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutoff_is_one_hour_before_now() {
        let now = Utc::now();
        let cutoff = settlement_cutoff(now);
        assert_eq!((now - cutoff).num_hours(), 1);
    }
}
