//! Closing-line value: once an event's closing lines are captured upstream,
//! compares them against every pending bet still open on that event and
//! records how much value was captured (or given up) at bet time.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::HealthState;
use crate::oddsmath::{self, OddsMathError};
use crate::storage::Store;
use crate::streambus::{streams, StreamBus, StreamMessage};
use crate::types::{Bet, BetPerformance, ClosingLine, PipelineError};

const GROUP: &str = "clv";

#[derive(Debug, Deserialize)]
struct ClosingLinesCaptured {
    event_id: String,
}

pub struct ClvCalculator {
    bus: Arc<StreamBus>,
    store: Arc<Store>,
    consumer_name: String,
    health: Arc<HealthState>,
}

impl ClvCalculator {
    pub fn new(bus: Arc<StreamBus>, store: Arc<Store>, consumer_name: String, health: Arc<HealthState>) -> Self {
        Self { bus, store, consumer_name, health }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let stream = streams::CLOSING_LINES_CAPTURED;
        self.bus.ensure_group(stream, GROUP).await?;
        info!(stream, "CLV calculator listening");

        loop {
            tokio::select! {
                result = self.bus.read_group(stream, GROUP, &self.consumer_name, 50, 2000) => {
                    let messages = result?;
                    let mut acked = Vec::with_capacity(messages.len());
                    for message in &messages {
                        match self.process(message).await {
                            Ok(()) => acked.push(message.id.clone()),
                            Err(PipelineError::MalformedInput { stream, reason }) => {
                                warn!(stream, reason, "dropping malformed closing-lines message");
                                acked.push(message.id.clone());
                            }
                            Err(e) => {
                                error!(error = %e, entry = %message.id, "CLV processing failed, leaving unacked for redelivery");
                            }
                        }
                    }
                    self.bus.ack(stream, GROUP, &acked).await?;
                    self.health.record_iteration().await;
                }
                _ = shutdown.changed() => {
                    info!("CLV calculator shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn process(&self, message: &StreamMessage) -> Result<(), PipelineError> {
        let captured: ClosingLinesCaptured = message.decode().map_err(|e| PipelineError::MalformedInput {
            stream: streams::CLOSING_LINES_CAPTURED.to_string(),
            reason: e.to_string(),
        })?;

        let closing_lines = self
            .store
            .closing_lines_for_event(&captured.event_id)
            .await
            .map_err(|e| PipelineError::TransientIo(e.to_string()))?;
        if closing_lines.is_empty() {
            debug!(event_id = %captured.event_id, "no closing lines on file yet");
            return Ok(());
        }

        let pending = self
            .store
            .pending_bets_for_event(&captured.event_id)
            .await
            .map_err(|e| PipelineError::TransientIo(e.to_string()))?;

        for bet in pending {
            let Some(line) = matching_line(&bet, &closing_lines) else {
                debug!(bet_id = %bet.id, event_id = %captured.event_id, "no matching closing line, skipping");
                continue;
            };

            match compute_performance(&bet, line) {
                Ok(perf) => {
                    if let Err(e) = self.store.upsert_bet_performance(&perf).await {
                        warn!(bet_id = %bet.id, error = %e, "failed to record bet performance");
                    }
                }
                Err(e) => warn!(bet_id = %bet.id, error = %e, "could not compute CLV for bet"),
            }
        }

        Ok(())
    }
}

/// Exact `(market, book, outcome, point)` match, treating two missing points
/// (both `None`) as matching.
fn matching_line<'a>(bet: &Bet, lines: &'a [ClosingLine]) -> Option<&'a ClosingLine> {
    lines.iter().find(|line| {
        line.market_key == bet.market_key
            && line.book_key == bet.book_key
            && line.outcome_name == bet.outcome_name
            && line.point == bet.point
    })
}

fn compute_performance(bet: &Bet, line: &ClosingLine) -> Result<BetPerformance, OddsMathError> {
    let bet_decimal = oddsmath::american_to_decimal(bet.bet_price)?;
    let close_decimal = oddsmath::american_to_decimal(line.price)?;

    let clv_cents = oddsmath::round_cents(
        (Decimal::ONE / close_decimal - Decimal::ONE / bet_decimal) * Decimal::from(100),
    );
    let hold_time_seconds = (line.captured_at - bet.placed_at).num_seconds();

    Ok(BetPerformance {
        bet_id: bet.id,
        closing_line_price: line.price,
        clv_cents,
        hold_time_seconds,
        recorded_at: chrono::Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn bet() -> Bet {
        Bet {
            id: Uuid::new_v4(),
            user_id: "user-1".into(),
            opportunity_id: None,
            sport_key: "basketball_nba".into(),
            event_id: "evt-1".into(),
            market_key: "h2h".into(),
            book_key: "draftkings".into(),
            outcome_name: "Lakers".into(),
            point: None,
            bet_type: crate::types::BetType::Straight,
            stake_amount: dec!(100),
            bet_price: 150,
            placed_at: Utc::now() - chrono::Duration::hours(2),
            settled_at: None,
            result: crate::types::BetResult::Pending,
            payout_amount: None,
        }
    }

    fn line(price: i32) -> ClosingLine {
        ClosingLine {
            event_id: "evt-1".into(),
            market_key: "h2h".into(),
            book_key: "draftkings".into(),
            outcome_name: "Lakers".into(),
            point: None,
            price,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn matching_line_requires_market_book_outcome_and_point() {
        let lines = vec![line(140)];
        assert!(matching_line(&bet(), &lines).is_some());
    }

    #[test]
    fn matching_line_skips_a_different_book() {
        let mut l = line(140);
        l.book_key = "fanduel".into();
        assert!(matching_line(&bet(), &[l]).is_none());
    }

    #[test]
    fn clv_is_positive_when_the_line_shortened() {
        // Bet at +150, closed at +120: the book moved in the bettor's favor.
        let perf = compute_performance(&bet(), &line(120)).unwrap();
        assert!(perf.clv_cents > Decimal::ZERO);
    }

    #[test]
    fn clv_is_negative_when_the_line_drifted_away() {
        // Bet at +150, closed at +180: the line drifted further, CLV is negative.
        let perf = compute_performance(&bet(), &line(180)).unwrap();
        assert!(perf.clv_cents < Decimal::ZERO);
    }

    #[test]
    fn hold_time_is_seconds_between_placed_and_captured() {
        let perf = compute_performance(&bet(), &line(120)).unwrap();
        assert!(perf.hold_time_seconds >= 7100 && perf.hold_time_seconds <= 7300);
    }
}
