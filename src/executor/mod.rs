//! Bet execution: resolve an opportunity, transform each leg into the bot
//! manager's vocabulary, health-check and place it, then atomically debit the
//! user's bankroll and record the bet. Legs are independent — one leg's failure
//! never aborts the others.

pub mod bot_client;
pub mod retry;
pub mod transform;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RetryConfig;
use crate::storage::Store;
use crate::types::{
    Bet, BetResult, BetType, Event, ExecutionLogEntry, ExecutionStage, ExecutionStatus, Opportunity,
    OpportunityType,
};
use bot_client::{BetRequest, BotManagerClient};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to transform leg: {0}")]
    TransformFailed(String),
    #[error("bot for {book_key} is unavailable")]
    BotUnavailable { book_key: String },
    #[error("bot placement failed after {attempts} attempts: {source}")]
    PlacementFailed { attempts: u32, source: String },
    #[error("insufficient bankroll: {0}")]
    InsufficientBankroll(String),
    #[error("no settings on file for user {0}")]
    UserSettingsMissing(String),
}

#[derive(Debug, Deserialize)]
pub struct RequestedLeg {
    pub book_key: String,
    pub outcome_name: String,
    pub stake: Decimal,
    pub expected_odds: i32,
}

#[derive(Debug, Deserialize)]
pub struct PlaceBetRequest {
    pub user_id: String,
    pub opportunity_id: Option<Uuid>,
    pub legs: Vec<RequestedLeg>,
    pub event_info: Option<Event>,
    pub opportunity: Option<Opportunity>,
}

#[derive(Debug, Serialize)]
pub struct LegResult {
    pub book_key: String,
    pub success: bool,
    pub bet_id: Option<Uuid>,
    pub ticket_number: Option<String>,
    pub latency_ms: i64,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlaceBetResponse {
    pub success: bool,
    pub results: Vec<LegResult>,
}

pub struct Executor {
    store: Arc<Store>,
    bot: BotManagerClient,
    retry_config: RetryConfig,
}

impl Executor {
    pub fn new(store: Arc<Store>, bot: BotManagerClient, retry_config: RetryConfig) -> Self {
        Self { store, bot, retry_config }
    }

    pub async fn place_bet(&self, request: PlaceBetRequest) -> Result<PlaceBetResponse, ExecutorError> {
        let opportunity = self.resolve_opportunity(&request).await?;
        let event = self.resolve_event(&request, &opportunity).await?;

        self.store
            .user_settings(&request.user_id)
            .await
            .map_err(|e| ExecutorError::TransformFailed(e.to_string()))?
            .ok_or_else(|| ExecutorError::UserSettingsMissing(request.user_id.clone()))?;

        let mut results = Vec::with_capacity(request.legs.len());
        for leg in &request.legs {
            let started = Instant::now();
            let outcome = self.execute_leg(&request.user_id, &opportunity, &event, leg).await;
            let latency_ms = started.elapsed().as_millis() as i64;

            results.push(match outcome {
                Ok((bet_id, ticket_number)) => LegResult {
                    book_key: leg.book_key.clone(),
                    success: true,
                    bet_id: Some(bet_id),
                    ticket_number,
                    latency_ms,
                    error: None,
                },
                Err(e) => {
                    warn!(book_key = %leg.book_key, error = %e, "leg execution failed");
                    LegResult {
                        book_key: leg.book_key.clone(),
                        success: false,
                        bet_id: None,
                        ticket_number: None,
                        latency_ms,
                        error: Some(e.to_string()),
                    }
                }
            });
        }

        let success = !results.is_empty() && results.iter().all(|r| r.success);
        Ok(PlaceBetResponse { success, results })
    }

    async fn resolve_opportunity(&self, request: &PlaceBetRequest) -> Result<Opportunity, ExecutorError> {
        if let Some(opportunity) = &request.opportunity {
            return Ok(opportunity.clone());
        }
        let opportunity_id = request
            .opportunity_id
            .ok_or_else(|| ExecutorError::TransformFailed("no opportunity or opportunity_id supplied".into()))?;

        self.store
            .opportunity(opportunity_id)
            .await
            .map_err(|e| ExecutorError::TransformFailed(e.to_string()))?
            .ok_or_else(|| ExecutorError::TransformFailed(format!("opportunity {opportunity_id} not found")))
    }

    async fn resolve_event(&self, request: &PlaceBetRequest, opportunity: &Opportunity) -> Result<Event, ExecutorError> {
        if let Some(event) = &request.event_info {
            return Ok(event.clone());
        }
        self.store
            .event(&opportunity.event_id)
            .await
            .map_err(|e| ExecutorError::TransformFailed(e.to_string()))?
            .ok_or_else(|| ExecutorError::TransformFailed(format!("event {} not found", opportunity.event_id)))
    }

    async fn execute_leg(
        &self,
        user_id: &str,
        opportunity: &Opportunity,
        event: &Event,
        leg: &RequestedLeg,
    ) -> Result<(Uuid, Option<String>), ExecutorError> {
        let bet_team = transform::bet_team(&leg.outcome_name, event)
            .map_err(|e| ExecutorError::TransformFailed(e.to_string()))?;
        let bet_type_vocab = transform::bet_type(&opportunity.market_key, &leg.outcome_name)
            .map_err(|e| ExecutorError::TransformFailed(e.to_string()))?;
        let sport = transform::sport_vocabulary(&opportunity.sport_key);
        let opportunity_label = opportunity.id.map(|id| id.to_string()).unwrap_or_else(|| "adhoc".to_string());
        let request_id = transform::request_id(&opportunity_label, Utc::now().timestamp(), &leg.book_key);

        let healthy = self.bot.is_healthy(&leg.book_key).await.unwrap_or(false);
        self.log(None, opportunity.id, ExecutionStage::HealthCheck, healthy, None).await;
        if !healthy {
            return Err(ExecutorError::BotUnavailable { book_key: leg.book_key.clone() });
        }

        let bet_request = BetRequest {
            book: leg.book_key.clone(),
            team1: event.home_team.clone(),
            team2: event.away_team.clone(),
            bet_team,
            bet_type: bet_type_vocab.to_string(),
            bet_period: "game".to_string(),
            bet_amount: leg.stake,
            bet_odds: leg.expected_odds,
            sport,
            request_id,
        };

        let placement = retry::retry(&self.retry_config, |_attempt| self.bot.place_bet(&bet_request)).await;
        let placement = match placement {
            Ok(resp) => {
                self.log(None, opportunity.id, ExecutionStage::BotCall, true, None).await;
                resp
            }
            Err(e) => {
                self.log(None, opportunity.id, ExecutionStage::BotCall, false, Some(e.to_string())).await;
                return Err(ExecutorError::PlacementFailed {
                    attempts: self.retry_config.max_attempts,
                    source: e.to_string(),
                });
            }
        };

        let bet = Bet {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            opportunity_id: opportunity.id,
            sport_key: opportunity.sport_key.clone(),
            event_id: opportunity.event_id.clone(),
            market_key: opportunity.market_key.clone(),
            book_key: leg.book_key.clone(),
            outcome_name: leg.outcome_name.clone(),
            point: resolve_point(opportunity, &leg.book_key, &leg.outcome_name),
            bet_type: bet_type_for(opportunity.opportunity_type),
            stake_amount: leg.stake,
            bet_price: leg.expected_odds,
            placed_at: Utc::now(),
            settled_at: None,
            result: BetResult::Pending,
            payout_amount: None,
        };

        match self.store.debit_bankroll_and_place_bet(&bet).await {
            Ok(()) => {
                self.log(Some(bet.id), opportunity.id, ExecutionStage::BankrollDebit, true, None).await;
                info!(bet_id = %bet.id, book_key = %leg.book_key, "bet recorded");
                Ok((bet.id, placement.bet_details.and_then(|d| d.ticket_number)))
            }
            Err(e) => {
                // The bot already accepted the bet; this failure is a reconciliation
                // problem for the operator, not something to roll back externally.
                error!(error = %e, book_key = %leg.book_key, "bankroll debit / bet insert failed after bot accepted the bet");
                self.log(None, opportunity.id, ExecutionStage::BankrollDebit, false, Some(e.to_string())).await;
                if e.to_string().contains("insufficient bankroll") {
                    Err(ExecutorError::InsufficientBankroll(e.to_string()))
                } else {
                    Err(ExecutorError::TransformFailed(e.to_string()))
                }
            }
        }
    }

    async fn log(&self, bet_id: Option<Uuid>, opportunity_id: Option<Uuid>, stage: ExecutionStage, ok: bool, error_message: Option<String>) {
        let entry = ExecutionLogEntry {
            bet_id,
            opportunity_id,
            stage,
            status: if ok { ExecutionStatus::Ok } else { ExecutionStatus::Error },
            latency_ms: 0,
            error_message,
            recorded_at: Utc::now(),
        };
        if let Err(e) = self.store.insert_execution_log(&entry).await {
            warn!(error = %e, "failed to record execution log entry");
        }
    }
}

/// Spread/total bets carry a point; it lives on the resolved opportunity's leg,
/// never on the caller's request, so settlement grading always has one to grade against.
fn resolve_point(opportunity: &Opportunity, book_key: &str, outcome_name: &str) -> Option<Decimal> {
    opportunity
        .legs
        .iter()
        .find(|leg| leg.book_key == book_key && leg.outcome_name == outcome_name)
        .and_then(|leg| leg.point)
}

fn bet_type_for(opportunity_type: OpportunityType) -> BetType {
    match opportunity_type {
        OpportunityType::Edge => BetType::Straight,
        OpportunityType::Middle => BetType::Middle,
        OpportunityType::Scalp => BetType::Scalp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpportunityLeg;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn opportunity_with_legs(legs: Vec<OpportunityLeg>) -> Opportunity {
        Opportunity {
            id: None,
            opportunity_type: OpportunityType::Middle,
            sport_key: "basketball_nba".into(),
            event_id: "evt-1".into(),
            market_key: "totals".into(),
            edge_percent: dec!(2.0),
            fair_price: None,
            detected_at: Utc::now(),
            data_age_seconds: 0,
            legs,
        }
    }

    #[test]
    fn resolve_point_finds_matching_leg() {
        let opportunity = opportunity_with_legs(vec![
            OpportunityLeg { book_key: "pinnacle".into(), outcome_name: "Over".into(), price: -110, point: Some(dec!(220.5)), leg_edge: None },
            OpportunityLeg { book_key: "draftkings".into(), outcome_name: "Under".into(), price: -110, point: Some(dec!(220.5)), leg_edge: None },
        ]);
        assert_eq!(resolve_point(&opportunity, "draftkings", "Under"), Some(dec!(220.5)));
    }

    #[test]
    fn resolve_point_is_none_for_moneylines_without_a_point() {
        let opportunity = opportunity_with_legs(vec![OpportunityLeg {
            book_key: "pinnacle".into(),
            outcome_name: "Lakers".into(),
            price: 120,
            point: None,
            leg_edge: None,
        }]);
        assert_eq!(resolve_point(&opportunity, "pinnacle", "Lakers"), None);
    }

    #[test]
    fn resolve_point_is_none_when_no_leg_matches() {
        let opportunity = opportunity_with_legs(vec![OpportunityLeg {
            book_key: "pinnacle".into(),
            outcome_name: "Over".into(),
            price: -110,
            point: Some(dec!(220.5)),
            leg_edge: None,
        }]);
        assert_eq!(resolve_point(&opportunity, "draftkings", "Under"), None);
    }
}
