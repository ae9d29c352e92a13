//! Core domain types shared by every service in this pipeline.
//!
//! All currency and probability values use `rust_decimal::Decimal`; floats are only
//! accepted at JSON deserialization boundaries and converted immediately via [`d`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Convert a boundary `f64` into a `Decimal`, mapping NaN/infinite inputs to zero
/// rather than panicking.
pub fn d(val: f64) -> Decimal {
    Decimal::from_f64(val).unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Upcoming,
    Live,
    Completed,
    Postponed,
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "upcoming" => Ok(Self::Upcoming),
            "live" => Ok(Self::Live),
            "completed" => Ok(Self::Completed),
            "postponed" => Ok(Self::Postponed),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Upcoming => "upcoming",
            Self::Live => "live",
            Self::Completed => "completed",
            Self::Postponed => "postponed",
        };
        write!(f, "{s}")
    }
}

/// A sporting event. Owned by the upstream odds ingester; the core only reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub sport_key: String,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub status: EventStatus,
}

// ---------------------------------------------------------------------------
// Odds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    TwoWay,
    ThreeWay,
    Props,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VigMethod {
    Multiplicative,
    Additive,
    None,
}

/// A single book's quote for one outcome of one market, as it arrives on
/// `odds.raw.{sport_key}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOdds {
    pub event_id: String,
    pub sport_key: String,
    pub market_key: String,
    pub book_key: String,
    pub outcome_name: String,
    pub point: Option<Decimal>,
    pub price: i32,
    pub vendor_last_update: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

impl RawOdds {
    /// Identity of the outcome this quote belongs to, ignoring the book.
    pub fn outcome_key(&self) -> (String, Option<Decimal>) {
        (self.outcome_name.clone(), self.point)
    }

    pub fn data_age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.received_at).num_seconds().max(0)
    }
}

/// `RawOdds` enriched with fair-value fields by the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedOdds {
    pub event_id: String,
    pub sport_key: String,
    pub market_key: String,
    pub book_key: String,
    pub outcome_name: String,
    pub point: Option<Decimal>,
    pub price: i32,
    pub vendor_last_update: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub decimal_odds: Decimal,
    pub implied_probability: Decimal,
    pub no_vig_probability: Option<Decimal>,
    pub fair_price: Option<i32>,
    pub edge: Option<Decimal>,
    pub sharp_consensus: Option<Decimal>,
    pub market_type: MarketType,
    pub vig_method: VigMethod,
    pub normalized_at: DateTime<Utc>,
    pub processing_latency_ms: i64,
}

impl NormalizedOdds {
    pub fn data_age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.received_at).num_seconds().max(0)
    }
}

// ---------------------------------------------------------------------------
// Opportunities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityType {
    Edge,
    Middle,
    Scalp,
}

impl fmt::Display for OpportunityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Edge => "edge",
            Self::Middle => "middle",
            Self::Scalp => "scalp",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpportunityLeg {
    pub book_key: String,
    pub outcome_name: String,
    pub price: i32,
    pub point: Option<Decimal>,
    pub leg_edge: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: Option<Uuid>,
    pub opportunity_type: OpportunityType,
    pub sport_key: String,
    pub event_id: String,
    pub market_key: String,
    pub edge_percent: Decimal,
    pub fair_price: Option<i32>,
    pub detected_at: DateTime<Utc>,
    pub data_age_seconds: i64,
    pub legs: Vec<OpportunityLeg>,
}

impl Opportunity {
    /// Sorted, deduplicated book keys across all legs — the basis of the alert dedup hash.
    pub fn sorted_book_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.legs.iter().map(|l| l.book_key.clone()).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetType {
    Straight,
    Middle,
    Scalp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetResult {
    Pending,
    Win,
    Loss,
    Push,
    Void,
}

impl fmt::Display for BetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Win => "win",
            Self::Loss => "loss",
            Self::Push => "push",
            Self::Void => "void",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bet {
    pub id: Uuid,
    pub user_id: String,
    pub opportunity_id: Option<Uuid>,
    pub sport_key: String,
    pub event_id: String,
    pub market_key: String,
    pub book_key: String,
    pub outcome_name: String,
    pub point: Option<Decimal>,
    pub bet_type: BetType,
    pub stake_amount: Decimal,
    pub bet_price: i32,
    pub placed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub result: BetResult,
    pub payout_amount: Option<Decimal>,
}

/// A captured closing line for one market outcome, produced upstream of this
/// pipeline. Matched against pending bets by `(market_key, book_key, outcome_name, point)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosingLine {
    pub event_id: String,
    pub market_key: String,
    pub book_key: String,
    pub outcome_name: String,
    pub point: Option<Decimal>,
    pub price: i32,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetPerformance {
    pub bet_id: Uuid,
    pub closing_line_price: i32,
    pub clv_cents: Decimal,
    pub hold_time_seconds: i64,
    pub recorded_at: DateTime<Utc>,
}

/// Per-user settings. The store is the single source of truth; bankroll updates must
/// be serialized against concurrent bet creation (see `executor`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: String,
    pub bankrolls: HashMap<String, Decimal>,
    pub kelly_fraction: Decimal,
    pub min_edge_threshold: Decimal,
    pub max_stake_pct: Decimal,
}

// ---------------------------------------------------------------------------
// Execution log (ambient — supplements the distilled bet/opportunity model)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    HealthCheck,
    BotCall,
    BankrollDebit,
    BetRecordCreation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub bet_id: Option<Uuid>,
    pub opportunity_id: Option<Uuid>,
    pub stage: ExecutionStage,
    pub status: ExecutionStatus,
    pub latency_ms: i64,
    pub error_message: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Shared error taxonomy
// ---------------------------------------------------------------------------

/// Errors shared by the normalizer, detection engine, and alert pipeline.
///
/// Error kinds map onto the propagation policy: malformed input is logged and acked,
/// never retried; transient I/O is retried by the caller; missing preconditions (no
/// sharp books, no opposite side) are not errors at all and are handled before this
/// type is ever constructed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed message on {stream}: {reason}")]
    MalformedInput { stream: String, reason: String },

    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    #[error("domain invariant violated: {0}")]
    Invariant(String),

    #[error("no sharp book data for sport {sport_key}")]
    NoSharpData { sport_key: String },

    #[error("not found: {0}")]
    NotFound(String),
}
