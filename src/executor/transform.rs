//! Translates a pipeline-native bet leg into the bot manager's request vocabulary.

use thiserror::Error;

use crate::textmatch;
use crate::types::Event;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("outcome '{0}' does not fuzzy-match either team in the event")]
    UnresolvedTeam(String),
    #[error("unsupported market key: {0}")]
    UnsupportedMarket(String),
}

/// `bet_team` is whichever of the event's two team names the leg's outcome name
/// fuzzy-matches best; short/abbreviated book-side vocabularies are not modeled here
/// since this pipeline's event record only carries full team names.
pub fn bet_team(outcome_name: &str, event: &Event) -> Result<String, TransformError> {
    let candidates = [event.home_team.as_str(), event.away_team.as_str()];
    textmatch::best_match(outcome_name, &candidates, 0.2)
        .map(|s| s.to_string())
        .ok_or_else(|| TransformError::UnresolvedTeam(outcome_name.to_string()))
}

/// `market_key` + `outcome_name` -> the bot manager's `bet_type` vocabulary.
pub fn bet_type(market_key: &str, outcome_name: &str) -> Result<&'static str, TransformError> {
    match market_key {
        "h2h" => Ok("moneyline"),
        "spreads" => Ok("spread"),
        "totals" => {
            if outcome_name.to_lowercase().contains("under") {
                Ok("total_under")
            } else {
                Ok("total_over")
            }
        }
        other => Err(TransformError::UnsupportedMarket(other.to_string())),
    }
}

/// The book's sport vocabulary, derived from this pipeline's `sport_key` convention
/// (`{sport}_{league}`, e.g. `basketball_nba`) by taking the leading segment — bot
/// managers in this ecosystem key bets by the coarse sport, not the league.
pub fn sport_vocabulary(sport_key: &str) -> String {
    sport_key.split('_').next().unwrap_or(sport_key).to_string()
}

pub fn request_id(opportunity_id: &str, unix_timestamp: i64, book_key: &str) -> String {
    format!("fortuna_{opportunity_id}_{unix_timestamp}_{book_key}")
}
