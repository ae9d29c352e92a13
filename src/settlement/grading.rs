//! Pure per-market grading rules. Kept free of store/network access so each
//! rule can be tested directly against a bet and a final score.

use rust_decimal::Decimal;

use crate::oddsmath::{self, OddsMathError};
use crate::types::{Bet, BetResult};

/// Outcome of grading one bet against a completed event's final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Win,
    Loss,
    Push,
    Void,
}

impl From<Grade> for BetResult {
    fn from(g: Grade) -> Self {
        match g {
            Grade::Win => BetResult::Win,
            Grade::Loss => BetResult::Loss,
            Grade::Push => BetResult::Push,
            Grade::Void => BetResult::Void,
        }
    }
}

/// Grade `bet` given the final score of the team/side it backed (`team_score`)
/// and the opponent's final score (`opponent_score`). Unknown markets void.
pub fn grade(bet: &Bet, team_score: i64, opponent_score: i64) -> Grade {
    match bet.market_key.as_str() {
        "h2h" => grade_moneyline(team_score, opponent_score),
        "spreads" => grade_spread(bet, team_score, opponent_score),
        "totals" => grade_total(bet, team_score, opponent_score),
        _ => Grade::Void,
    }
}

fn grade_moneyline(team_score: i64, opponent_score: i64) -> Grade {
    match team_score.cmp(&opponent_score) {
        std::cmp::Ordering::Greater => Grade::Win,
        std::cmp::Ordering::Equal => Grade::Push,
        std::cmp::Ordering::Less => Grade::Loss,
    }
}

fn grade_spread(bet: &Bet, team_score: i64, opponent_score: i64) -> Grade {
    let Some(point) = bet.point else { return Grade::Void };
    let adjusted = Decimal::from(team_score) + point;
    let opponent = Decimal::from(opponent_score);

    if adjusted > opponent {
        Grade::Win
    } else if adjusted == opponent {
        Grade::Push
    } else {
        Grade::Loss
    }
}

fn grade_total(bet: &Bet, home_score: i64, away_score: i64) -> Grade {
    let Some(point) = bet.point else { return Grade::Void };
    let combined = Decimal::from(home_score + away_score);
    let is_over = bet.outcome_name.to_lowercase().contains("over");

    if combined == point {
        return Grade::Push;
    }
    let side_wins = if is_over { combined > point } else { combined < point };
    if side_wins { Grade::Win } else { Grade::Loss }
}

/// Payout for a graded bet: stake times decimal odds on a win, the stake back
/// on a push/void, nothing on a loss.
pub fn payout(bet: &Bet, grade: Grade) -> Result<Decimal, OddsMathError> {
    match grade {
        Grade::Win => {
            let decimal_odds = oddsmath::american_to_decimal(bet.bet_price)?;
            Ok(oddsmath::round_cents(bet.stake_amount * decimal_odds))
        }
        Grade::Loss => Ok(Decimal::ZERO),
        Grade::Push | Grade::Void => Ok(bet.stake_amount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn bet(market_key: &str, outcome_name: &str, point: Option<Decimal>, bet_price: i32) -> Bet {
        Bet {
            id: Uuid::new_v4(),
            user_id: "user-1".into(),
            opportunity_id: None,
            sport_key: "basketball_nba".into(),
            event_id: "evt-1".into(),
            market_key: market_key.into(),
            book_key: "draftkings".into(),
            outcome_name: outcome_name.into(),
            point,
            bet_type: crate::types::BetType::Straight,
            stake_amount: dec!(100),
            bet_price,
            placed_at: Utc::now(),
            settled_at: None,
            result: BetResult::Pending,
            payout_amount: None,
        }
    }

    #[test]
    fn moneyline_higher_score_wins() {
        let b = bet("h2h", "Lakers", None, 120);
        assert_eq!(grade(&b, 110, 100), Grade::Win);
        assert_eq!(grade(&b, 100, 110), Grade::Loss);
        assert_eq!(grade(&b, 100, 100), Grade::Push);
    }

    #[test]
    fn spread_adds_point_before_comparing() {
        let b = bet("spreads", "Lakers", Some(dec!(-5.5)), -110);
        assert_eq!(grade(&b, 110, 100), Grade::Win);
        assert_eq!(grade(&b, 104, 100), Grade::Loss);
    }

    #[test]
    fn spread_can_push_on_whole_point() {
        let b = bet("spreads", "Lakers", Some(dec!(-5)), -110);
        assert_eq!(grade(&b, 105, 100), Grade::Push);
    }

    #[test]
    fn total_over_wins_above_the_line() {
        let b = bet("totals", "Over", Some(dec!(210.5)), -110);
        assert_eq!(grade(&b, 110, 105), Grade::Win);
        assert_eq!(grade(&b, 100, 100), Grade::Loss);
    }

    #[test]
    fn total_under_is_the_mirror_of_over() {
        let b = bet("totals", "Under", Some(dec!(210.5)), -110);
        assert_eq!(grade(&b, 100, 100), Grade::Win);
        assert_eq!(grade(&b, 110, 105), Grade::Loss);
    }

    #[test]
    fn unknown_market_voids() {
        let b = bet("player_props", "Over 25.5", Some(dec!(25.5)), -110);
        assert_eq!(grade(&b, 30, 20), Grade::Void);
    }

    #[test]
    fn payout_multiplies_stake_by_decimal_odds_on_win() {
        let b = bet("h2h", "Lakers", None, 120);
        assert_eq!(payout(&b, Grade::Win).unwrap(), dec!(220));
    }

    #[test]
    fn payout_returns_stake_on_push() {
        let b = bet("h2h", "Lakers", None, 120);
        assert_eq!(payout(&b, Grade::Push).unwrap(), dec!(100));
    }

    #[test]
    fn payout_is_zero_on_loss() {
        let b = bet("h2h", "Lakers", None, -110);
        assert_eq!(payout(&b, Grade::Loss).unwrap(), Decimal::ZERO);
    }
}
