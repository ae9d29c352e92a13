//! Scalp detection: guaranteed-profit arbitrage across books quoting the
//! opposite sides of a market tight enough that the implied probabilities sum
//! to less than one. Two-outcome markets pair quotes across books; three-outcome
//! markets (e.g. soccer moneyline with a draw) take the full three-way cartesian
//! product, since a true arbitrage there requires covering all three outcomes.

use std::collections::HashSet;

use rust_decimal::Decimal;

use crate::oddsmath::arbitrage;
use crate::types::{NormalizedOdds, Opportunity, OpportunityLeg, OpportunityType};

pub fn detect(quotes: &[NormalizedOdds], min_edge_pct: Decimal) -> Vec<Opportunity> {
    let distinct_outcomes: HashSet<&str> = quotes.iter().map(|q| q.outcome_name.as_str()).collect();

    if distinct_outcomes.len() >= 3 {
        detect_three_way(quotes, min_edge_pct)
    } else {
        detect_two_way(quotes, min_edge_pct)
    }
}

fn detect_two_way(quotes: &[NormalizedOdds], min_edge_pct: Decimal) -> Vec<Opportunity> {
    let mut found = Vec::new();

    for (i, a) in quotes.iter().enumerate() {
        for b in quotes.iter().skip(i + 1) {
            if a.book_key == b.book_key || a.outcome_name == b.outcome_name || a.point != b.point {
                continue;
            }

            let result = arbitrage(&[a.decimal_odds, b.decimal_odds]);
            if !result.is_arbitrage {
                continue;
            }

            let edge_percent = (Decimal::ONE - result.implied_sum) * Decimal::from(100);
            if edge_percent < min_edge_pct {
                continue;
            }
            let leg_edge = edge_percent / Decimal::from(2);

            found.push(Opportunity {
                id: None,
                opportunity_type: OpportunityType::Scalp,
                sport_key: a.sport_key.clone(),
                event_id: a.event_id.clone(),
                market_key: a.market_key.clone(),
                edge_percent,
                fair_price: None,
                detected_at: a.normalized_at.max(b.normalized_at),
                data_age_seconds: a.data_age_seconds(a.normalized_at).max(b.data_age_seconds(b.normalized_at)),
                legs: vec![
                    OpportunityLeg {
                        book_key: a.book_key.clone(),
                        outcome_name: a.outcome_name.clone(),
                        price: a.price,
                        point: a.point,
                        leg_edge: Some(leg_edge),
                    },
                    OpportunityLeg {
                        book_key: b.book_key.clone(),
                        outcome_name: b.outcome_name.clone(),
                        price: b.price,
                        point: b.point,
                        leg_edge: Some(leg_edge),
                    },
                ],
            });
        }
    }

    found.sort_by(|x, y| y.edge_percent.cmp(&x.edge_percent));
    found
}

/// Full three-way cartesian product: every combination of one quote per
/// outcome, from at least two distinct books, checked for arbitrage together.
fn detect_three_way(quotes: &[NormalizedOdds], min_edge_pct: Decimal) -> Vec<Opportunity> {
    let mut outcomes: Vec<&str> = quotes.iter().map(|q| q.outcome_name.as_str()).collect::<HashSet<_>>().into_iter().collect();
    outcomes.sort_unstable();
    if outcomes.len() != 3 {
        return Vec::new();
    }

    let by_outcome: Vec<Vec<&NormalizedOdds>> = outcomes
        .iter()
        .map(|outcome| quotes.iter().filter(|q| q.outcome_name == *outcome).collect())
        .collect();

    let mut found = Vec::new();

    for a in &by_outcome[0] {
        for b in &by_outcome[1] {
            for c in &by_outcome[2] {
                if a.point != b.point || b.point != c.point {
                    continue;
                }

                let result = arbitrage(&[a.decimal_odds, b.decimal_odds, c.decimal_odds]);
                if !result.is_arbitrage {
                    continue;
                }

                let edge_percent = (Decimal::ONE - result.implied_sum) * Decimal::from(100);
                if edge_percent < min_edge_pct {
                    continue;
                }
                let leg_edge = edge_percent / Decimal::from(3);

                found.push(Opportunity {
                    id: None,
                    opportunity_type: OpportunityType::Scalp,
                    sport_key: a.sport_key.clone(),
                    event_id: a.event_id.clone(),
                    market_key: a.market_key.clone(),
                    edge_percent,
                    fair_price: None,
                    detected_at: a.normalized_at.max(b.normalized_at).max(c.normalized_at),
                    data_age_seconds: a
                        .data_age_seconds(a.normalized_at)
                        .max(b.data_age_seconds(b.normalized_at))
                        .max(c.data_age_seconds(c.normalized_at)),
                    legs: vec![
                        OpportunityLeg {
                            book_key: a.book_key.clone(),
                            outcome_name: a.outcome_name.clone(),
                            price: a.price,
                            point: a.point,
                            leg_edge: Some(leg_edge),
                        },
                        OpportunityLeg {
                            book_key: b.book_key.clone(),
                            outcome_name: b.outcome_name.clone(),
                            price: b.price,
                            point: b.point,
                            leg_edge: Some(leg_edge),
                        },
                        OpportunityLeg {
                            book_key: c.book_key.clone(),
                            outcome_name: c.outcome_name.clone(),
                            price: c.price,
                            point: c.point,
                            leg_edge: Some(leg_edge),
                        },
                    ],
                });
            }
        }
    }

    found.sort_by(|x, y| y.edge_percent.cmp(&x.edge_percent));
    found
}
