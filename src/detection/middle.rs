//! Middle detection: two books quoting opposite outcomes at the *same* point,
//! each independently priced at a positive edge against sharp consensus. If
//! both land, the bettor wins both legs (or wins one and pushes the other).
//!
//! Only spreads and totals carry a `point`; moneylines (`point = None`) never
//! produce middles and are skipped.

use rust_decimal::Decimal;

use crate::types::{NormalizedOdds, Opportunity, OpportunityLeg, OpportunityType};

pub fn detect(quotes: &[NormalizedOdds], min_edge_pct: Decimal) -> Vec<Opportunity> {
    let mut found = Vec::new();

    for (i, a) in quotes.iter().enumerate() {
        let Some(point_a) = a.point else { continue };
        let Some(edge_a) = a.edge else { continue };
        if edge_a <= Decimal::ZERO {
            continue;
        }

        for b in quotes.iter().skip(i + 1) {
            if a.book_key == b.book_key || a.outcome_name == b.outcome_name {
                continue;
            }
            let Some(point_b) = b.point else { continue };
            if point_b != point_a {
                continue;
            }
            let Some(edge_b) = b.edge else { continue };
            if edge_b <= Decimal::ZERO {
                continue;
            }

            let edge_percent = (edge_a + edge_b) / Decimal::from(2) * Decimal::from(100);
            if edge_percent < min_edge_pct {
                continue;
            }

            found.push(Opportunity {
                id: None,
                opportunity_type: OpportunityType::Middle,
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
                        leg_edge: Some(edge_a * Decimal::from(100)),
                    },
                    OpportunityLeg {
                        book_key: b.book_key.clone(),
                        outcome_name: b.outcome_name.clone(),
                        price: b.price,
                        point: b.point,
                        leg_edge: Some(edge_b * Decimal::from(100)),
                    },
                ],
            });
        }
    }

    found.sort_by(|x, y| y.edge_percent.cmp(&x.edge_percent));
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketType, VigMethod};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn quote(book_key: &str, outcome_name: &str, point: Decimal, edge: Option<Decimal>) -> NormalizedOdds {
        let now = Utc::now();
        NormalizedOdds {
            event_id: "evt-1".into(),
            sport_key: "basketball_nba".into(),
            market_key: "totals".into(),
            book_key: book_key.into(),
            outcome_name: outcome_name.into(),
            point: Some(point),
            price: -110,
            vendor_last_update: now,
            received_at: now,
            decimal_odds: dec!(1.909090909090909090909090909),
            implied_probability: dec!(0.5238),
            no_vig_probability: None,
            fair_price: None,
            edge,
            sharp_consensus: None,
            market_type: MarketType::TwoWay,
            vig_method: VigMethod::Multiplicative,
            normalized_at: now,
            processing_latency_ms: 1,
        }
    }

    #[test]
    fn detect_finds_middle_on_identical_point_with_both_legs_positive_edge() {
        let quotes = vec![
            quote("pinnacle", "Over", dec!(220.5), Some(dec!(0.02))),
            quote("draftkings", "Under", dec!(220.5), Some(dec!(0.03))),
        ];
        let found = detect(&quotes, dec!(1.0));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].opportunity_type, OpportunityType::Middle);
        assert_eq!(found[0].legs.len(), 2);
        assert!((found[0].edge_percent - dec!(2.5)).abs() < dec!(0.001));
    }

    #[test]
    fn detect_skips_differing_points() {
        let quotes = vec![
            quote("pinnacle", "Over", dec!(220.5), Some(dec!(0.05))),
            quote("draftkings", "Under", dec!(224.5), Some(dec!(0.05))),
        ];
        assert!(detect(&quotes, dec!(1.0)).is_empty());
    }

    #[test]
    fn detect_skips_when_either_leg_has_no_edge() {
        let quotes = vec![
            quote("pinnacle", "Over", dec!(220.5), None),
            quote("draftkings", "Under", dec!(220.5), Some(dec!(0.05))),
        ];
        assert!(detect(&quotes, dec!(1.0)).is_empty());
    }

    #[test]
    fn detect_skips_when_average_edge_below_threshold() {
        let quotes = vec![
            quote("pinnacle", "Over", dec!(220.5), Some(dec!(0.002))),
            quote("draftkings", "Under", dec!(220.5), Some(dec!(0.003))),
        ];
        assert!(detect(&quotes, dec!(1.0)).is_empty());
    }

    #[test]
    fn detect_skips_same_book() {
        let quotes = vec![
            quote("pinnacle", "Over", dec!(220.5), Some(dec!(0.05))),
            quote("pinnacle", "Under", dec!(220.5), Some(dec!(0.05))),
        ];
        assert!(detect(&quotes, dec!(1.0)).is_empty());
    }

    #[test]
    fn detect_skips_moneylines_without_points() {
        let mut a = quote("pinnacle", "Home", dec!(0), Some(dec!(0.05)));
        a.point = None;
        let mut b = quote("draftkings", "Away", dec!(0), Some(dec!(0.05)));
        b.point = None;
        assert!(detect(&[a, b], dec!(1.0)).is_empty());
    }
}
