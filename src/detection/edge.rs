//! Single-leg edge detection: one book's price diverges from fair value by more
//! than the configured threshold. Directly retargets the category-threshold
//! scanning shape used for mispricing detection elsewhere in this codebase, at
//! per-book sharp-consensus edges instead of LLM probability estimates.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::types::{NormalizedOdds, Opportunity, OpportunityLeg, OpportunityType};

pub fn detect(quotes: &[NormalizedOdds], min_edge_pct: Decimal, max_data_age_seconds: i64, sharp_books: &[String]) -> Vec<Opportunity> {
    let mut found = Vec::new();
    let now = Utc::now();

    for quote in quotes {
        if sharp_books.iter().any(|b| b == &quote.book_key) {
            continue;
        }
        if quote.data_age_seconds(now) > max_data_age_seconds {
            continue;
        }
        let Some(edge) = quote.edge else { continue };
        if edge < min_edge_pct {
            continue;
        }

        found.push(Opportunity {
            id: None,
            opportunity_type: OpportunityType::Edge,
            sport_key: quote.sport_key.clone(),
            event_id: quote.event_id.clone(),
            market_key: quote.market_key.clone(),
            edge_percent: edge * Decimal::from(100),
            fair_price: quote.fair_price,
            detected_at: quote.normalized_at,
            data_age_seconds: quote.data_age_seconds(now),
            legs: vec![OpportunityLeg {
                book_key: quote.book_key.clone(),
                outcome_name: quote.outcome_name.clone(),
                price: quote.price,
                point: quote.point,
                leg_edge: Some(edge * Decimal::from(100)),
            }],
        });
    }

    found.sort_by(|a, b| b.edge_percent.cmp(&a.edge_percent));
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketType, VigMethod};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn quote(book_key: &str, edge: Option<Decimal>) -> NormalizedOdds {
        quote_with_age(book_key, edge, 0)
    }

    fn quote_with_age(book_key: &str, edge: Option<Decimal>, age_seconds: i64) -> NormalizedOdds {
        let now = Utc::now();
        NormalizedOdds {
            event_id: "evt-1".into(),
            sport_key: "basketball_nba".into(),
            market_key: "h2h".into(),
            book_key: book_key.into(),
            outcome_name: "Lakers".into(),
            point: None,
            price: 120,
            vendor_last_update: now,
            received_at: now - chrono::Duration::seconds(age_seconds),
            decimal_odds: dec!(2.2),
            implied_probability: dec!(0.4545),
            no_vig_probability: None,
            fair_price: Some(100),
            edge,
            sharp_consensus: Some(dec!(0.5)),
            market_type: MarketType::TwoWay,
            vig_method: VigMethod::Multiplicative,
            normalized_at: now,
            processing_latency_ms: 3,
        }
    }

    const NO_SHARP_BOOKS: &[String] = &[];

    #[test]
    fn detect_skips_quotes_without_edge() {
        let quotes = vec![quote("pinnacle", None)];
        assert!(detect(&quotes, dec!(1.0), 10, NO_SHARP_BOOKS).is_empty());
    }

    #[test]
    fn detect_skips_edges_below_threshold() {
        let quotes = vec![quote("pinnacle", Some(dec!(0.005)))];
        assert!(detect(&quotes, dec!(1.0), 10, NO_SHARP_BOOKS).is_empty());
    }

    #[test]
    fn detect_emits_opportunity_above_threshold() {
        let quotes = vec![quote("draftkings", Some(dec!(0.09)))];
        let found = detect(&quotes, dec!(1.0), 10, NO_SHARP_BOOKS);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].opportunity_type, OpportunityType::Edge);
        assert_eq!(found[0].legs.len(), 1);
        assert!((found[0].edge_percent - dec!(9.0)).abs() < dec!(0.001));
    }

    #[test]
    fn detect_sorts_by_edge_descending() {
        let quotes = vec![quote("a", Some(dec!(0.02))), quote("b", Some(dec!(0.09)))];
        let found = detect(&quotes, dec!(1.0), 10, NO_SHARP_BOOKS);
        assert_eq!(found.len(), 2);
        assert!(found[0].edge_percent > found[1].edge_percent);
    }

    #[test]
    fn detect_skips_quotes_from_sharp_books() {
        let quotes = vec![quote("pinnacle", Some(dec!(0.09)))];
        let sharp_books = vec!["pinnacle".to_string()];
        assert!(detect(&quotes, dec!(1.0), 10, &sharp_books).is_empty());
    }

    #[test]
    fn detect_skips_stale_quotes() {
        let quotes = vec![quote_with_age("draftkings", Some(dec!(0.09)), 30)];
        assert!(detect(&quotes, dec!(1.0), 10, NO_SHARP_BOOKS).is_empty());
    }
}
