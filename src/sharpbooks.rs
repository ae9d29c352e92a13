//! Resolves which books count as "sharp" for a given sport, and computes a
//! consensus fair probability across them.
//!
//! The operator-configured default list is the floor; a store-side flag for a
//! specific book, if present, always wins (an operator can demote a normally-sharp
//! book for one sport, or promote a book not on the default list). The resolved
//! set is cached for a few minutes so every normalization call doesn't hit the
//! store — the same lazy-refresh-when-stale shape the context cache uses.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::storage::Store;
use crate::types::{NormalizedOdds, PipelineError};

struct ResolvedSet {
    books: HashSet<String>,
    refreshed_at: DateTime<Utc>,
}

pub struct SharpBookProvider {
    store: Arc<Store>,
    default_books: Vec<String>,
    cache: RwLock<HashMap<String, ResolvedSet>>,
    refresh_after: Duration,
}

impl SharpBookProvider {
    pub fn new(store: Arc<Store>, default_books: Vec<String>) -> Self {
        Self {
            store,
            default_books,
            cache: RwLock::new(HashMap::new()),
            refresh_after: Duration::seconds(300),
        }
    }

    /// The resolved sharp-book set for `sport_key`, refreshing from the store if the
    /// cached entry is missing or stale.
    pub async fn sharp_books_for(&self, sport_key: &str) -> Result<Vec<String>, PipelineError> {
        {
            let cache = self.cache.read().await;
            if let Some(resolved) = cache.get(sport_key) {
                if Utc::now() - resolved.refreshed_at < self.refresh_after {
                    return Ok(resolved.books.iter().cloned().collect());
                }
            }
        }

        let overrides = self
            .store
            .sharp_book_flags_for_sport(sport_key)
            .await
            .map_err(|e| PipelineError::TransientIo(e.to_string()))?;

        let mut books: HashSet<String> = self.default_books.iter().cloned().collect();
        for (book_key, is_sharp) in overrides {
            if is_sharp {
                books.insert(book_key);
            } else {
                books.remove(&book_key);
            }
        }

        if books.is_empty() {
            return Err(PipelineError::NoSharpData {
                sport_key: sport_key.to_string(),
            });
        }

        let mut cache = self.cache.write().await;
        cache.insert(
            sport_key.to_string(),
            ResolvedSet {
                books: books.clone(),
                refreshed_at: Utc::now(),
            },
        );

        Ok(books.into_iter().collect())
    }

    /// Average no-vig probability across whichever sharp books have a fresh quote
    /// for this outcome. `None` if none of the sharp books are currently quoting it.
    pub fn consensus(quotes: &[NormalizedOdds], outcome_name: &str, sharp_books: &[String]) -> Option<Decimal> {
        let sharp: HashSet<&str> = sharp_books.iter().map(String::as_str).collect();
        let probs: Vec<Decimal> = quotes
            .iter()
            .filter(|q| q.outcome_name == outcome_name && sharp.contains(q.book_key.as_str()))
            .filter_map(|q| q.no_vig_probability.or(Some(q.implied_probability)))
            .collect();

        if probs.is_empty() {
            return None;
        }
        let sum: Decimal = probs.iter().sum();
        Some(sum / Decimal::from(probs.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketType, VigMethod};
    use rust_decimal_macros::dec;

    fn quote(book_key: &str, outcome_name: &str, no_vig: Decimal) -> NormalizedOdds {
        let now = Utc::now();
        NormalizedOdds {
            event_id: "evt-1".into(),
            sport_key: "basketball_nba".into(),
            market_key: "h2h".into(),
            book_key: book_key.into(),
            outcome_name: outcome_name.into(),
            point: None,
            price: -110,
            vendor_last_update: now,
            received_at: now,
            decimal_odds: dec!(1.9),
            implied_probability: dec!(0.52),
            no_vig_probability: Some(no_vig),
            fair_price: None,
            edge: None,
            sharp_consensus: None,
            market_type: MarketType::TwoWay,
            vig_method: VigMethod::Multiplicative,
            normalized_at: now,
            processing_latency_ms: 2,
        }
    }

    #[test]
    fn consensus_averages_sharp_books_only() {
        let sharp_books = vec!["pinnacle".to_string(), "circa".to_string()];
        let quotes = vec![
            quote("pinnacle", "Lakers", dec!(0.52)),
            quote("circa", "Lakers", dec!(0.50)),
            quote("draftkings", "Lakers", dec!(0.70)),
        ];
        let consensus = SharpBookProvider::consensus(&quotes, "Lakers", &sharp_books).unwrap();
        assert!((consensus - dec!(0.51)).abs() < dec!(0.0001));
    }

    #[test]
    fn consensus_is_none_when_no_sharp_book_quotes_outcome() {
        let sharp_books = vec!["pinnacle".to_string()];
        let quotes = vec![quote("draftkings", "Lakers", dec!(0.52))];
        assert!(SharpBookProvider::consensus(&quotes, "Lakers", &sharp_books).is_none());
    }

    #[test]
    fn consensus_ignores_non_sharp_outcome_name_mismatch() {
        let sharp_books = vec!["pinnacle".to_string()];
        let quotes = vec![quote("pinnacle", "Celtics", dec!(0.52))];
        assert!(SharpBookProvider::consensus(&quotes, "Lakers", &sharp_books).is_none());
    }
}
