//! In-memory rolling snapshot of the latest normalized quote for every
//! (event, market, book, outcome[, point]) combination.
//!
//! The normalizer needs the opposite side of the same book to remove vig, and the
//! detection engine needs every book's current price for a market to compare
//! against sharp consensus. Both read this cache instead of re-querying the store,
//! the same trade the enrichment stage in the engine made for context lookups.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::types::NormalizedOdds;

/// (book_key, outcome_name, point)
type OutcomeKey = (String, String, Option<Decimal>);

struct CachedOdds {
    odds: NormalizedOdds,
    inserted_at: DateTime<Utc>,
}

#[derive(Default)]
struct MarketSnapshot {
    entries: HashMap<OutcomeKey, CachedOdds>,
}

pub struct MarketCache {
    snapshots: RwLock<HashMap<(String, String), MarketSnapshot>>,
    ttl: Duration,
}

impl MarketCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Default 5-minute eviction window for stale quotes.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::minutes(5))
    }

    pub async fn upsert(&self, odds: NormalizedOdds) {
        let market_key = (odds.event_id.clone(), odds.market_key.clone());
        let outcome_key = (odds.book_key.clone(), odds.outcome_name.clone(), odds.point);
        let mut snapshots = self.snapshots.write().await;
        let snapshot = snapshots.entry(market_key).or_default();
        snapshot.entries.insert(
            outcome_key,
            CachedOdds {
                odds,
                inserted_at: Utc::now(),
            },
        );
    }

    /// All still-fresh quotes for a market, across every book.
    pub async fn market_quotes(&self, event_id: &str, market_key: &str) -> Vec<NormalizedOdds> {
        let snapshots = self.snapshots.read().await;
        let now = Utc::now();
        snapshots
            .get(&(event_id.to_string(), market_key.to_string()))
            .map(|snapshot| {
                snapshot
                    .entries
                    .values()
                    .filter(|cached| now - cached.inserted_at < self.ttl)
                    .map(|cached| cached.odds.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The current quote for one specific book+outcome+point, if fresh.
    pub async fn book_side(
        &self,
        event_id: &str,
        market_key: &str,
        book_key: &str,
        outcome_name: &str,
        point: Option<Decimal>,
    ) -> Option<NormalizedOdds> {
        let snapshots = self.snapshots.read().await;
        let snapshot = snapshots.get(&(event_id.to_string(), market_key.to_string()))?;
        let cached = snapshot
            .entries
            .get(&(book_key.to_string(), outcome_name.to_string(), point))?;
        if Utc::now() - cached.inserted_at < self.ttl {
            Some(cached.odds.clone())
        } else {
            None
        }
    }

    pub async fn evict_expired(&self) {
        let now = Utc::now();
        let mut snapshots = self.snapshots.write().await;
        for snapshot in snapshots.values_mut() {
            snapshot
                .entries
                .retain(|_, cached| now - cached.inserted_at < self.ttl);
        }
        snapshots.retain(|_, snapshot| !snapshot.entries.is_empty());
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.values().map(|s| s.entries.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketType, VigMethod};
    use rust_decimal_macros::dec;

    fn sample(book_key: &str, outcome_name: &str) -> NormalizedOdds {
        let now = Utc::now();
        NormalizedOdds {
            event_id: "evt-1".to_string(),
            sport_key: "basketball_nba".to_string(),
            market_key: "h2h".to_string(),
            book_key: book_key.to_string(),
            outcome_name: outcome_name.to_string(),
            point: None,
            price: -110,
            vendor_last_update: now,
            received_at: now,
            decimal_odds: dec!(1.909090909090909090909090909),
            implied_probability: dec!(0.5238),
            no_vig_probability: None,
            fair_price: None,
            edge: None,
            sharp_consensus: None,
            market_type: MarketType::TwoWay,
            vig_method: VigMethod::Multiplicative,
            normalized_at: now,
            processing_latency_ms: 5,
        }
    }

    #[tokio::test]
    async fn upsert_then_book_side_round_trips() {
        let cache = MarketCache::with_default_ttl();
        cache.upsert(sample("pinnacle", "Lakers")).await;
        let found = cache
            .book_side("evt-1", "h2h", "pinnacle", "Lakers", None)
            .await;
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn market_quotes_returns_every_book() {
        let cache = MarketCache::with_default_ttl();
        cache.upsert(sample("pinnacle", "Lakers")).await;
        cache.upsert(sample("draftkings", "Lakers")).await;
        let quotes = cache.market_quotes("evt-1", "h2h").await;
        assert_eq!(quotes.len(), 2);
    }

    #[tokio::test]
    async fn evict_expired_drops_stale_entries() {
        let cache = MarketCache::new(Duration::seconds(-1));
        cache.upsert(sample("pinnacle", "Lakers")).await;
        cache.evict_expired().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn missing_combination_returns_none() {
        let cache = MarketCache::with_default_ttl();
        assert!(cache
            .book_side("evt-1", "h2h", "pinnacle", "Lakers", None)
            .await
            .is_none());
    }
}
