//! Suppresses repeat alerts for the same underlying opportunity.
//!
//! The dedup key folds in the event, market, and the sorted set of books
//! involved, so the same edge re-detected on the next tick (same books, same
//! market) doesn't fire a second webhook inside the TTL window, but a
//! genuinely new combination of books does.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::streambus::StreamBus;
use crate::types::Opportunity;

pub struct DedupChecker {
    bus: Arc<StreamBus>,
    ttl_minutes: i64,
}

impl DedupChecker {
    pub fn new(bus: Arc<StreamBus>, ttl_minutes: i64) -> Self {
        Self { bus, ttl_minutes }
    }

    /// `true` if this opportunity has not been alerted on within the TTL window
    /// (and marks it as seen for next time).
    pub async fn is_new(&self, opportunity: &Opportunity) -> anyhow::Result<bool> {
        let key = dedup_key(opportunity);
        self.bus.set_if_absent(&key, self.ttl_minutes * 60).await
    }
}

fn dedup_key(opportunity: &Opportunity) -> String {
    let books_hash = books_hash(&opportunity.sorted_book_keys());
    format!(
        "alert:dedup:{}:{}:{}",
        opportunity.event_id, opportunity.market_key, books_hash
    )
}

/// First 8 bytes of SHA-256 over the sorted, colon-joined book keys, hex-encoded.
fn books_hash(sorted_book_keys: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sorted_book_keys.join(":").as_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpportunityType;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn opportunity(book_keys: &[&str]) -> Opportunity {
        use crate::types::OpportunityLeg;
        Opportunity {
            id: None,
            opportunity_type: OpportunityType::Edge,
            sport_key: "basketball_nba".into(),
            event_id: "evt-1".into(),
            market_key: "h2h".into(),
            edge_percent: dec!(5.0),
            fair_price: None,
            detected_at: Utc::now(),
            data_age_seconds: 1,
            legs: book_keys
                .iter()
                .map(|k| OpportunityLeg {
                    book_key: k.to_string(),
                    outcome_name: "Lakers".into(),
                    price: 110,
                    point: None,
                    leg_edge: None,
                })
                .collect(),
        }
    }

    #[test]
    fn dedup_key_is_stable_regardless_of_leg_order() {
        let a = dedup_key(&opportunity(&["draftkings", "pinnacle"]));
        let b = dedup_key(&opportunity(&["pinnacle", "draftkings"]));
        assert_eq!(a, b);
    }

    #[test]
    fn dedup_key_differs_for_different_book_sets() {
        let a = dedup_key(&opportunity(&["pinnacle", "draftkings"]));
        let b = dedup_key(&opportunity(&["pinnacle", "fanduel"]));
        assert_ne!(a, b);
    }

    #[test]
    fn books_hash_is_sixteen_hex_chars() {
        let hash = books_hash(&["pinnacle".to_string(), "draftkings".to_string()]);
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
