//! First gate in the alert chain: drop opportunities that don't clear the
//! configured edge and freshness bars before spending a dedup/rate-limit check
//! on them.

use crate::config::AlertConfig;
use crate::types::Opportunity;

pub fn passes(opportunity: &Opportunity, config: &AlertConfig) -> bool {
    opportunity.edge_percent >= config.min_edge_pct
        && opportunity.data_age_seconds <= config.max_data_age_seconds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpportunityType;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn config() -> AlertConfig {
        AlertConfig {
            min_edge_pct: dec!(1.0),
            max_data_age_seconds: 10,
            rate_limit_per_minute: 10,
            dedup_ttl_minutes: 5,
            webhook_url: "http://localhost/webhook".into(),
        }
    }

    fn opportunity(edge_percent: rust_decimal::Decimal, data_age_seconds: i64) -> Opportunity {
        Opportunity {
            id: None,
            opportunity_type: OpportunityType::Edge,
            sport_key: "basketball_nba".into(),
            event_id: "evt-1".into(),
            market_key: "h2h".into(),
            edge_percent,
            fair_price: None,
            detected_at: Utc::now(),
            data_age_seconds,
            legs: vec![],
        }
    }

    #[test]
    fn passes_above_both_bars() {
        assert!(passes(&opportunity(dec!(5.0), 2), &config()));
    }

    #[test]
    fn rejects_below_edge_bar() {
        assert!(!passes(&opportunity(dec!(0.5), 2), &config()));
    }

    #[test]
    fn rejects_stale_data() {
        assert!(!passes(&opportunity(dec!(5.0), 20), &config()));
    }
}
