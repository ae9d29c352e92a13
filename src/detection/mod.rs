//! Opportunity detection: runs edge, then middle, then scalp detectors (in that
//! fixed order, per run) over the current market-cache snapshot for whichever
//! (event, market) a normalized quote just touched, writes what it finds to the
//! store, and republishes it for the alert pipeline.

pub mod edge;
pub mod middle;
pub mod scalp;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::HealthState;
use crate::config::DetectionConfig;
use crate::market_cache::MarketCache;
use crate::storage::Store;
use crate::streambus::{streams, StreamBus, StreamMessage};
use crate::types::{NormalizedOdds, Opportunity, PipelineError};

const GROUP: &str = "detector";

pub struct DetectionEngine {
    bus: Arc<StreamBus>,
    cache: Arc<MarketCache>,
    store: Arc<Store>,
    config: DetectionConfig,
    consumer_name: String,
    health: Arc<HealthState>,
}

impl DetectionEngine {
    pub fn new(
        bus: Arc<StreamBus>,
        cache: Arc<MarketCache>,
        store: Arc<Store>,
        config: DetectionConfig,
        consumer_name: String,
        health: Arc<HealthState>,
    ) -> Self {
        Self { bus, cache, store, config, consumer_name, health }
    }

    pub async fn run(&self, sport_key: &str, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let stream = streams::odds_normalized(sport_key);
        self.bus.ensure_group(&stream, GROUP).await?;
        info!(stream = %stream, "detector listening");

        loop {
            tokio::select! {
                result = self.bus.read_group(&stream, GROUP, &self.consumer_name, 50, 2000) => {
                    let messages = result?;
                    let mut acked = Vec::with_capacity(messages.len());
                    for message in &messages {
                        match self.process(message).await {
                            Ok(()) => acked.push(message.id.clone()),
                            Err(PipelineError::MalformedInput { stream, reason }) => {
                                warn!(stream, reason, "dropping malformed normalized odds message");
                                acked.push(message.id.clone());
                            }
                            Err(e) => {
                                error!(error = %e, entry = %message.id, "detection failed, leaving unacked for redelivery");
                            }
                        }
                    }
                    self.bus.ack(&stream, GROUP, &acked).await?;
                    self.health.record_iteration().await;
                }
                _ = shutdown.changed() => {
                    info!("detector shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn process(&self, message: &StreamMessage) -> Result<(), PipelineError> {
        let quote: NormalizedOdds = message.decode().map_err(|e| PipelineError::MalformedInput {
            stream: streams::odds_normalized("unknown"),
            reason: e.to_string(),
        })?;

        if !self.config.enabled_markets.iter().any(|m| m == &quote.market_key) {
            return Ok(());
        }

        let market_quotes = self.cache.market_quotes(&quote.event_id, &quote.market_key).await;
        let opportunities = self.scan(&market_quotes);

        for opportunity in opportunities {
            let id = self
                .store
                .insert_opportunity(&opportunity)
                .await
                .map_err(|e| PipelineError::TransientIo(e.to_string()))?;

            let mut stamped = opportunity;
            stamped.id = Some(id);

            let sport_stream = streams::opportunities_detected_sport(&stamped.sport_key);
            self.bus
                .publish(&sport_stream, &stamped)
                .await
                .map_err(|e| PipelineError::TransientIo(e.to_string()))?;
            self.bus
                .publish(streams::OPPORTUNITIES_DETECTED, &stamped)
                .await
                .map_err(|e| PipelineError::TransientIo(e.to_string()))?;
        }

        Ok(())
    }

    /// Edge, then middle, then scalp — fixed order so a market that qualifies as
    /// more than one type is never reported out of sequence.
    fn scan(&self, quotes: &[NormalizedOdds]) -> Vec<Opportunity> {
        let mut found = edge::detect(
            quotes,
            self.config.min_edge_pct * rust_decimal::Decimal::from(100),
            self.config.max_data_age_seconds,
            &self.config.sharp_books,
        );

        if self.config.enable_middles {
            found.extend(middle::detect(quotes, self.config.min_edge_pct * rust_decimal::Decimal::from(100)));
        }
        if self.config.enable_scalps {
            found.extend(scalp::detect(quotes, self.config.min_edge_pct * rust_decimal::Decimal::from(100)));
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketType, VigMethod};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn edge_quote() -> NormalizedOdds {
        let now = Utc::now();
        NormalizedOdds {
            event_id: "evt-1".into(),
            sport_key: "basketball_nba".into(),
            market_key: "h2h".into(),
            book_key: "draftkings".into(),
            outcome_name: "Lakers".into(),
            point: None,
            price: 120,
            vendor_last_update: now,
            received_at: now,
            decimal_odds: dec!(2.2),
            implied_probability: dec!(0.4545),
            no_vig_probability: None,
            fair_price: Some(100),
            edge: Some(dec!(0.09)),
            sharp_consensus: Some(dec!(0.5)),
            market_type: MarketType::TwoWay,
            vig_method: VigMethod::Multiplicative,
            normalized_at: now,
            processing_latency_ms: 2,
        }
    }

    fn sample_config() -> DetectionConfig {
        DetectionConfig {
            min_edge_pct: dec!(0.01),
            max_data_age_seconds: 10,
            enabled_markets: vec!["h2h".into()],
            enable_middles: true,
            enable_scalps: true,
            sharp_books: vec!["pinnacle".into()],
        }
    }

    #[test]
    fn scan_finds_edge_opportunity_above_threshold() {
        let config = sample_config();
        let quotes = vec![edge_quote()];
        let found = edge::detect(
            &quotes,
            config.min_edge_pct * rust_decimal::Decimal::from(100),
            config.max_data_age_seconds,
            &config.sharp_books,
        );
        assert_eq!(found.len(), 1);
    }
}
