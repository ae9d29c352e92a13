//! Raw odds -> normalized odds.
//!
//! For every quote that arrives on `odds.raw.{sport_key}`, this stamps decimal
//! odds and implied probability, removes vig against the opposite side(s) of the
//! same book when they're cached, layers in sharp-book consensus as a second fair
//! estimate, and republishes to `odds.normalized.{sport_key}`. The loop shape
//! (ensure group, blocking read, process, ack) mirrors the rest of this pipeline's
//! consumers.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::HealthState;
use crate::market_cache::MarketCache;
use crate::oddsmath::{american_to_decimal, decimal_to_american, edge, implied, remove_vig_multiplicative};
use crate::sharpbooks::SharpBookProvider;
use crate::streambus::{streams, StreamBus, StreamMessage};
use crate::types::{MarketType, NormalizedOdds, PipelineError, RawOdds, VigMethod};

const GROUP: &str = "normalizer";

pub struct Normalizer {
    bus: Arc<StreamBus>,
    cache: Arc<MarketCache>,
    sharp: Arc<SharpBookProvider>,
    consumer_name: String,
    health: Arc<HealthState>,
}

impl Normalizer {
    pub fn new(bus: Arc<StreamBus>, cache: Arc<MarketCache>, sharp: Arc<SharpBookProvider>, consumer_name: String, health: Arc<HealthState>) -> Self {
        Self { bus, cache, sharp, consumer_name, health }
    }

    pub async fn run(&self, sport_key: &str, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let stream = streams::odds_raw(sport_key);
        self.bus.ensure_group(&stream, GROUP).await?;
        info!(stream = %stream, "normalizer listening");

        loop {
            tokio::select! {
                result = self.bus.read_group(&stream, GROUP, &self.consumer_name, 50, 2000) => {
                    let messages = result?;
                    let mut acked = Vec::with_capacity(messages.len());
                    for message in &messages {
                        match self.process(message).await {
                            Ok(()) => acked.push(message.id.clone()),
                            Err(PipelineError::MalformedInput { stream, reason }) => {
                                warn!(stream, reason, "dropping malformed raw odds message");
                                acked.push(message.id.clone());
                            }
                            Err(e) => {
                                error!(error = %e, entry = %message.id, "normalization failed, leaving unacked for redelivery");
                            }
                        }
                    }
                    self.bus.ack(&stream, GROUP, &acked).await?;
                    self.health.record_iteration().await;
                }
                _ = shutdown.changed() => {
                    info!("normalizer shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn process(&self, message: &StreamMessage) -> Result<(), PipelineError> {
        let raw: RawOdds = message.decode().map_err(|e| PipelineError::MalformedInput {
            stream: streams::odds_raw("unknown"),
            reason: e.to_string(),
        })?;

        let normalized = self.normalize(raw).await?;
        self.cache.upsert(normalized.clone()).await;

        let stream = streams::odds_normalized(&normalized.sport_key);
        self.bus
            .publish(&stream, &normalized)
            .await
            .map_err(|e| PipelineError::TransientIo(e.to_string()))?;

        Ok(())
    }

    async fn normalize(&self, raw: RawOdds) -> Result<NormalizedOdds, PipelineError> {
        let market_quotes = self.cache.market_quotes(&raw.event_id, &raw.market_key).await;
        let devig = devig_against_cache(&raw, &market_quotes).map_err(|e| PipelineError::Invariant(e.to_string()))?;

        let sharp_books = match self.sharp.sharp_books_for(&raw.sport_key).await {
            Ok(books) => books,
            Err(PipelineError::NoSharpData { sport_key }) => {
                warn!(sport_key, "no sharp book data on file, proceeding without consensus");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let is_sharp_book = sharp_books.iter().any(|b| b == &raw.book_key);
        let sharp_consensus = SharpBookProvider::consensus(&market_quotes, &raw.outcome_name, &sharp_books);

        // Two-way markets price their own edge off the same-book devig result (a
        // small self-referential figure); three-way/props markets have no usable
        // same-book devig, so they borrow sharp consensus instead, and only when
        // this book is itself soft — a sharp book's own quote never gets an edge.
        let (fair_probability, edge_value) = match devig.market_type {
            MarketType::TwoWay => (devig.no_vig_probability, devig.no_vig_probability.map(|fair| edge(fair, devig.implied_probability))),
            MarketType::ThreeWay | MarketType::Props => {
                if is_sharp_book {
                    (None, None)
                } else {
                    (sharp_consensus, sharp_consensus.map(|consensus| edge(consensus, devig.implied_probability)))
                }
            }
        };
        let fair_price = fair_probability.and_then(|p| {
            if p <= rust_decimal::Decimal::ZERO {
                None
            } else {
                decimal_to_american(rust_decimal::Decimal::ONE / p).ok()
            }
        });

        let processing_latency_ms = (Utc::now() - raw.received_at).num_milliseconds().max(0);

        Ok(NormalizedOdds {
            event_id: raw.event_id,
            sport_key: raw.sport_key,
            market_key: raw.market_key,
            book_key: raw.book_key,
            outcome_name: raw.outcome_name,
            point: raw.point,
            price: raw.price,
            vendor_last_update: raw.vendor_last_update,
            received_at: raw.received_at,
            decimal_odds: devig.decimal_odds,
            implied_probability: devig.implied_probability,
            no_vig_probability: devig.no_vig_probability,
            fair_price,
            edge: edge_value,
            sharp_consensus,
            market_type: devig.market_type,
            vig_method: devig.vig_method,
            normalized_at: Utc::now(),
            processing_latency_ms,
        })
    }
}

/// Output of devigging a raw quote against whatever else is cached for its market,
/// independent of sharp-book consensus (which needs store/async access).
struct Devig {
    decimal_odds: rust_decimal::Decimal,
    implied_probability: rust_decimal::Decimal,
    no_vig_probability: Option<rust_decimal::Decimal>,
    market_type: MarketType,
    vig_method: VigMethod,
}

/// Static sport-agnostic market classification: which two/three-way devig path
/// applies is a property of the market key itself, never of how many distinct
/// outcomes happen to already be cached (the opposite side of a two-way market
/// may not have arrived yet).
fn classify_market(market_key: &str) -> MarketType {
    match market_key {
        "spreads" | "totals" => MarketType::TwoWay,
        "h2h" => MarketType::ThreeWay,
        _ => MarketType::Props,
    }
}

fn devig_against_cache(raw: &RawOdds, market_quotes: &[NormalizedOdds]) -> Result<Devig, crate::oddsmath::OddsMathError> {
    let decimal_odds = american_to_decimal(raw.price)?;
    let implied_probability = implied(raw.price)?;
    let market_type = classify_market(&raw.market_key);

    // Three-way and prop markets skip same-book vig removal entirely; their
    // fair value comes from sharp consensus instead, resolved by the caller.
    let (vig_method, no_vig_probability) = match market_type {
        MarketType::TwoWay => {
            let opposite = market_quotes
                .iter()
                .find(|q| q.book_key == raw.book_key && q.outcome_name != raw.outcome_name);
            match opposite {
                Some(opposite) => match remove_vig_multiplicative(implied_probability, opposite.implied_probability) {
                    Ok((fair_this, _)) => (VigMethod::Multiplicative, Some(fair_this)),
                    Err(_) => (VigMethod::None, None),
                },
                None => (VigMethod::None, None),
            }
        }
        MarketType::ThreeWay | MarketType::Props => (VigMethod::None, None),
    };

    Ok(Devig {
        decimal_odds,
        implied_probability,
        no_vig_probability,
        market_type,
        vig_method,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn raw(market_key: &str, book_key: &str, outcome_name: &str, price: i32) -> RawOdds {
        let now = Utc::now();
        RawOdds {
            event_id: "evt-1".into(),
            sport_key: "basketball_nba".into(),
            market_key: market_key.into(),
            book_key: book_key.into(),
            outcome_name: outcome_name.into(),
            point: None,
            price,
            vendor_last_update: now - Duration::seconds(1),
            received_at: now,
        }
    }

    fn cached_quote(market_key: &str, book_key: &str, outcome_name: &str, price: i32) -> NormalizedOdds {
        let now = Utc::now();
        NormalizedOdds {
            event_id: "evt-1".into(),
            sport_key: "basketball_nba".into(),
            market_key: market_key.into(),
            book_key: book_key.into(),
            outcome_name: outcome_name.into(),
            point: None,
            price,
            vendor_last_update: now,
            received_at: now,
            decimal_odds: american_to_decimal(price).unwrap(),
            implied_probability: implied(price).unwrap(),
            no_vig_probability: None,
            fair_price: None,
            edge: None,
            sharp_consensus: None,
            market_type: MarketType::TwoWay,
            vig_method: VigMethod::None,
            normalized_at: now,
            processing_latency_ms: 0,
        }
    }

    #[test]
    fn classify_market_is_a_static_table_keyed_by_market_key() {
        assert_eq!(classify_market("spreads"), MarketType::TwoWay);
        assert_eq!(classify_market("totals"), MarketType::TwoWay);
        assert_eq!(classify_market("h2h"), MarketType::ThreeWay);
        assert_eq!(classify_market("player_points"), MarketType::Props);
    }

    #[test]
    fn devig_classifies_two_way_even_before_the_opposite_side_arrives() {
        let devig = devig_against_cache(&raw("totals", "pinnacle", "Over", -110), &[]).unwrap();
        assert_eq!(devig.market_type, MarketType::TwoWay);
        assert_eq!(devig.vig_method, VigMethod::None);
        assert!(devig.no_vig_probability.is_none());
    }

    #[test]
    fn devig_removes_vig_against_opposite_side_in_same_book() {
        let market_quotes = vec![cached_quote("spreads", "pinnacle", "Celtics", -110)];
        let devig = devig_against_cache(&raw("spreads", "pinnacle", "Lakers", -110), &market_quotes).unwrap();
        assert_eq!(devig.market_type, MarketType::TwoWay);
        assert_eq!(devig.vig_method, VigMethod::Multiplicative);
        let fair = devig.no_vig_probability.unwrap();
        assert!((fair - dec!(0.5)).abs() < dec!(0.001));
    }

    #[test]
    fn devig_ignores_other_books_opposite_side() {
        let market_quotes = vec![cached_quote("spreads", "draftkings", "Celtics", -110)];
        let devig = devig_against_cache(&raw("spreads", "pinnacle", "Lakers", -110), &market_quotes).unwrap();
        assert_eq!(devig.market_type, MarketType::TwoWay);
        assert!(devig.no_vig_probability.is_none());
    }

    #[test]
    fn devig_skips_vig_removal_for_three_way_markets() {
        let market_quotes = vec![
            cached_quote("h2h", "pinnacle", "Home", 150),
            cached_quote("h2h", "pinnacle", "Draw", 220),
        ];
        let devig = devig_against_cache(&raw("h2h", "pinnacle", "Away", 300), &market_quotes).unwrap();
        assert_eq!(devig.market_type, MarketType::ThreeWay);
        assert_eq!(devig.vig_method, VigMethod::None);
        assert!(devig.no_vig_probability.is_none());
    }

    #[test]
    fn devig_skips_vig_removal_for_props() {
        let devig = devig_against_cache(&raw("player_points", "pinnacle", "Over 20.5", -110), &[]).unwrap();
        assert_eq!(devig.market_type, MarketType::Props);
        assert_eq!(devig.vig_method, VigMethod::None);
        assert!(devig.no_vig_probability.is_none());
    }
}
