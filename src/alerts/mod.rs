//! Alert pipeline: filter -> dedup -> rate limit -> notify, consuming every
//! opportunity the detectors find across all sports from a single stream.

pub mod dedup;
pub mod filter;
pub mod notifier;
pub mod ratelimit;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::HealthState;
use crate::config::AlertConfig;
use crate::streambus::{streams, StreamBus, StreamMessage};
use crate::types::{Opportunity, PipelineError};
use dedup::DedupChecker;
use notifier::Notifier;
use ratelimit::RateLimiter;

const GROUP: &str = "alerts";

pub struct AlertPipeline {
    bus: Arc<StreamBus>,
    config: AlertConfig,
    dedup: DedupChecker,
    rate_limiter: Arc<RateLimiter>,
    notifier: Notifier,
    consumer_name: String,
    health: Arc<HealthState>,
}

impl AlertPipeline {
    pub fn new(bus: Arc<StreamBus>, config: AlertConfig, consumer_name: String, health: Arc<HealthState>) -> anyhow::Result<Self> {
        let dedup = DedupChecker::new(bus.clone(), config.dedup_ttl_minutes);
        let rate_limiter = Arc::new(RateLimiter::new(bus.clone(), config.rate_limit_per_minute));
        let notifier = Notifier::new(config.webhook_url.clone())?;

        Ok(Self { bus, config, dedup, rate_limiter, notifier, consumer_name, health })
    }

    /// Background token-bucket leak. Spawned once at process boot alongside `run`,
    /// not lazily on the first alert.
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.rate_limiter.clone()
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let stream = streams::OPPORTUNITIES_DETECTED;
        self.bus.ensure_group(stream, GROUP).await?;
        info!(stream, "alert pipeline listening");

        loop {
            tokio::select! {
                result = self.bus.read_group(stream, GROUP, &self.consumer_name, 50, 2000) => {
                    let messages = result?;
                    let mut acked = Vec::with_capacity(messages.len());
                    for message in &messages {
                        match self.process(message).await {
                            Ok(()) => acked.push(message.id.clone()),
                            Err(PipelineError::MalformedInput { stream, reason }) => {
                                warn!(stream, reason, "dropping malformed opportunity message");
                                acked.push(message.id.clone());
                            }
                            Err(e) => {
                                error!(error = %e, entry = %message.id, "alert processing failed, leaving unacked for redelivery");
                            }
                        }
                    }
                    self.bus.ack(stream, GROUP, &acked).await?;
                    self.health.record_iteration().await;
                }
                _ = shutdown.changed() => {
                    info!("alert pipeline shutting down");
                    return Ok(());
                }
            }
        }
    }

    async fn process(&self, message: &StreamMessage) -> Result<(), PipelineError> {
        let opportunity: Opportunity = message.decode().map_err(|e| PipelineError::MalformedInput {
            stream: streams::OPPORTUNITIES_DETECTED.to_string(),
            reason: e.to_string(),
        })?;

        if !filter::passes(&opportunity, &self.config) {
            debug!(event_id = %opportunity.event_id, "opportunity filtered out before alerting");
            return Ok(());
        }

        let is_new = self
            .dedup
            .is_new(&opportunity)
            .await
            .map_err(|e| PipelineError::TransientIo(e.to_string()))?;
        if !is_new {
            debug!(event_id = %opportunity.event_id, "opportunity suppressed by dedup");
            return Ok(());
        }

        let allowed = self
            .rate_limiter
            .try_acquire()
            .await
            .map_err(|e| PipelineError::TransientIo(e.to_string()))?;
        if !allowed {
            warn!(event_id = %opportunity.event_id, "alert dropped by rate limiter");
            return Ok(());
        }

        self.notifier
            .send(&opportunity)
            .await
            .map_err(|e| PipelineError::TransientIo(e.to_string()))?;

        Ok(())
    }
}
