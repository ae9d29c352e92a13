//! Leaky-bucket rate limiting shared across every alert consumer, backed by a
//! single Redis counter so the limit holds across process restarts and across
//! however many consumer instances are running.
//!
//! The counter tracks tokens *consumed*; a background refiller leaks it back
//! toward zero at a steady rate so capacity recovers continuously rather than
//! resetting in a hard per-minute step. The refiller is spawned once at
//! process boot (not lazily on first check), so the bucket is already draining
//! before the first alert ever arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::streambus::StreamBus;

const BUCKET_KEY: &str = "alert:ratelimit:tokens";
/// Safety-net TTL on the counter key; the refiller keeps it near zero in normal
/// operation, this just bounds the damage if the refiller task ever dies.
const BUCKET_TTL_SECONDS: i64 = 120;

pub struct RateLimiter {
    bus: Arc<StreamBus>,
    capacity_per_minute: i64,
}

impl RateLimiter {
    pub fn new(bus: Arc<StreamBus>, capacity_per_minute: i64) -> Self {
        Self { bus, capacity_per_minute }
    }

    /// `true` if an alert may be sent right now, consuming one token if so.
    pub async fn try_acquire(&self) -> anyhow::Result<bool> {
        let consumed = self.bus.incr_with_ttl(BUCKET_KEY, BUCKET_TTL_SECONDS).await?;
        Ok(consumed <= self.capacity_per_minute)
    }

    /// Leaks one token at a steady cadence so the bucket drains over a minute.
    /// Runs until `shutdown` fires.
    pub async fn run_refiller(&self, mut shutdown: watch::Receiver<bool>) {
        let leak_every = Duration::from_secs_f64(60.0 / self.capacity_per_minute.max(1) as f64);
        let mut ticker = tokio::time::interval(leak_every);
        info!(capacity = self.capacity_per_minute, ?leak_every, "rate limit refiller started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.bus.decr_floor_zero(BUCKET_KEY).await {
                        tracing::warn!(error = %e, "rate limit refiller tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("rate limit refiller shutting down");
                    return;
                }
            }
        }
    }
}
