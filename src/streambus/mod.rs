//! Redis Streams bus: the durable log every stage in this pipeline reads from and
//! writes to. One consumer group per stage, so a restarted consumer resumes from
//! its last unacked entry instead of replaying or skipping messages.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

/// A single entry read back off a stream, still in its raw `payload` form.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub id: String,
    pub payload: String,
}

impl StreamMessage {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.payload)
            .with_context(|| format!("malformed payload on stream entry {}", self.id))
    }
}

#[derive(Clone)]
pub struct StreamBus {
    conn: ConnectionManager,
}

impl StreamBus {
    /// Connect with exponential backoff, matching the ingestion services this
    /// pipeline sits downstream of.
    pub async fn connect_with_retry(url: &str, max_retries: u32) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match redis::Client::open(url) {
                Ok(client) => match ConnectionManager::new(client).await {
                    Ok(conn) => {
                        info!("connected to redis stream bus");
                        return Ok(Self { conn });
                    }
                    Err(e) => {
                        attempt += 1;
                        if attempt >= max_retries {
                            return Err(anyhow!(
                                "failed to connect to redis after {attempt} attempts: {e}"
                            ));
                        }
                        warn!(attempt, error = %e, "redis connection attempt failed, retrying");
                        tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                    }
                },
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries {
                        return Err(anyhow!(
                            "failed to create redis client after {attempt} attempts: {e}"
                        ));
                    }
                    warn!(attempt, error = %e, "redis client creation failed, retrying");
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
            }
        }
    }

    /// Publish a JSON-serializable payload to `stream`, returning the assigned entry id.
    pub async fn publish<T: Serialize>(&self, stream: &str, payload: &T) -> Result<String> {
        let body = serde_json::to_string(payload)?;
        let mut conn = self.conn.clone();
        let id: String = conn.xadd(stream, "*", &[("payload", body)]).await?;
        Ok(id)
    }

    /// Idempotently create `group` on `stream`, creating the stream itself if absent.
    /// A `BUSYGROUP` error (group already exists) is expected on every call after the
    /// first and is swallowed rather than propagated.
    pub async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = conn.xgroup_create_mkstream(stream, group, "0").await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Blocking read of up to `count` new entries for `consumer` in `group`, waiting
    /// up to `block_ms` for data to arrive.
    pub async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: usize,
    ) -> Result<Vec<StreamMessage>> {
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block_ms);
        let reply: StreamReadReply = conn.xread_options(&[stream], &[">"], &opts).await?;

        let mut out = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let payload = entry
                    .map
                    .get("payload")
                    .and_then(|v| match v {
                        redis::Value::BulkString(bytes) => {
                            Some(String::from_utf8_lossy(bytes).into_owned())
                        }
                        redis::Value::SimpleString(s) => Some(s.clone()),
                        _ => None,
                    })
                    .ok_or_else(|| anyhow!("stream entry {} has no payload field", entry.id))?;
                out.push(StreamMessage { id: entry.id, payload });
            }
        }
        Ok(out)
    }

    /// Acknowledge processed entries so they are dropped from the group's pending list.
    pub async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(stream, group, ids).await?;
        Ok(())
    }

    // -- Key/value helpers (alert dedup + rate limiting share the same Redis) ----

    /// `SET key value NX EX ttl_seconds` — true if the key was newly set (i.e. this
    /// is the first time we've seen it within the window).
    pub async fn set_if_absent(&self, key: &str, ttl_seconds: i64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    /// Increment `key`, setting a TTL only on first creation, and return the new count.
    pub async fn incr_with_ttl(&self, key: &str, ttl_seconds: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.incr(key, 1).await?;
        if count == 1 {
            let _: bool = conn.expire(key, ttl_seconds).await?;
        }
        Ok(count)
    }

    /// Decrement `key`, clamped so it never goes below zero.
    pub async fn decr_floor_zero(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.decr(key, 1).await?;
        if count < 0 {
            let _: i64 = conn.set(key, 0).await?;
            return Ok(0);
        }
        Ok(count)
    }
}

/// Stream names used across the pipeline, centralized so producer and consumer
/// sides can't drift on naming.
pub mod streams {
    pub fn odds_raw(sport_key: &str) -> String {
        format!("odds.raw.{sport_key}")
    }
    pub fn odds_normalized(sport_key: &str) -> String {
        format!("odds.normalized.{sport_key}")
    }
    pub const OPPORTUNITIES_DETECTED: &str = "opportunities.detected";
    pub fn opportunities_detected_sport(sport_key: &str) -> String {
        format!("opportunities.detected.{sport_key}")
    }
    pub const CLOSING_LINES_CAPTURED: &str = "closing_lines.captured";
}
