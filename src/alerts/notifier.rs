//! Posts surviving opportunities to an operator-configured webhook.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::types::Opportunity;

#[derive(Serialize)]
struct AlertPayload<'a> {
    opportunity: &'a Opportunity,
}

pub struct Notifier {
    http: Client,
    webhook_url: String,
}

impl Notifier {
    pub fn new(webhook_url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("fairline-alerts/0.1.0")
            .build()
            .context("failed to build HTTP client for alert webhook")?;

        Ok(Self { http, webhook_url })
    }

    pub async fn send(&self, opportunity: &Opportunity) -> Result<()> {
        let payload = AlertPayload { opportunity };

        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .context("webhook request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, %body, "webhook rejected alert");
            anyhow::bail!("webhook returned {status}: {body}");
        }

        debug!(event_id = %opportunity.event_id, market_key = %opportunity.market_key, "alert sent");
        Ok(())
    }
}
