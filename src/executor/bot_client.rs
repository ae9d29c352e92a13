//! HTTP client for the external bot manager that actually places bets with a
//! sportsbook. This pipeline only drives it; placement itself is out of scope.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize)]
pub struct BetRequest {
    pub book: String,
    pub team1: String,
    pub team2: String,
    pub bet_team: String,
    pub bet_type: String,
    pub bet_period: String,
    pub bet_amount: rust_decimal::Decimal,
    pub bet_odds: i32,
    pub sport: String,
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BetDetails {
    pub ticket_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BetResponse {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub bet_details: Option<BetDetails>,
}

#[derive(Debug, Deserialize)]
pub struct BotHealth {
    pub healthy: bool,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub bots: HashMap<String, BotHealth>,
}

pub struct BotManagerClient {
    http: Client,
    base_url: String,
}

impl BotManagerClient {
    pub fn new(base_url: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("fairline-executor/0.1.0")
            .build()
            .context("failed to build HTTP client for bot manager")?;

        Ok(Self { http, base_url })
    }

    pub async fn is_healthy(&self, book_key: &str) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let resp = self.http.get(&url).send().await.context("bot manager health check failed")?;
        if !resp.status().is_success() {
            return Ok(false);
        }
        let health: HealthResponse = resp.json().await.context("malformed bot manager health response")?;
        Ok(health.bots.get(book_key).map(|b| b.healthy).unwrap_or(false))
    }

    pub async fn place_bet(&self, request: &BetRequest) -> Result<BetResponse> {
        let url = format!("{}/bet", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .context("bot manager bet placement request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("bot manager returned {status}: {body}");
        }

        resp.json().await.context("malformed bot manager bet response")
    }
}
