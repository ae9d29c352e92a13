//! HTTP client for the upstream odds feed's scores endpoint. Settlement uses
//! this to find out whether an event has finished and, if so, its final score.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ScoreEntry {
    pub name: String,
    pub score: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventScore {
    pub id: String,
    pub completed: bool,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub scores: Option<Vec<ScoreEntry>>,
}

impl EventScore {
    /// The named team's final score, parsed to an integer. `None` if the
    /// event isn't completed yet or the feed didn't report that team.
    pub fn score_for(&self, team: &str) -> Option<i64> {
        self.scores
            .as_ref()?
            .iter()
            .find(|s| s.name == team)
            .and_then(|s| s.score.as_ref())
            .and_then(|s| s.parse().ok())
    }
}

pub struct ScoreClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ScoreClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("fairline-settlement/0.1.0")
            .build()
            .context("failed to build HTTP client for score feed")?;

        Ok(Self { http, base_url, api_key })
    }

    /// Fetch scores for up to 40 events in one sport, as the upstream feed caps
    /// `eventIds` at that many per request. Callers are responsible for batching.
    pub async fn scores(&self, sport_key: &str, event_ids: &[String]) -> Result<Vec<EventScore>> {
        let url = format!("{}/v4/sports/{sport_key}/scores/", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.as_str()),
                ("daysFrom", "3"),
                ("eventIds", &event_ids.join(",")),
            ])
            .send()
            .await
            .context("score feed request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("score feed returned {status}: {body}");
        }

        resp.json().await.context("malformed score feed response")
    }
}
