//! Retry policy for bot manager calls: up to `max_attempts`, sleeping between
//! attempts only (never after the last one), with delay growing geometrically
//! and capped.

use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::config::RetryConfig;

const MAX_DELAY: Duration = Duration::from_secs(30);

pub async fn retry<F, Fut, T, E>(config: &RetryConfig, mut attempt_fn: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_err = None;
    for attempt in 1..=config.max_attempts {
        match attempt_fn(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(attempt, error = %e, "bot manager call failed");
                last_err = Some(e);
                if attempt < config.max_attempts {
                    let delay = delay_for(config, attempt);
                    sleep(delay).await;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt always runs"))
}

fn delay_for(config: &RetryConfig, attempt: u32) -> Duration {
    let factor = 1.5_f64.powi(attempt as i32 - 1);
    let seconds = config.initial_delay.as_secs_f64() * factor;
    Duration::from_secs_f64(seconds).min(MAX_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig { max_attempts: 3, initial_delay: Duration::from_secs(1) }
    }

    #[test]
    fn delay_grows_geometrically_and_caps() {
        let config = config();
        let d1 = delay_for(&config, 1);
        let d2 = delay_for(&config, 2);
        assert_eq!(d1, Duration::from_secs(1));
        assert!(d2 > d1);

        let long_config = RetryConfig { max_attempts: 10, initial_delay: Duration::from_secs(10) };
        let d_late = delay_for(&long_config, 8);
        assert_eq!(d_late, MAX_DELAY);
    }

    #[tokio::test]
    async fn retry_returns_first_success() {
        let result: Result<i32, String> = retry(&config(), |attempt| async move {
            if attempt < 2 {
                Err("not yet".to_string())
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retry_exhausts_attempts_and_returns_last_error() {
        let config = RetryConfig { max_attempts: 2, initial_delay: Duration::from_millis(1) };
        let result: Result<i32, String> = retry(&config, |_attempt| async move { Err("always fails".to_string()) }).await;
        assert_eq!(result.unwrap_err(), "always fails");
    }
}
