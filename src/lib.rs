//! Fairline — real-time sports betting decision pipeline.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry points under `src/bin/`.

pub mod alerts;
pub mod api;
pub mod clv;
pub mod config;
pub mod detection;
pub mod executor;
pub mod market_cache;
pub mod normalizer;
pub mod oddsmath;
pub mod settlement;
pub mod sharpbooks;
pub mod storage;
pub mod streambus;
pub mod strategy;
pub mod textmatch;
pub mod types;

/// Initialise the `tracing` subscriber, shared by every binary in this pipeline.
///
/// - In development (`RUST_LOG` set), uses human-readable pretty format.
/// - When `log_json` is set (from `FAIRLINE_LOG_JSON`), uses structured JSON on stdout.
pub fn init_logging(log_json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fairline=info"));

    if log_json {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
