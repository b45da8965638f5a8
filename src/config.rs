//! Configuration management for the trader scout

use crate::services::rate_limiter::{RateLimit, ThrottleConfig};
use crate::services::retry::RetryConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Scout configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database
    pub database_path: String,

    /// Base URL of the public data API
    pub data_api_url: String,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,

    /// Per-endpoint request pacing
    pub throttle: ThrottleConfig,

    /// Backoff policy for a single request
    pub retry: RetryConfig,

    /// Collection strategy settings
    pub collector: CollectorConfig,

    /// Composite score weights
    pub weights: ScoringWeights,

    /// Default selection thresholds (CLI flags override)
    pub selection: SelectionCriteria,
}

/// How addresses are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// Screen on closed positions first, enrich only the survivors
    TwoPhase,
    /// Fetch all three sources for every address
    Full,
}

/// Collector settings
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub mode: CollectionMode,
    /// Addresses evaluated at once; all share the same throttles
    pub concurrency: usize,
    /// Records per trades-feed page during discovery
    pub discovery_page_size: u32,
    /// Records per activity page
    pub activity_page_size: u32,
    /// Hard cap on activity pages per address
    pub activity_max_pages: u32,
    /// Activity older than this is not requested
    pub activity_lookback_days: i64,
    /// Stop paginating activity once this many trades are collected
    pub early_stop_min_trades: u64,
    /// Stop paginating activity once this much USD volume is collected
    pub early_stop_min_volume: f64,
    /// Records requested from the positions endpoints
    pub positions_limit: u32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            mode: CollectionMode::TwoPhase,
            concurrency: 1,
            discovery_page_size: 500,
            activity_page_size: 500,
            activity_max_pages: 10,
            activity_lookback_days: 30,
            early_stop_min_trades: 200,
            early_stop_min_volume: 10_000.0,
            positions_limit: 500,
        }
    }
}

/// Composite score weights. They need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub win_rate: f64,
    pub volume: f64,
    pub confidence: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            win_rate: 0.5,
            volume: 0.3,
            confidence: 0.2,
        }
    }
}

/// Selection thresholds. All must hold for an account to be selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub min_trades: u64,
    pub min_volume: f64,
    /// Applied to the effective win rate; accounts without any win-rate
    /// signal are rejected even when this is 0
    pub min_win_rate: f64,
    pub min_confidence: f64,
    pub min_pnl: f64,
    pub top_n: usize,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            min_trades: 10,
            min_volume: 1_000.0,
            min_win_rate: 0.5,
            min_confidence: 0.0,
            min_pnl: 0.0,
            top_n: 50,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let database_path = env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "trader_scout.db".to_string());

        let data_api_url = env::var("DATA_API_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DataApi::BASE_URL.to_string());

        let request_timeout_secs = env_or("REQUEST_TIMEOUT_SECS", 30);

        let window = Duration::from_secs(env_or("RATE_LIMIT_WINDOW_SECS", 10));
        let throttle = ThrottleConfig {
            discovery: RateLimit::new(env_or("RATE_LIMIT_DISCOVERY", 200), window),
            positions: RateLimit::new(env_or("RATE_LIMIT_POSITIONS", 150), window),
            closed_positions: RateLimit::new(env_or("RATE_LIMIT_CLOSED_POSITIONS", 150), window),
            activity: RateLimit::new(env_or("RATE_LIMIT_ACTIVITY", 150), window),
        };

        let retry = RetryConfig {
            max_retries: env_or("RETRY_MAX_ATTEMPTS", 5),
            base_delay_ms: env_or("RETRY_BASE_DELAY_MS", 1000),
        };

        let defaults = CollectorConfig::default();
        let collector = CollectorConfig {
            mode: defaults.mode,
            concurrency: env_or("COLLECTOR_CONCURRENCY", defaults.concurrency),
            discovery_page_size: env_or("DISCOVERY_PAGE_SIZE", defaults.discovery_page_size),
            activity_page_size: env_or("ACTIVITY_PAGE_SIZE", defaults.activity_page_size),
            activity_max_pages: env_or("ACTIVITY_MAX_PAGES", defaults.activity_max_pages),
            activity_lookback_days: env_or("ACTIVITY_LOOKBACK_DAYS", defaults.activity_lookback_days),
            early_stop_min_trades: env_or("EARLY_STOP_MIN_TRADES", defaults.early_stop_min_trades),
            early_stop_min_volume: env_or("EARLY_STOP_MIN_VOLUME", defaults.early_stop_min_volume),
            positions_limit: defaults.positions_limit,
        };

        let config = Self {
            database_path,
            data_api_url,
            request_timeout_secs,
            throttle,
            retry,
            collector,
            weights: ScoringWeights::default(),
            selection: SelectionCriteria::default(),
        };
        config.validate()?;

        Ok(config)
    }

    /// Reject settings that would stall or spin the collector
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("RATE_LIMIT_DISCOVERY", self.throttle.discovery),
            ("RATE_LIMIT_POSITIONS", self.throttle.positions),
            ("RATE_LIMIT_CLOSED_POSITIONS", self.throttle.closed_positions),
            ("RATE_LIMIT_ACTIVITY", self.throttle.activity),
        ];
        for (name, limit) in limits {
            if limit.max_requests == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }
        if self.collector.discovery_page_size == 0 || self.collector.activity_page_size == 0 {
            anyhow::bail!("page sizes must be greater than zero");
        }
        if self.collector.concurrency == 0 {
            anyhow::bail!("COLLECTOR_CONCURRENCY must be greater than zero");
        }
        Ok(())
    }
}

/// Data API configuration
pub struct DataApi;

impl DataApi {
    pub const BASE_URL: &'static str = "https://data-api.polymarket.com";

    pub fn trades_url(base: &str) -> String {
        format!("{}/trades", base.trim_end_matches('/'))
    }

    pub fn positions_url(base: &str) -> String {
        format!("{}/positions", base.trim_end_matches('/'))
    }

    pub fn closed_positions_url(base: &str) -> String {
        format!("{}/closed-positions", base.trim_end_matches('/'))
    }

    pub fn activity_url(base: &str) -> String {
        format!("{}/activity", base.trim_end_matches('/'))
    }
}
