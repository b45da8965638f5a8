//! In-memory data API used by collector and pipeline tests

use crate::collector::Collector;
use crate::config::CollectorConfig;
use crate::data_api::{ActivityQuery, DataApiSource};
use crate::services::api_errors::DataApiError;
use crate::services::rate_limiter::{RateLimit, RateLimiter, ThrottleConfig};
use crate::services::retry::RetryConfig;
use crate::types::{RawActivity, RawClosedPosition, RawPosition, RawTrade};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Key = (&'static str, String);

/// Scripted responses plus per-endpoint call counters.
/// Unscripted addresses answer with empty lists.
#[derive(Default)]
pub struct FakeApi {
    trade_pages: Vec<Vec<RawTrade>>,
    positions: HashMap<String, Vec<RawPosition>>,
    closed: HashMap<String, Vec<RawClosedPosition>>,
    activity: HashMap<String, Vec<Vec<RawActivity>>>,
    timelines: HashMap<String, Vec<RawActivity>>,
    delays: HashMap<&'static str, Duration>,
    failures: HashMap<Key, u16>,
    flaky: Mutex<HashMap<Key, VecDeque<u16>>>,
    calls: Mutex<HashMap<Key, usize>>,
    activity_queries: Mutex<Vec<ActivityQuery>>,
}

impl FakeApi {
    pub fn with_trade_pages(mut self, pages: Vec<Vec<RawTrade>>) -> Self {
        self.trade_pages = pages;
        self
    }

    pub fn with_positions(mut self, address: &str, positions: Vec<RawPosition>) -> Self {
        self.positions.insert(address.to_string(), positions);
        self
    }

    pub fn with_closed(mut self, address: &str, closed: Vec<RawClosedPosition>) -> Self {
        self.closed.insert(address.to_string(), closed);
        self
    }

    pub fn with_activity_pages(mut self, address: &str, pages: Vec<Vec<RawActivity>>) -> Self {
        self.activity.insert(address.to_string(), pages);
        self
    }

    /// Serve activity by query window like the real endpoint: newest first,
    /// `start..=end`, skipping `offset`, at most `limit` records
    pub fn with_activity_timeline(mut self, address: &str, mut records: Vec<RawActivity>) -> Self {
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.timelines.insert(address.to_string(), records);
        self
    }

    /// Answer every call to `endpoint` only after `delay`
    pub fn with_delay(mut self, endpoint: &'static str, delay: Duration) -> Self {
        self.delays.insert(endpoint, delay);
        self
    }

    pub fn failing_trades(mut self, status: u16) -> Self {
        self.failures.insert(("trades", String::new()), status);
        self
    }

    pub fn failing_positions(mut self, address: &str, status: u16) -> Self {
        self.failures.insert(("positions", address.to_string()), status);
        self
    }

    pub fn failing_closed(mut self, address: &str, status: u16) -> Self {
        self.failures.insert(("closed_positions", address.to_string()), status);
        self
    }

    pub fn failing_activity(mut self, address: &str, status: u16) -> Self {
        self.failures.insert(("activity", address.to_string()), status);
        self
    }

    /// Fail the first calls with the given statuses, then answer normally
    pub fn flaky_closed(self, address: &str, statuses: Vec<u16>) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(("closed_positions", address.to_string()), statuses.into());
        self
    }

    /// Total calls to an endpoint across all addresses
    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|((e, _), _)| *e == endpoint)
            .map(|(_, n)| n)
            .sum()
    }

    pub fn calls_for(&self, endpoint: &'static str, address: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(&(endpoint, address.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn activity_queries(&self) -> Vec<ActivityQuery> {
        self.activity_queries.lock().unwrap().clone()
    }

    /// Count the call and return its 0-based index, or the scripted failure
    async fn record(&self, endpoint: &'static str, address: &str) -> Result<usize, DataApiError> {
        if let Some(delay) = self.delays.get(endpoint) {
            tokio::time::sleep(*delay).await;
        }

        let key = (endpoint, address.to_string());
        let index = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(key.clone()).or_insert(0);
            *n += 1;
            *n - 1
        };

        if let Some(status) = self.failures.get(&key) {
            return Err(DataApiError::from_response(*status, "scripted failure"));
        }
        if let Some(queue) = self.flaky.lock().unwrap().get_mut(&key) {
            if let Some(status) = queue.pop_front() {
                return Err(DataApiError::from_response(status, "scripted failure"));
            }
        }
        Ok(index)
    }
}

#[async_trait]
impl DataApiSource for FakeApi {
    async fn fetch_trades(&self, _limit: u32, _offset: u32) -> Result<Vec<RawTrade>, DataApiError> {
        let index = self.record("trades", "").await?;
        Ok(self.trade_pages.get(index).cloned().unwrap_or_default())
    }

    async fn fetch_positions(&self, address: &str) -> Result<Vec<RawPosition>, DataApiError> {
        self.record("positions", address).await?;
        Ok(self.positions.get(address).cloned().unwrap_or_default())
    }

    async fn fetch_closed_positions(
        &self,
        address: &str,
    ) -> Result<Vec<RawClosedPosition>, DataApiError> {
        self.record("closed_positions", address).await?;
        Ok(self.closed.get(address).cloned().unwrap_or_default())
    }

    async fn fetch_activity(
        &self,
        address: &str,
        query: ActivityQuery,
    ) -> Result<Vec<RawActivity>, DataApiError> {
        self.activity_queries.lock().unwrap().push(query);
        let index = self.record("activity", address).await?;
        if let Some(timeline) = self.timelines.get(address) {
            return Ok(timeline
                .iter()
                .filter(|a| query.start.map_or(true, |s| a.timestamp >= s))
                .filter(|a| query.end.map_or(true, |e| a.timestamp <= e))
                .skip(query.offset as usize)
                .take(query.limit as usize)
                .cloned()
                .collect());
        }
        Ok(self
            .activity
            .get(address)
            .and_then(|pages| pages.get(index))
            .cloned()
            .unwrap_or_default())
    }
}

/// Collector over a fake API with generous limits and millisecond backoff
pub fn fast_collector(api: FakeApi, config: CollectorConfig) -> Collector<FakeApi> {
    let limit = RateLimit::new(1_000, Duration::from_secs(1));
    let limiter = RateLimiter::new(&ThrottleConfig {
        discovery: limit,
        positions: limit,
        closed_positions: limit,
        activity: limit,
    });
    let retry = RetryConfig {
        max_retries: 3,
        base_delay_ms: 1,
    };
    Collector::new(api, config, retry, Arc::new(limiter), CancellationToken::new())
}

pub fn closed_with(pnls: &[f64]) -> Vec<RawClosedPosition> {
    pnls.iter()
        .enumerate()
        .map(|(i, &realized_pnl)| RawClosedPosition {
            condition_id: format!("c{i}"),
            realized_pnl,
            ..Default::default()
        })
        .collect()
}

pub fn position(cash_pnl: f64, realized_pnl: f64) -> RawPosition {
    RawPosition {
        cash_pnl,
        realized_pnl,
        ..Default::default()
    }
}

/// `count` trades of `usdc_size` each, one second apart, newest first
pub fn activity_page(newest: i64, count: usize, usdc_size: f64) -> Vec<RawActivity> {
    (0..count)
        .map(|i| RawActivity {
            side: "BUY".to_string(),
            usdc_size,
            timestamp: newest - i as i64,
            ..Default::default()
        })
        .collect()
}
