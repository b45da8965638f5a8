//! Account data collector
//!
//! Pulls raw records for each address from the data API and turns them into
//! `DerivedMetrics`. Every upstream call goes through the shared
//! `RateLimiter` for its endpoint class and the retry policy.
//!
//! Two-phase strategy:
//! 1. Screen: fetch closed positions only and drop addresses whose decided
//!    win rate or closed PnL already misses the run's thresholds.
//! 2. Enrich: fetch open positions and paginated activity concurrently for
//!    the survivors. If both fail, the phase 1 metrics are kept.

use crate::config::{CollectionMode, CollectorConfig, SelectionCriteria};
use crate::data_api::{ActivityQuery, DataApiSource};
use crate::performance::{compute_metrics, ScreenEstimate};
use crate::services::api_errors::DataApiError;
use crate::services::metrics::CollectorMetrics;
use crate::services::rate_limiter::{EndpointClass, RateLimiter};
use crate::services::retry::{with_retry, RetryConfig};
use crate::types::{
    Address, CollectionError, CollectionErrorKind, DataSource, DerivedMetrics, RawActivity,
    RawClosedPosition, RawPosition,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of evaluating a single address
#[derive(Debug, Default)]
pub struct AddressOutcome {
    pub metrics: Option<DerivedMetrics>,
    pub errors: Vec<CollectionError>,
    /// Dropped by the phase 1 thresholds
    pub screened_out: bool,
}

impl AddressOutcome {
    fn failed(error: CollectionError) -> Self {
        Self {
            errors: vec![error],
            ..Default::default()
        }
    }

    fn cancelled(address: &str) -> Self {
        Self::failed(CollectionError::new(
            address,
            CollectionErrorKind::Cancelled,
            "run cancelled",
        ))
    }
}

/// Result of evaluating a batch of addresses
#[derive(Debug, Default)]
pub struct CollectionOutcome {
    pub metrics: Vec<DerivedMetrics>,
    pub errors: Vec<CollectionError>,
    pub screened_out: usize,
}

/// Error counts keyed by error type
pub fn summarize_errors(errors: &[CollectionError]) -> BTreeMap<String, usize> {
    let mut summary = BTreeMap::new();
    for e in errors {
        *summary.entry(e.kind.to_string()).or_insert(0) += 1;
    }
    summary
}

pub struct Collector<A: DataApiSource> {
    api: A,
    config: CollectorConfig,
    retry: RetryConfig,
    limiter: Arc<RateLimiter>,
    metrics: CollectorMetrics,
    cancel: CancellationToken,
}

impl<A: DataApiSource> Collector<A> {
    pub fn new(
        api: A,
        config: CollectorConfig,
        retry: RetryConfig,
        limiter: Arc<RateLimiter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            config,
            retry,
            limiter,
            metrics: CollectorMetrics::new(),
            cancel,
        }
    }

    pub fn metrics(&self) -> &CollectorMetrics {
        &self.metrics
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// One paced, retried upstream call
    async fn call<T, F, Fut>(
        &self,
        class: EndpointClass,
        operation: &str,
        mut f: F,
    ) -> Result<T, DataApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DataApiError>>,
    {
        let mut attempts: u64 = 0;
        let result = with_retry(&self.retry, operation, &self.cancel, || {
            attempts += 1;
            let request = f();
            async move {
                if self.limiter.acquire(class, &self.cancel).await? {
                    self.metrics.inc_throttled_waits();
                }
                self.metrics.inc_api_calls();
                let result = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Err(DataApiError::Cancelled),
                    result = request => result,
                };
                if result.is_err() {
                    self.metrics.inc_api_errors();
                }
                result
            }
        })
        .await;

        for _ in 1..attempts {
            self.metrics.inc_api_retries();
        }
        result
    }

    // ==================== DISCOVERY ====================

    /// Scan up to `count` records of the trades feed and collect the distinct
    /// wallets found. Stops early when the feed runs out.
    pub async fn discover_addresses(&self, count: usize) -> Result<HashSet<Address>, DataApiError> {
        let mut addresses = HashSet::new();
        let mut scanned = 0usize;
        let page_size = self.config.discovery_page_size.max(1) as usize;

        while scanned < count {
            let limit = page_size.min(count - scanned) as u32;
            let offset = scanned as u32;

            let page = self
                .call(EndpointClass::Discovery, "discovery", || {
                    self.api.fetch_trades(limit, offset)
                })
                .await?;

            let len = page.len();
            scanned += len;
            addresses.extend(
                page.into_iter()
                    .filter_map(|t| t.proxy_wallet)
                    .map(|w| w.trim().to_string())
                    .filter(|w| !w.is_empty()),
            );

            debug!(
                "[Collector] discovery page offset={} records={} unique={}",
                offset,
                len,
                addresses.len()
            );

            if len < limit as usize {
                break;
            }
        }

        info!(
            "[Collector] discovered {} addresses from {} trades",
            addresses.len(),
            scanned
        );
        Ok(addresses)
    }

    // ==================== RAW SOURCES ====================

    pub async fn fetch_positions(&self, address: &str) -> Result<Vec<RawPosition>, DataApiError> {
        self.call(EndpointClass::Positions, "positions", || {
            self.api.fetch_positions(address)
        })
        .await
    }

    pub async fn fetch_closed_positions(
        &self,
        address: &str,
    ) -> Result<Vec<RawClosedPosition>, DataApiError> {
        self.call(EndpointClass::ClosedPositions, "closed_positions", || {
            self.api.fetch_closed_positions(address)
        })
        .await
    }

    /// Page through an address's activity, newest first.
    ///
    /// The cursor is inclusive: the next page ends at the oldest second seen
    /// and skips the records of that second already collected, so trades
    /// sharing a timestamp across a page boundary are neither lost nor
    /// counted twice.
    ///
    /// Stops at the page cap, when the feed runs out, when the lookback
    /// lower bound is passed, or once enough trades or volume have been
    /// collected.
    pub async fn fetch_all_activity(&self, address: &str) -> Result<Vec<RawActivity>, DataApiError> {
        let cfg = &self.config;
        let start = Utc::now().timestamp() - cfg.activity_lookback_days * 86_400;
        let mut end: Option<i64> = None;
        let mut offset: u32 = 0;
        let mut records: Vec<RawActivity> = Vec::new();
        let mut volume = 0.0;

        for page_no in 0..cfg.activity_max_pages {
            let query = ActivityQuery {
                limit: cfg.activity_page_size,
                start: Some(start),
                end,
                offset,
            };
            let page = self
                .call(EndpointClass::Activity, "activity", || {
                    self.api.fetch_activity(address, query)
                })
                .await?;
            self.metrics.inc_activity_pages();

            let len = page.len();
            let oldest = page.iter().map(|a| a.timestamp).min();
            let at_oldest = oldest.map_or(0, |ts| page.iter().filter(|a| a.timestamp == ts).count());
            for record in page.into_iter().filter(|a| a.timestamp >= start) {
                volume += record.usdc_size;
                records.push(record);
            }

            if records.len() as u64 >= cfg.early_stop_min_trades || volume >= cfg.early_stop_min_volume {
                self.metrics.inc_activity_early_stops();
                debug!(
                    "[Collector] {} activity early stop after {} pages ({} trades, ${:.0})",
                    address,
                    page_no + 1,
                    records.len(),
                    volume
                );
                break;
            }

            if len < cfg.activity_page_size as usize {
                break;
            }

            match oldest {
                Some(ts) if ts >= start => {
                    // Still inside the same second: skip everything seen in it so far
                    offset = if end == Some(ts) {
                        offset + at_oldest as u32
                    } else {
                        at_oldest as u32
                    };
                    end = Some(ts);
                }
                _ => break,
            }
        }

        Ok(records)
    }

    // ==================== EVALUATION ====================

    /// Fetch all three sources at once and build the metrics.
    /// A failing source is treated as empty and recorded.
    pub async fn collect_address(&self, address: &str) -> AddressOutcome {
        let (positions, closed, activity) = tokio::join!(
            self.fetch_positions(address),
            self.fetch_closed_positions(address),
            self.fetch_all_activity(address),
        );

        if [positions.as_ref().err(), closed.as_ref().err(), activity.as_ref().err()]
            .into_iter()
            .flatten()
            .any(DataApiError::is_cancelled)
        {
            return AddressOutcome::cancelled(address);
        }

        let mut errors = Vec::new();
        let mut failed = Vec::new();
        let positions = settle(address, DataSource::Positions, positions, &mut failed, &mut errors);
        let closed = settle(address, DataSource::ClosedPositions, closed, &mut failed, &mut errors);
        let activity = settle(address, DataSource::Activity, activity, &mut failed, &mut errors);

        self.metrics.inc_enriched();
        AddressOutcome {
            metrics: Some(compute_metrics(address, &positions, &closed, &activity, failed)),
            errors,
            screened_out: false,
        }
    }

    /// Screen on closed positions, then enrich the survivors
    pub async fn evaluate_address(&self, address: &str, criteria: &SelectionCriteria) -> AddressOutcome {
        self.metrics.inc_screened();

        let closed = match self.fetch_closed_positions(address).await {
            Ok(closed) => closed,
            Err(e) if e.is_cancelled() => return AddressOutcome::cancelled(address),
            Err(e) => {
                warn!("[Collector] {} screen failed: {}", address, e);
                return AddressOutcome::failed(CollectionError::new(
                    address,
                    CollectionErrorKind::ScreenFailed,
                    e.to_string(),
                ));
            }
        };

        let estimate = ScreenEstimate::from_closed(&closed);
        if !estimate.passes(criteria.min_win_rate, criteria.min_pnl) {
            debug!(
                "[Collector] {} screened out (win rate {:?}, closed pnl {:.2})",
                address, estimate.strict_win_rate, estimate.realized_pnl
            );
            return AddressOutcome {
                screened_out: true,
                ..Default::default()
            };
        }
        self.metrics.inc_passed_screen();

        let (positions, activity) = tokio::join!(
            self.fetch_positions(address),
            self.fetch_all_activity(address),
        );

        match (positions, activity) {
            (Err(p), _) if p.is_cancelled() => AddressOutcome::cancelled(address),
            (_, Err(a)) if a.is_cancelled() => AddressOutcome::cancelled(address),
            (Err(p), Err(a)) => {
                warn!(
                    "[Collector] {} enrichment failed, keeping screen metrics: positions: {}; activity: {}",
                    address, p, a
                );
                self.metrics.inc_enrichment_fallbacks();
                let metrics = compute_metrics(
                    address,
                    &[],
                    &closed,
                    &[],
                    vec![DataSource::Positions, DataSource::Activity],
                );
                AddressOutcome {
                    metrics: Some(metrics),
                    errors: vec![CollectionError::new(
                        address,
                        CollectionErrorKind::EnrichmentFailed,
                        format!("positions: {}; activity: {}", p, a),
                    )],
                    screened_out: false,
                }
            }
            (positions, activity) => {
                let mut errors = Vec::new();
                let mut failed = Vec::new();
                let positions = settle(address, DataSource::Positions, positions, &mut failed, &mut errors);
                let activity = settle(address, DataSource::Activity, activity, &mut failed, &mut errors);

                self.metrics.inc_enriched();
                AddressOutcome {
                    metrics: Some(compute_metrics(address, &positions, &closed, &activity, failed)),
                    errors,
                    screened_out: false,
                }
            }
        }
    }

    /// Evaluate a batch with up to `concurrency` addresses in flight.
    /// Per-address failures are collected, never propagated.
    pub async fn evaluate(
        &self,
        addresses: Vec<Address>,
        criteria: &SelectionCriteria,
    ) -> CollectionOutcome {
        let total = addresses.len();
        let mode = self.config.mode;
        info!(
            "[Collector] evaluating {} addresses ({:?}, concurrency {})",
            total, mode, self.config.concurrency
        );

        let outcomes: Vec<AddressOutcome> = stream::iter(addresses)
            .map(|address| async move {
                match mode {
                    CollectionMode::TwoPhase => self.evaluate_address(&address, criteria).await,
                    CollectionMode::Full => self.collect_address(&address).await,
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut result = CollectionOutcome::default();
        for outcome in outcomes {
            if outcome.screened_out {
                result.screened_out += 1;
            }
            result.metrics.extend(outcome.metrics);
            result.errors.extend(outcome.errors);
        }

        info!(
            "[Collector] {} of {} addresses produced metrics ({} screened out, {} errors)",
            result.metrics.len(),
            total,
            result.screened_out,
            result.errors.len()
        );
        result
    }
}

/// Unwrap one source result, recording the failure and substituting empty data
fn settle<T>(
    address: &str,
    source: DataSource,
    result: Result<Vec<T>, DataApiError>,
    failed: &mut Vec<DataSource>,
    errors: &mut Vec<CollectionError>,
) -> Vec<T> {
    match result {
        Ok(records) => records,
        Err(e) => {
            warn!("[Collector] {} {} unavailable: {}", address, source, e);
            failed.push(source);
            errors.push(CollectionError::new(
                address,
                CollectionErrorKind::SourceFailed,
                format!("{}: {}", source, e),
            ));
            Vec::new()
        }
    }
}
