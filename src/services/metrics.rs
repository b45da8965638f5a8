//! Metrics collection for monitoring collector request usage

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Collected metrics for one collection run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Data API stats
    pub api_calls_total: u64,
    pub api_errors_total: u64,
    pub api_retries: u64,
    pub throttled_waits: u64,
    /// Two-phase funnel
    pub addresses_screened: u64,
    pub addresses_passed_screen: u64,
    pub addresses_enriched: u64,
    pub enrichment_fallbacks: u64,
    /// Activity pagination
    pub activity_pages: u64,
    pub activity_early_stops: u64,
}

/// Thread-safe metrics collector
#[derive(Debug, Clone, Default)]
pub struct CollectorMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    api_calls_total: AtomicU64,
    api_errors_total: AtomicU64,
    api_retries: AtomicU64,
    throttled_waits: AtomicU64,
    addresses_screened: AtomicU64,
    addresses_passed_screen: AtomicU64,
    addresses_enriched: AtomicU64,
    enrichment_fallbacks: AtomicU64,
    activity_pages: AtomicU64,
    activity_early_stops: AtomicU64,
}

impl CollectorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_api_calls(&self) {
        self.inner.api_calls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_api_errors(&self) {
        self.inner.api_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_api_retries(&self) {
        self.inner.api_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_throttled_waits(&self) {
        self.inner.throttled_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_screened(&self) {
        self.inner.addresses_screened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_passed_screen(&self) {
        self.inner.addresses_passed_screen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_enriched(&self) {
        self.inner.addresses_enriched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_enrichment_fallbacks(&self) {
        self.inner.enrichment_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_activity_pages(&self) {
        self.inner.activity_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_activity_early_stops(&self) {
        self.inner.activity_early_stops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            api_calls_total: self.inner.api_calls_total.load(Ordering::Relaxed),
            api_errors_total: self.inner.api_errors_total.load(Ordering::Relaxed),
            api_retries: self.inner.api_retries.load(Ordering::Relaxed),
            throttled_waits: self.inner.throttled_waits.load(Ordering::Relaxed),
            addresses_screened: self.inner.addresses_screened.load(Ordering::Relaxed),
            addresses_passed_screen: self.inner.addresses_passed_screen.load(Ordering::Relaxed),
            addresses_enriched: self.inner.addresses_enriched.load(Ordering::Relaxed),
            enrichment_fallbacks: self.inner.enrichment_fallbacks.load(Ordering::Relaxed),
            activity_pages: self.inner.activity_pages.load(Ordering::Relaxed),
            activity_early_stops: self.inner.activity_early_stops.load(Ordering::Relaxed),
        }
    }
}
