//! End-to-end evaluation run
//!
//! discover -> screen/enrich -> score -> select -> persist. Per-address
//! problems are collected as `CollectionError`s and never fail the run; only
//! errors escaping the collector (discovery unreachable, cancellation,
//! storage of the run itself) mark the run failed.

use crate::collector::{summarize_errors, Collector};
use crate::config::{CollectionMode, ScoringWeights, SelectionCriteria};
use crate::data_api::DataApiSource;
use crate::scoring::Scorer;
use crate::selection::Selector;
use crate::services::metrics::MetricsSnapshot;
use crate::types::{Address, CollectionError, ScoredAccount, SelectionResult, SelectionSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{error, info, warn};

/// Settings recorded with a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub mode: CollectionMode,
    pub discover_count: usize,
    pub explicit_addresses: usize,
    pub criteria: SelectionCriteria,
    pub weights: ScoringWeights,
}

/// Counters recorded when a run completes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub addresses_evaluated: usize,
    pub screened_out: usize,
    pub scored: usize,
    pub passed_filters: usize,
    pub selected: usize,
    pub error_count: usize,
    pub errors_by_type: BTreeMap<String, usize>,
    pub storage_failures: usize,
    pub summary: SelectionSummary,
    pub metrics: MetricsSnapshot,
}

/// Storage collaborator. Each call is independent.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn create_run(&self, config: &RunConfig) -> Result<String>;
    async fn upsert_account(&self, run_id: &str, account: &ScoredAccount) -> Result<()>;
    async fn create_snapshot(&self, run_id: &str, account: &ScoredAccount) -> Result<()>;
    async fn record_selected(&self, run_id: &str, selected: &[ScoredAccount]) -> Result<()>;
    async fn complete_run(&self, run_id: &str, stats: &RunStats) -> Result<()>;
    async fn fail_run(&self, run_id: &str, error: &str) -> Result<()>;
}

/// What to evaluate in a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Trades-feed records to scan when no addresses are given
    pub discover_count: usize,
    /// Evaluate exactly these addresses instead of discovering
    pub addresses: Vec<Address>,
    pub criteria: SelectionCriteria,
}

/// Everything a caller needs to report on a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub selection: SelectionResult,
    pub scored: Vec<ScoredAccount>,
    pub errors: Vec<CollectionError>,
    pub stats: RunStats,
}

pub struct Pipeline<A: DataApiSource, S: RunStore> {
    collector: Collector<A>,
    scorer: Scorer,
    store: S,
    mode: CollectionMode,
}

impl<A: DataApiSource, S: RunStore> Pipeline<A, S> {
    pub fn new(collector: Collector<A>, scorer: Scorer, store: S, mode: CollectionMode) -> Self {
        Self {
            collector,
            scorer,
            store,
            mode,
        }
    }

    pub fn collector(&self) -> &Collector<A> {
        &self.collector
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Execute one run and record its outcome with the store
    pub async fn run(&self, options: RunOptions) -> Result<RunReport> {
        let run_config = RunConfig {
            mode: self.mode,
            discover_count: options.discover_count,
            explicit_addresses: options.addresses.len(),
            criteria: options.criteria.clone(),
            weights: *self.scorer.weights(),
        };
        let run_id = self
            .store
            .create_run(&run_config)
            .await
            .context("Failed to create run")?;
        info!("[Pipeline] run {} started", run_id);

        let outcome = match self.execute(&run_id, &options).await {
            Ok(report) => self
                .store
                .complete_run(&run_id, &report.stats)
                .await
                .context("Failed to complete run")
                .map(|_| report),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(report) => {
                info!(
                    "[Pipeline] run {} completed: {} selected, {} errors",
                    run_id, report.stats.selected, report.stats.error_count
                );
                Ok(report)
            }
            Err(e) => {
                error!("[Pipeline] run {} failed: {:#}", run_id, e);
                if let Err(store_err) = self.store.fail_run(&run_id, &format!("{:#}", e)).await {
                    error!("[Pipeline] could not mark run {} failed: {:#}", run_id, store_err);
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, run_id: &str, options: &RunOptions) -> Result<RunReport> {
        let addresses = self.resolve_addresses(options).await?;
        self.ensure_not_cancelled()?;

        let outcome = self.collector.evaluate(addresses.clone(), &options.criteria).await;
        self.ensure_not_cancelled()?;

        let scored = self.scorer.score_all(outcome.metrics);
        let selection = Selector::new(options.criteria.clone()).select(&scored);

        let errors_by_type = summarize_errors(&outcome.errors);
        for (kind, count) in &errors_by_type {
            warn!("[Pipeline] {} {} errors", count, kind);
        }

        let storage_failures = self.persist(run_id, &scored).await;
        self.store
            .record_selected(run_id, &selection.selected)
            .await
            .context("Failed to record selected accounts")?;

        let metrics = self.collector.metrics().snapshot();
        info!(
            "[Pipeline] api calls {} (errors {}, retries {}), activity pages {} (early stops {})",
            metrics.api_calls_total,
            metrics.api_errors_total,
            metrics.api_retries,
            metrics.activity_pages,
            metrics.activity_early_stops
        );

        let stats = RunStats {
            addresses_evaluated: addresses.len(),
            screened_out: outcome.screened_out,
            scored: scored.len(),
            passed_filters: selection.stats.passed_filters,
            selected: selection.stats.selected_count,
            error_count: outcome.errors.len(),
            errors_by_type,
            storage_failures,
            summary: selection.summary.clone(),
            metrics,
        };

        Ok(RunReport {
            run_id: run_id.to_string(),
            selection,
            scored,
            errors: outcome.errors,
            stats,
        })
    }

    /// Explicit addresses (deduplicated, order kept) or discovered ones
    async fn resolve_addresses(&self, options: &RunOptions) -> Result<Vec<Address>> {
        if !options.addresses.is_empty() {
            let mut seen = HashSet::new();
            return Ok(options
                .addresses
                .iter()
                .filter(|a| seen.insert(a.as_str()))
                .cloned()
                .collect());
        }

        let discovered = self
            .collector
            .discover_addresses(options.discover_count)
            .await
            .context("Failed to discover addresses")?;
        let mut addresses: Vec<Address> = discovered.into_iter().collect();
        addresses.sort();
        Ok(addresses)
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.collector.cancel_token().is_cancelled() {
            anyhow::bail!("run cancelled");
        }
        Ok(())
    }

    /// Upsert and snapshot every account; returns the number of failures
    async fn persist(&self, run_id: &str, scored: &[ScoredAccount]) -> usize {
        let mut failures = 0;
        for account in scored {
            if let Err(e) = self.store.upsert_account(run_id, account).await {
                warn!("[Pipeline] upsert {} failed: {:#}", account.address(), e);
                failures += 1;
            }
            if let Err(e) = self.store.create_snapshot(run_id, account).await {
                warn!("[Pipeline] snapshot {} failed: {:#}", account.address(), e);
                failures += 1;
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectorConfig;
    use crate::testing::{activity_page, closed_with, fast_collector, position, FakeApi};
    use crate::types::RawTrade;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        runs: Mutex<Vec<(String, String)>>,
        accounts: Mutex<Vec<String>>,
        snapshots: Mutex<Vec<String>>,
        selected: Mutex<Vec<String>>,
        failing_upserts: HashSet<String>,
        failing_complete: bool,
    }

    impl MemoryStore {
        fn status(&self, run_id: &str) -> Option<String> {
            self.runs
                .lock()
                .unwrap()
                .iter()
                .find(|(id, _)| id == run_id)
                .map(|(_, status)| status.clone())
        }

        fn set_status(&self, run_id: &str, status: &str) {
            for run in self.runs.lock().unwrap().iter_mut() {
                if run.0 == run_id {
                    run.1 = status.to_string();
                }
            }
        }
    }

    #[async_trait]
    impl RunStore for MemoryStore {
        async fn create_run(&self, _config: &RunConfig) -> Result<String> {
            let mut runs = self.runs.lock().unwrap();
            let id = format!("run-{}", runs.len() + 1);
            runs.push((id.clone(), "running".to_string()));
            Ok(id)
        }

        async fn upsert_account(&self, _run_id: &str, account: &ScoredAccount) -> Result<()> {
            if self.failing_upserts.contains(account.address()) {
                anyhow::bail!("disk full");
            }
            self.accounts.lock().unwrap().push(account.address().to_string());
            Ok(())
        }

        async fn create_snapshot(&self, _run_id: &str, account: &ScoredAccount) -> Result<()> {
            self.snapshots.lock().unwrap().push(account.address().to_string());
            Ok(())
        }

        async fn record_selected(&self, _run_id: &str, selected: &[ScoredAccount]) -> Result<()> {
            let mut rows = self.selected.lock().unwrap();
            rows.extend(selected.iter().map(|a| a.address().to_string()));
            Ok(())
        }

        async fn complete_run(&self, run_id: &str, _stats: &RunStats) -> Result<()> {
            if self.failing_complete {
                anyhow::bail!("database is locked");
            }
            self.set_status(run_id, "completed");
            Ok(())
        }

        async fn fail_run(&self, run_id: &str, error: &str) -> Result<()> {
            self.set_status(run_id, &format!("failed: {error}"));
            Ok(())
        }
    }

    fn criteria() -> SelectionCriteria {
        SelectionCriteria {
            min_trades: 1,
            min_volume: 0.0,
            min_win_rate: 0.5,
            min_confidence: 0.0,
            min_pnl: 0.0,
            top_n: 10,
        }
    }

    fn options(addresses: &[&str]) -> RunOptions {
        RunOptions {
            discover_count: 100,
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
            criteria: criteria(),
        }
    }

    fn pipeline(api: FakeApi, store: MemoryStore) -> Pipeline<FakeApi, MemoryStore> {
        let collector = fast_collector(api, CollectorConfig::default());
        Pipeline::new(collector, Scorer::default(), store, CollectionMode::TwoPhase)
    }

    fn good_trader(api: FakeApi, address: &str, volume: f64) -> FakeApi {
        let now = Utc::now().timestamp();
        api.with_closed(address, closed_with(&[5.0, 5.0, 5.0, -1.0]))
            .with_positions(address, vec![position(1.0, 10.0), position(2.0, 5.0)])
            .with_activity_pages(address, vec![activity_page(now, 5, volume / 5.0)])
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_selects_and_persists() {
        let api = good_trader(FakeApi::default(), "0xbig", 50_000.0);
        let api = good_trader(api, "0xsmall", 500.0);
        let api = api.with_closed("0xloser", closed_with(&[-5.0, -5.0, 1.0]));
        let p = pipeline(api, MemoryStore::default());

        let report = p.run(options(&["0xsmall", "0xbig", "0xloser"])).await.unwrap();

        let selected: Vec<_> = report.selection.selected.iter().map(|a| a.address()).collect();
        assert_eq!(selected, vec!["0xbig", "0xsmall"]);
        assert_eq!(report.stats.screened_out, 1);
        assert_eq!(report.stats.scored, 2);
        assert_eq!(report.stats.error_count, 0);
        assert_eq!(p.store().status(&report.run_id).as_deref(), Some("completed"));
        assert_eq!(p.store().accounts.lock().unwrap().len(), 2);
        assert_eq!(p.store().snapshots.lock().unwrap().len(), 2);
        assert_eq!(*p.store().selected.lock().unwrap(), vec!["0xbig", "0xsmall"]);
        assert_eq!(p.collector().api().calls_for("positions", "0xloser"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrichment_failure_still_scored() {
        let api = FakeApi::default()
            .with_closed("0xdegraded", closed_with(&[5.0, 5.0, -1.0]))
            .failing_positions("0xdegraded", 500)
            .failing_activity("0xdegraded", 500);
        let p = pipeline(api, MemoryStore::default());

        let report = p.run(options(&["0xdegraded"])).await.unwrap();

        assert_eq!(report.scored.len(), 1);
        assert_eq!(report.scored[0].metrics.win_count, 2);
        assert_eq!(report.stats.errors_by_type.get("enrichment_failed"), Some(&1));
        // No trades collected, so it cannot pass min_trades
        assert!(report.selection.selected.is_empty());
        assert_eq!(p.store().status(&report.run_id).as_deref(), Some("completed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_failure_fails_run() {
        let api = FakeApi::default().failing_trades(404);
        let p = pipeline(api, MemoryStore::default());

        let err = p.run(options(&[])).await.unwrap_err();
        assert!(format!("{:#}", err).contains("discover"));
        let status = p.store().status("run-1").unwrap();
        assert!(status.starts_with("failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovered_addresses_are_evaluated() {
        let trade = |w: &str| RawTrade {
            proxy_wallet: Some(w.to_string()),
            ..Default::default()
        };
        let api = good_trader(FakeApi::default(), "0xfound", 5_000.0)
            .with_trade_pages(vec![vec![trade("0xfound"), trade("0xfound")]]);
        let p = pipeline(api, MemoryStore::default());

        let report = p.run(options(&[])).await.unwrap();
        assert_eq!(report.stats.addresses_evaluated, 1);
        assert_eq!(report.selection.selected[0].address(), "0xfound");
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failure_does_not_block_others() {
        let api = good_trader(FakeApi::default(), "0xa", 5_000.0);
        let api = good_trader(api, "0xb", 5_000.0);
        let store = MemoryStore {
            failing_upserts: ["0xa".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let p = pipeline(api, store);

        let report = p.run(options(&["0xa", "0xb"])).await.unwrap();
        assert_eq!(report.stats.storage_failures, 1);
        assert_eq!(*p.store().accounts.lock().unwrap(), vec!["0xb"]);
        assert_eq!(p.store().snapshots.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_failure_marks_run_failed() {
        let api = good_trader(FakeApi::default(), "0xa", 5_000.0);
        let store = MemoryStore {
            failing_complete: true,
            ..Default::default()
        };
        let p = pipeline(api, store);

        let err = p.run(options(&["0xa"])).await.unwrap_err();
        assert!(format!("{:#}", err).contains("complete run"));
        let status = p.store().status("run-1").unwrap();
        assert!(status.starts_with("failed"), "status {}", status);
        assert!(status.contains("database is locked"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_is_failed() {
        let api = good_trader(FakeApi::default(), "0xa", 5_000.0);
        let p = pipeline(api, MemoryStore::default());
        p.collector().cancel_token().cancel();

        let err = p.run(options(&["0xa"])).await.unwrap_err();
        assert!(err.to_string().contains("cancelled"));
        assert!(p.store().status("run-1").unwrap().starts_with("failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_explicit_addresses_evaluated_once() {
        let api = good_trader(FakeApi::default(), "0xa", 5_000.0);
        let p = pipeline(api, MemoryStore::default());

        let report = p.run(options(&["0xa", "0xa"])).await.unwrap();
        assert_eq!(report.stats.addresses_evaluated, 1);
        assert_eq!(p.collector().api().calls_for("closed_positions", "0xa"), 1);
    }
}
