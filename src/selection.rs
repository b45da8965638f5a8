//! Threshold filtering and top-N ranking of scored accounts

use crate::config::SelectionCriteria;
use crate::types::{ScoredAccount, SelectionResult, SelectionStats, SelectionSummary};
use tracing::debug;

/// Filters, ranks and caps scored accounts
#[derive(Debug, Clone, Default)]
pub struct Selector {
    criteria: SelectionCriteria,
}

impl Selector {
    pub fn new(criteria: SelectionCriteria) -> Self {
        Self { criteria }
    }

    pub fn criteria(&self) -> &SelectionCriteria {
        &self.criteria
    }

    /// Whether an account meets every threshold
    pub fn passes(&self, account: &ScoredAccount) -> bool {
        let m = &account.metrics;
        let c = &self.criteria;

        // No win-rate signal at all is a rejection, whatever the threshold
        let win_rate_ok = m
            .effective_win_rate()
            .is_some_and(|r| r >= c.min_win_rate);

        m.total_trades >= c.min_trades
            && m.total_volume_usd >= c.min_volume
            && win_rate_ok
            && m.confidence_score >= c.min_confidence
            && m.realized_pnl >= c.min_pnl
    }

    pub fn select(&self, accounts: &[ScoredAccount]) -> SelectionResult {
        let mut passed: Vec<ScoredAccount> = accounts
            .iter()
            .filter(|a| self.passes(a))
            .cloned()
            .collect();
        let passed_filters = passed.len();

        // sort_by is stable: equal scores keep their input order
        passed.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
        passed.truncate(self.criteria.top_n);

        debug!(
            "[Selector] selected {} of {} accounts ({} passed filters)",
            passed.len(),
            accounts.len(),
            passed_filters
        );

        SelectionResult {
            summary: summarize(&passed),
            stats: SelectionStats {
                total_input: accounts.len(),
                passed_filters,
                selected_count: passed.len(),
                criteria_used: self.criteria.clone(),
            },
            selected: passed,
        }
    }
}

/// Aggregate statistics. An empty selection yields all zeros.
pub fn summarize(selected: &[ScoredAccount]) -> SelectionSummary {
    if selected.is_empty() {
        return SelectionSummary::default();
    }

    let n = selected.len() as f64;
    let total_volume: f64 = selected.iter().map(|a| a.metrics.total_volume_usd).sum();
    let win_rate_sum: f64 = selected
        .iter()
        .map(|a| a.metrics.effective_win_rate().unwrap_or(0.0))
        .sum();
    let score_sum: f64 = selected.iter().map(|a| a.composite_score).sum();
    let profitable_count = selected
        .iter()
        .filter(|a| a.metrics.realized_pnl > 0.0)
        .count();

    SelectionSummary {
        count: selected.len(),
        avg_win_rate: win_rate_sum / n,
        avg_volume: total_volume / n,
        avg_score: score_sum / n,
        total_volume,
        profitable_count,
        profitable_fraction: profitable_count as f64 / n,
    }
}
