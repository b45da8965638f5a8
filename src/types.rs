//! Core types for the trader scout

use crate::config::SelectionCriteria;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Trader identifier (proxy wallet address). Join key across all records.
pub type Address = String;

// ==================== RAW DATA API RECORDS ====================

/// One record from the public trades feed, used only for address discovery
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTrade {
    #[serde(default)]
    pub proxy_wallet: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub size: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: f64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: i64,
}

/// An open position held by an address
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPosition {
    #[serde(default, alias = "proxyWallet", deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub condition_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub outcome: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub size: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub avg_price: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cash_pnl: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub realized_pnl: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cur_price: f64,
}

/// A settled position. The sign of `realized_pnl` decides win/loss/neutral.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawClosedPosition {
    #[serde(default, alias = "proxyWallet", deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub condition_id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub outcome: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub realized_pnl: f64,
    #[serde(default, alias = "timestamp", deserialize_with = "lenient_opt_i64")]
    pub resolved_at: Option<i64>,
}

/// One trade/transaction event of an address
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActivity {
    #[serde(default, alias = "proxyWallet", deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub side: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub size: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub usdc_size: f64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: i64,
}

/// Accepts a string or null. Null and non-string values become empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Accepts a JSON number, a numeric string or null. Anything else, and
/// non-finite values, become zero.
fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(parsed.filter(|v| v.is_finite()).unwrap_or(0.0))
}

fn lenient_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_i64(deserializer)?.unwrap_or(0))
}

// ==================== DERIVED METRICS ====================

/// The three per-address data sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Positions,
    ClosedPositions,
    Activity,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Positions => write!(f, "positions"),
            DataSource::ClosedPositions => write!(f, "closed_positions"),
            DataSource::Activity => write!(f, "activity"),
        }
    }
}

/// Performance metrics of one address for one collection cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub address: Address,
    /// wins / (wins + losses) over closed positions, None when nothing decided
    pub strict_win_rate: Option<f64>,
    /// Share of open positions with positive cash PnL, None without positions
    pub proxy_win_rate: Option<f64>,
    pub confidence_score: f64,
    pub total_trades: u64,
    pub total_volume_usd: f64,
    pub realized_pnl: f64,
    pub win_count: u64,
    pub loss_count: u64,
    pub closed_positions_count: u64,
    pub positions_count: u64,
    pub partial_success: bool,
    pub failed_sources: Vec<DataSource>,
}

impl DerivedMetrics {
    /// Strict win rate if decided, otherwise the proxy rate
    pub fn effective_win_rate(&self) -> Option<f64> {
        resolve_win_rate(self.strict_win_rate, self.proxy_win_rate)
    }
}

/// Win-rate precedence: the strict rate always wins over the proxy
pub fn resolve_win_rate(strict: Option<f64>, proxy: Option<f64>) -> Option<f64> {
    strict.or(proxy)
}

// ==================== SCORING ====================

/// Qualitative labels attached by the scorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonTag {
    HighWinrate,
    MediumWinrate,
    HighVolume,
    MediumVolume,
    HighConfidence,
    MediumConfidence,
    ActiveTrader,
    RegularTrader,
    Profitable,
    LossMaking,
    ConsistentWinner,
}

impl ReasonTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonTag::HighWinrate => "high_winrate",
            ReasonTag::MediumWinrate => "medium_winrate",
            ReasonTag::HighVolume => "high_volume",
            ReasonTag::MediumVolume => "medium_volume",
            ReasonTag::HighConfidence => "high_confidence",
            ReasonTag::MediumConfidence => "medium_confidence",
            ReasonTag::ActiveTrader => "active_trader",
            ReasonTag::RegularTrader => "regular_trader",
            ReasonTag::Profitable => "profitable",
            ReasonTag::LossMaking => "loss_making",
            ReasonTag::ConsistentWinner => "consistent_winner",
        }
    }
}

impl fmt::Display for ReasonTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-term contributions to the composite score
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub win_rate: f64,
    pub volume: f64,
    pub confidence: f64,
}

/// Derived metrics plus their composite score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAccount {
    #[serde(flatten)]
    pub metrics: DerivedMetrics,
    pub composite_score: f64,
    pub reason_tags: Vec<ReasonTag>,
    pub score_breakdown: ScoreBreakdown,
}

impl ScoredAccount {
    pub fn address(&self) -> &str {
        &self.metrics.address
    }

    pub fn tags_display(&self) -> String {
        self.reason_tags
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ==================== SELECTION ====================

/// Aggregate statistics over the selected accounts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionSummary {
    pub count: usize,
    pub avg_win_rate: f64,
    pub avg_volume: f64,
    pub avg_score: f64,
    pub total_volume: f64,
    pub profitable_count: usize,
    pub profitable_fraction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionStats {
    pub total_input: usize,
    pub passed_filters: usize,
    pub selected_count: usize,
    pub criteria_used: SelectionCriteria,
}

/// Ranked, thresholded output of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub selected: Vec<ScoredAccount>,
    pub summary: SelectionSummary,
    pub stats: SelectionStats,
}

// ==================== COLLECTION ERRORS ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionErrorKind {
    /// Phase 1 closed-position fetch failed; address dropped
    ScreenFailed,
    /// One data source failed; metrics are partial
    SourceFailed,
    /// Phase 2 failed entirely; phase 1 metrics kept
    EnrichmentFailed,
    /// Run cancelled before the address finished
    Cancelled,
}

impl CollectionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionErrorKind::ScreenFailed => "screen_failed",
            CollectionErrorKind::SourceFailed => "source_failed",
            CollectionErrorKind::EnrichmentFailed => "enrichment_failed",
            CollectionErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CollectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-address failure. Never fails the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionError {
    pub address: Address,
    pub kind: CollectionErrorKind,
    pub message: String,
}

impl CollectionError {
    pub fn new(address: &str, kind: CollectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            address: address.to_string(),
            kind,
            message: message.into(),
        }
    }
}
