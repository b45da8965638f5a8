//! Composite scoring of derived account metrics
//!
//! score = w_wr * effective_win_rate + w_vol * normalized_volume + w_conf * confidence
//!
//! Volume is log-scaled and saturates at $1,000,000 so that very large
//! accounts gain nothing further from volume alone.

use crate::config::ScoringWeights;
use crate::types::{DerivedMetrics, ReasonTag, ScoreBreakdown, ScoredAccount};

/// Volume at which the volume term saturates
pub const VOLUME_CAP_USD: f64 = 1_000_000.0;

/// Log-scaled volume in [0, 1]
pub fn normalized_volume(volume: f64) -> f64 {
    if volume.is_nan() || volume <= 0.0 {
        return 0.0;
    }
    ((volume + 1.0).log10() / (VOLUME_CAP_USD + 1.0).log10()).min(1.0)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Deterministic metrics -> score transformation
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    weights: ScoringWeights,
}

impl Scorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn score(&self, metrics: DerivedMetrics) -> ScoredAccount {
        let win_rate = metrics.effective_win_rate().unwrap_or(0.0);

        let breakdown = ScoreBreakdown {
            win_rate: self.weights.win_rate * win_rate,
            volume: self.weights.volume * normalized_volume(metrics.total_volume_usd),
            confidence: self.weights.confidence * metrics.confidence_score,
        };
        let composite_score = round4(breakdown.win_rate + breakdown.volume + breakdown.confidence);

        ScoredAccount {
            reason_tags: reason_tags(&metrics),
            metrics,
            composite_score,
            score_breakdown: breakdown,
        }
    }

    pub fn score_all(&self, metrics: Vec<DerivedMetrics>) -> Vec<ScoredAccount> {
        metrics.into_iter().map(|m| self.score(m)).collect()
    }
}

/// Qualitative labels. Each family is evaluated independently.
pub fn reason_tags(m: &DerivedMetrics) -> Vec<ReasonTag> {
    let mut tags = Vec::new();

    match m.strict_win_rate {
        Some(r) if r >= 0.6 => tags.push(ReasonTag::HighWinrate),
        Some(r) if r >= 0.5 => tags.push(ReasonTag::MediumWinrate),
        _ => {}
    }

    if m.total_volume_usd >= 10_000.0 {
        tags.push(ReasonTag::HighVolume);
    } else if m.total_volume_usd >= 1_000.0 {
        tags.push(ReasonTag::MediumVolume);
    }

    if m.confidence_score >= 0.5 {
        tags.push(ReasonTag::HighConfidence);
    } else if m.confidence_score >= 0.3 {
        tags.push(ReasonTag::MediumConfidence);
    }

    if m.total_trades >= 100 {
        tags.push(ReasonTag::ActiveTrader);
    } else if m.total_trades >= 20 {
        tags.push(ReasonTag::RegularTrader);
    }

    if m.realized_pnl > 0.0 {
        tags.push(ReasonTag::Profitable);
    } else if m.realized_pnl < 0.0 {
        tags.push(ReasonTag::LossMaking);
    }

    if m.strict_win_rate.is_some_and(|r| r >= 0.55) && m.closed_positions_count >= 10 {
        tags.push(ReasonTag::ConsistentWinner);
    }

    tags
}
