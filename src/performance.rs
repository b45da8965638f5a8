//! Performance metrics derived from raw data API records
//!
//! Pure functions: no I/O, no failure modes. Missing sources arrive as empty
//! slices and only ever make fields null or zero.

use crate::types::{DataSource, DerivedMetrics, RawActivity, RawClosedPosition, RawPosition};

/// Win/loss tally over closed positions. Zero-PnL outcomes count for neither.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WinLoss {
    pub wins: u64,
    pub losses: u64,
}

impl WinLoss {
    pub fn from_closed(closed: &[RawClosedPosition]) -> Self {
        closed.iter().fold(Self::default(), |mut acc, p| {
            if p.realized_pnl > 0.0 {
                acc.wins += 1;
            } else if p.realized_pnl < 0.0 {
                acc.losses += 1;
            }
            acc
        })
    }

    pub fn decided(&self) -> u64 {
        self.wins + self.losses
    }

    /// None iff no position was decided
    pub fn rate(&self) -> Option<f64> {
        match self.decided() {
            0 => None,
            n => Some(self.wins as f64 / n as f64),
        }
    }
}

/// Cheap phase 1 estimate from closed positions only
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenEstimate {
    pub strict_win_rate: Option<f64>,
    /// Sum of realized PnL across closed positions
    pub realized_pnl: f64,
    pub closed_positions_count: u64,
}

impl ScreenEstimate {
    pub fn from_closed(closed: &[RawClosedPosition]) -> Self {
        Self {
            strict_win_rate: WinLoss::from_closed(closed).rate(),
            realized_pnl: closed.iter().map(|p| p.realized_pnl).sum(),
            closed_positions_count: closed.len() as u64,
        }
    }

    /// Whether the address is worth enriching.
    ///
    /// An undecided win rate passes: the proxy rate computed in phase 2 may
    /// still qualify the address.
    pub fn passes(&self, min_win_rate: f64, min_pnl: f64) -> bool {
        if let Some(rate) = self.strict_win_rate {
            if rate < min_win_rate {
                return false;
            }
        }
        self.realized_pnl >= min_pnl
    }
}

/// Share of open positions currently in profit
pub fn proxy_win_rate(positions: &[RawPosition]) -> Option<f64> {
    if positions.is_empty() {
        return None;
    }
    let in_profit = positions.iter().filter(|p| p.cash_pnl > 0.0).count();
    Some(in_profit as f64 / positions.len() as f64)
}

/// Build the full metrics record for one address
pub fn compute_metrics(
    address: &str,
    positions: &[RawPosition],
    closed: &[RawClosedPosition],
    activity: &[RawActivity],
    failed_sources: Vec<DataSource>,
) -> DerivedMetrics {
    let tally = WinLoss::from_closed(closed);

    let confidence_score = if positions.is_empty() {
        0.0
    } else {
        tally.decided() as f64 / positions.len() as f64
    };

    // Realized PnL is read from the open positions' realized component
    let realized_pnl = positions.iter().map(|p| p.realized_pnl).sum();

    DerivedMetrics {
        address: address.to_string(),
        strict_win_rate: tally.rate(),
        proxy_win_rate: proxy_win_rate(positions),
        confidence_score,
        total_trades: activity.len() as u64,
        total_volume_usd: activity.iter().map(|a| a.usdc_size).sum(),
        realized_pnl,
        win_count: tally.wins,
        loss_count: tally.losses,
        closed_positions_count: closed.len() as u64,
        positions_count: positions.len() as u64,
        partial_success: !failed_sources.is_empty(),
        failed_sources,
    }
}
