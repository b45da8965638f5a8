//! Polymarket Trader Scout Library
//!
//! Finds consistently profitable accounts on Polymarket's public data API:
//!
//! 1. **Collect**: discover addresses from the trades feed, screen them on
//!    closed positions, then enrich the survivors with open positions and
//!    activity. Every request is paced per endpoint and retried on transient
//!    failures.
//!
//! 2. **Score & select**: blend win rate, log-scaled volume and confidence
//!    into a composite score, filter on thresholds and keep the top N.

pub mod collector;
pub mod config;
pub mod data_api;
pub mod db;
pub mod performance;
pub mod pipeline;
pub mod scoring;
pub mod selection;
pub mod services;
pub mod types;

#[cfg(test)]
mod testing;

pub use collector::{CollectionOutcome, Collector};
pub use config::{CollectionMode, CollectorConfig, Config, ScoringWeights, SelectionCriteria};
pub use data_api::{DataApiClient, DataApiSource};
pub use db::Database;
pub use pipeline::{Pipeline, RunOptions, RunReport, RunStore};
pub use scoring::Scorer;
pub use selection::Selector;
pub use types::{DerivedMetrics, ReasonTag, ScoredAccount, SelectionResult};
