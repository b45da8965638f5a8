//! Polymarket Trader Scout CLI
//!
//! Evaluates trading accounts from the public data API and stores ranked runs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use trader_scout::db::RunRecord;
use trader_scout::services::RateLimiter;
use trader_scout::{
    CollectionMode, Collector, Config, DataApiClient, Database, Pipeline, RunOptions, RunReport,
    ScoredAccount, Scorer, SelectionCriteria,
};

#[derive(Parser)]
#[command(name = "trader-scout")]
#[command(about = "Find and rank consistently profitable Polymarket traders")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, evaluate and rank accounts
    Run {
        /// Trades-feed records to scan for addresses
        #[arg(short = 'n', long, default_value = "1000")]
        count: usize,

        /// Maximum number of accounts to select
        #[arg(short, long)]
        top_n: Option<usize>,

        /// Minimum number of trades in the activity window
        #[arg(long)]
        min_trades: Option<u64>,

        /// Minimum traded volume in USD
        #[arg(long)]
        min_volume: Option<f64>,

        /// Minimum win rate (0-1)
        #[arg(long)]
        min_win_rate: Option<f64>,

        /// Minimum confidence score
        #[arg(long)]
        min_confidence: Option<f64>,

        /// Minimum realized PnL in USD
        #[arg(long, allow_hyphen_values = true)]
        min_pnl: Option<f64>,

        /// Evaluate these addresses instead of discovering (repeatable)
        #[arg(short, long = "address")]
        addresses: Vec<String>,

        /// Fetch every source for every address, skipping the screen
        #[arg(long)]
        single_phase: bool,

        /// Addresses evaluated at once
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Show the accounts selected in a run
    Show {
        /// Run id as printed by `run` or `runs`
        run_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins when set
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    match cli.command {
        Commands::Run {
            count,
            top_n,
            min_trades,
            min_volume,
            min_win_rate,
            min_confidence,
            min_pnl,
            addresses,
            single_phase,
            concurrency,
        } => {
            let defaults = config.selection.clone();
            let criteria = SelectionCriteria {
                min_trades: min_trades.unwrap_or(defaults.min_trades),
                min_volume: min_volume.unwrap_or(defaults.min_volume),
                min_win_rate: min_win_rate.unwrap_or(defaults.min_win_rate),
                min_confidence: min_confidence.unwrap_or(defaults.min_confidence),
                min_pnl: min_pnl.unwrap_or(defaults.min_pnl),
                top_n: top_n.unwrap_or(defaults.top_n),
            };
            let options = RunOptions {
                discover_count: count,
                addresses,
                criteria,
            };
            run_scout(&config, options, single_phase, concurrency).await?
        }
        Commands::Runs { limit } => list_runs(&config, limit).await?,
        Commands::Show { run_id } => show_run(&config, &run_id).await?,
    }

    Ok(())
}

async fn run_scout(
    config: &Config,
    options: RunOptions,
    single_phase: bool,
    concurrency: Option<usize>,
) -> Result<()> {
    let mut collector_config = config.collector.clone();
    if single_phase {
        collector_config.mode = CollectionMode::Full;
    }
    if let Some(n) = concurrency {
        collector_config.concurrency = n.max(1);
    }
    let mode = collector_config.mode;

    println!("\n{}", "=".repeat(70));
    println!("  POLYMARKET TRADER SCOUT");
    if options.addresses.is_empty() {
        println!("  Source: trades feed ({} records)", options.discover_count);
    } else {
        println!("  Source: {} explicit addresses", options.addresses.len());
    }
    println!(
        "  Mode: {:?} | Concurrency: {} | Top N: {}",
        mode, collector_config.concurrency, options.criteria.top_n
    );
    println!(
        "  Filters: trades >= {} | volume >= ${:.0} | win rate >= {:.0}% | confidence >= {:.2} | pnl >= ${:.0}",
        options.criteria.min_trades,
        options.criteria.min_volume,
        options.criteria.min_win_rate * 100.0,
        options.criteria.min_confidence,
        options.criteria.min_pnl
    );
    println!("{}\n", "=".repeat(70));

    let db = Database::new(&config.database_path).await?;
    let api = DataApiClient::new(config).context("Failed to build data API client")?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, cancelling run...");
            signal_token.cancel();
        }
    });

    let collector = Collector::new(
        api,
        collector_config,
        config.retry.clone(),
        Arc::new(RateLimiter::new(&config.throttle)),
        cancel,
    );
    let pipeline = Pipeline::new(collector, Scorer::new(config.weights), db, mode);

    let report = pipeline.run(options).await?;
    print_report(&report);
    info!("Run {} stored in {}", report.run_id, config.database_path);

    Ok(())
}

fn print_report(report: &RunReport) {
    let stats = &report.stats;

    println!("\n{}", "=".repeat(70));
    println!("  RUN {}", report.run_id);
    println!("{}\n", "=".repeat(70));

    println!("Collection:");
    println!("  Addresses evaluated: {}", stats.addresses_evaluated);
    println!("  Screened out:        {}", stats.screened_out);
    println!("  Scored:              {}", stats.scored);
    println!("  Passed filters:      {}", stats.passed_filters);
    println!(
        "  API calls:           {} ({} errors, {} retries)",
        stats.metrics.api_calls_total, stats.metrics.api_errors_total, stats.metrics.api_retries
    );
    print_errors(&stats.errors_by_type);
    if stats.storage_failures > 0 {
        println!("  Storage failures:    {}", stats.storage_failures);
    }
    println!();

    print_accounts(&report.selection.selected);

    let summary = &report.selection.summary;
    println!("\n{}", "-".repeat(70));
    println!(
        "Selected {} | Avg win rate: {:.1}% | Avg score: {:.4} | Total volume: ${:.0}K | Profitable: {} ({:.0}%)",
        summary.count,
        summary.avg_win_rate * 100.0,
        summary.avg_score,
        summary.total_volume / 1000.0,
        summary.profitable_count,
        summary.profitable_fraction * 100.0
    );
    println!();
}

fn print_errors(errors_by_type: &BTreeMap<String, usize>) {
    if errors_by_type.is_empty() {
        println!("  Errors:              none");
        return;
    }
    let parts: Vec<String> = errors_by_type
        .iter()
        .map(|(kind, n)| format!("{} {}", n, kind))
        .collect();
    println!("  Errors:              {}", parts.join(", "));
}

fn print_accounts(accounts: &[ScoredAccount]) {
    if accounts.is_empty() {
        println!("No accounts passed the filters.\n");
        return;
    }

    println!("SELECTED ACCOUNTS");
    println!("{}", "-".repeat(70));

    for (i, account) in accounts.iter().enumerate() {
        let m = &account.metrics;
        let win_rate = m
            .effective_win_rate()
            .map(|r| format!("{:.1}%", r * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        let partial = if m.partial_success { " [PARTIAL]" } else { "" };

        println!("\n{}. {} | Score: {:.4}{}", i + 1, account.address(), account.composite_score, partial);
        println!(
            "   Win rate: {} ({}W/{}L) | Volume: ${:.0} | Trades: {}",
            win_rate, m.win_count, m.loss_count, m.total_volume_usd, m.total_trades
        );
        println!(
            "   PnL: ${:.2} | Confidence: {:.2} | Positions: {} open, {} closed",
            m.realized_pnl, m.confidence_score, m.positions_count, m.closed_positions_count
        );
        if !account.reason_tags.is_empty() {
            println!("   Tags: {}", account.tags_display());
        }
    }
}

async fn list_runs(config: &Config, limit: i64) -> Result<()> {
    let db = Database::new(&config.database_path).await?;
    let runs = db.list_runs(limit).await?;

    println!("\n{}", "=".repeat(70));
    println!("  RECENT RUNS");
    println!("{}\n", "=".repeat(70));

    if runs.is_empty() {
        println!("No runs recorded yet.\n");
        return Ok(());
    }

    for run in &runs {
        print_run_line(run);
    }
    println!();

    Ok(())
}

fn print_run_line(run: &RunRecord) {
    let detail = match (&run.stats, &run.error) {
        (Some(stats), _) => format!(
            "{} evaluated, {} selected, {} errors",
            stats.addresses_evaluated, stats.selected, stats.error_count
        ),
        (None, Some(error)) => format!("error: {}", error),
        (None, None) => String::new(),
    };
    println!(
        "{}  {}  {:<9}  {}",
        run.id,
        run.started_at.format("%Y-%m-%d %H:%M:%S"),
        run.status.to_string(),
        detail
    );
}

async fn show_run(config: &Config, run_id: &str) -> Result<()> {
    let db = Database::new(&config.database_path).await?;
    let run = db
        .get_run(run_id)
        .await?
        .with_context(|| format!("No run with id {}", run_id))?;

    println!("\n{}", "=".repeat(70));
    println!("  RUN {}", run.id);
    print_run_line(&run);
    println!("{}\n", "=".repeat(70));

    let selected = db.get_selected(run_id).await?;
    let accounts: Vec<ScoredAccount> = selected.into_iter().map(|s| s.account).collect();
    print_accounts(&accounts);
    println!();

    Ok(())
}
