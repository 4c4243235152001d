//! Opportunity Scheduler - Main Entry Point
//!
//! Scans CSV bar data on a fixed cadence and paper-executes admitted signals.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use opportunity_scheduler::config::Config;
use opportunity_scheduler::exchange::PaperExecutor;
use opportunity_scheduler::market::CsvMarketData;
use opportunity_scheduler::persistence::{NullRecorder, ScanRecorder, ScanStore};
use opportunity_scheduler::strategy::{StrategyKind, StrategyManager};
use rust_decimal_macros::dec;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Opportunity Scheduler CLI
#[derive(Parser)]
#[command(name = "opportunity-scheduler")]
#[command(version, about = "Multi-strategy opportunity detection and capital-bounded scheduling")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scan / admit / execute loop with the paper executor
    Run {
        /// Directory of <SYMBOL>.csv bar files
        #[arg(short, long, default_value = "data/bars")]
        data_dir: String,

        /// Stop after this many cycles (runs until Ctrl-C otherwise)
        #[arg(short, long)]
        cycles: Option<u64>,
    },

    /// Run a single scan and print ranked signals without executing
    Scan {
        /// Directory of <SYMBOL>.csv bar files
        #[arg(short, long, default_value = "data/bars")]
        data_dir: String,
    },

    /// Load and validate configuration, then print it
    CheckConfig,

    /// Summarise recorded scan decisions and closed trades
    Stats {
        /// Path to SQLite database (default: data/scans.db)
        #[arg(long, default_value = "data/scans.db")]
        db: String,

        /// Number of recent decisions to list
        #[arg(short, long, default_value = "10")]
        recent: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    match cli.command {
        Some(Commands::Run { data_dir, cycles }) => run(&data_dir, cycles).await,
        Some(Commands::Scan { data_dir }) => scan_once(&data_dir).await,
        Some(Commands::CheckConfig) => check_config(),
        Some(Commands::Stats { db, recent }) => show_stats(&db, recent),
        None => run("data/bars", None).await,
    }
}

/// Load configuration and fail fast on invalid values.
fn load_config() -> Result<Config> {
    let config = Config::load()?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run(data_dir: &str, cycles: Option<u64>) -> Result<()> {
    info!("╔════════════════════════════════════════════════════════════╗");
    info!(
        "║       Opportunity Scheduler v{} - Paper Trading         ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚════════════════════════════════════════════════════════════╝");

    let config = load_config()?;
    log_config(&config);

    let provider = CsvMarketData::load_dir(data_dir)?;
    let recorder: Arc<dyn ScanRecorder> = if config.persistence.enabled {
        Arc::new(ScanStore::new(&config.persistence.db_path)?)
    } else {
        info!("📂 [PERSISTENCE] Disabled, scan decisions will not be stored");
        Arc::new(NullRecorder)
    };
    let paper = Arc::new(PaperExecutor::new());
    let interval_secs = config.scheduler.scan_interval_secs.max(1);
    let manager = StrategyManager::from_config(config, paper.clone(), recorder)?;

    // Shutdown signal
    let shutdown = Arc::new(AtomicBool::new(false));
    let wake = Arc::new(Notify::new());
    {
        let shutdown = shutdown.clone();
        let wake = wake.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("🛑 Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
            wake.notify_one();
        });
    }

    // An overrunning cycle delays the next tick instead of bunching them
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("🚀 Starting scan loop (every {}s)...", interval_secs);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut completed = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        tokio::select! {
            _ = interval.tick() => {}
            _ = wake.notified() => break,
        }

        let summary = manager.run_cycle(&provider, Utc::now()).await;
        completed += 1;
        if summary.failed > 0 || summary.failed_fetches > 0 {
            warn!(
                failed = summary.failed,
                failed_fetches = summary.failed_fetches,
                "⚠️  Cycle {} completed with errors",
                completed
            );
        }

        if cycles.is_some_and(|limit| completed >= limit) {
            info!("Reached cycle limit ({})", completed);
            break;
        }
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("📊 Final state after {} cycles", completed);
    for pool in manager.ledger().snapshot() {
        let stats = manager.performance().stats(pool.kind);
        info!(
            "   {:<8} used ${:.2} / ${:.2} | trades {} | win rate {:.1}% | PnL ${:.2}",
            pool.kind.as_str(),
            pool.used,
            pool.capacity,
            stats.trades(),
            stats.win_rate() * 100.0,
            stats.realized_pnl
        );
    }
    info!(
        "   Open positions: {} | Paper PnL: ${:.2}",
        paper.open_positions().await.len(),
        paper.realized_pnl().await
    );

    Ok(())
}

async fn scan_once(data_dir: &str) -> Result<()> {
    let config = load_config()?;
    let provider = CsvMarketData::load_dir(data_dir)?;
    let manager = StrategyManager::from_config(
        config,
        Arc::new(PaperExecutor::new()),
        Arc::new(NullRecorder),
    )?;

    let snapshot = manager.fetch_snapshot(&provider, Utc::now()).await;
    let outcome = manager.scan_for_opportunities(&snapshot);

    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              OPPORTUNITY SCAN                              ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!(
        "\n🌐 Regime: {} | Symbols: {} | Detected: {} | Near misses: {}",
        outcome.regime,
        snapshot.len(),
        outcome.detected,
        outcome.near_misses
    );

    if outcome.signals.is_empty() {
        println!("\n   No signals this cycle.");
        return Ok(());
    }

    println!(
        "\n   {:>3}  {:<12} {:<8} {:<5} {:>6} {:>8} {:>8} {:>10}",
        "#", "SYMBOL", "STRATEGY", "SIDE", "CONF", "PRIORITY", "EV", "CAPITAL"
    );
    for (rank, signal) in outcome.signals.iter().enumerate() {
        println!(
            "   {:>3}  {:<12} {:<8} {:<5} {:>6.3} {:>8.3} {:>+7.2}% {:>10.2}",
            rank + 1,
            signal.symbol(),
            signal.kind().as_str(),
            signal.setup.side().to_string(),
            signal.confidence,
            signal.priority,
            signal.expected_value * 100.0,
            signal.required_capital
        );
    }

    Ok(())
}

fn check_config() -> Result<()> {
    let config = load_config()?;
    log_config(&config);
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!("\n✅ Configuration is valid");
    Ok(())
}

fn show_stats(db_path: &str, recent: usize) -> Result<()> {
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              SCAN STORE STATISTICS                         ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    if !Path::new(db_path).exists() {
        println!("\n❌ Database not found: {}", db_path);
        println!("   The scheduler has not recorded any scans yet, or the path is incorrect.");
        return Ok(());
    }

    let store = ScanStore::new(db_path)?;

    let counts = store.decision_counts()?;
    println!("\n🔍 Scan Decisions");
    for decision in ["TAKE", "NEAR_MISS", "SKIP"] {
        println!("   ├─ {:<10} {}", decision, counts.get(decision).copied().unwrap_or(0));
    }

    let pnl = store.realized_pnl_by_strategy()?;
    println!("\n💰 Realised PnL");
    for kind in StrategyKind::ALL {
        let value = pnl.get(kind.as_str()).copied().unwrap_or(dec!(0));
        println!("   ├─ {:<10} ${:.2}", kind.as_str(), value);
    }

    let rows = store.recent_decisions(recent)?;
    if !rows.is_empty() {
        println!("\n🕒 Recent Decisions");
        for (symbol, strategy, decision) in rows {
            println!("   ├─ {:<12} {:<8} {}", symbol, strategy, decision);
        }
    }

    Ok(())
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "opportunity-scheduler.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("opportunity_scheduler=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!("   Total Capital: ${}", config.capital.total_capital);
    info!(
        "   Reserve: {:.0}%",
        config.capital.reserve_fraction * dec!(100)
    );
    for kind in StrategyKind::ALL {
        let alloc = config.capital.allocations.get(kind);
        info!(
            "   {} pool: {:.0}% (${:.0}), {:.0}% per position",
            kind.as_str(),
            alloc.allocation_fraction * dec!(100),
            config.pool_capital(kind),
            alloc.position_fraction * dec!(100)
        );
    }
    info!("   Conflict Policy: {:?}", config.scheduler.conflict_policy);
    info!("   Scorer: {:?}", config.scheduler.scorer);
    info!(
        "   Min Confidence: {:.2} | Min R/R: {:.2}",
        config.scheduler.min_confidence, config.scheduler.min_risk_reward
    );
    info!("   Reference Symbol: {}", config.scheduler.reference_symbol);
}
