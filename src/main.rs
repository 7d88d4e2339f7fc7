use chrono::Utc;
use clap::Parser;
use momentumbot::api::{BenzingaClient, NoNews, YahooClient};
use momentumbot::breakout::BreakoutValidator;
use momentumbot::config::BotConfig;
use momentumbot::execution::{DryRunExecutor, LifecycleEngine, Orchestrator};
use momentumbot::filters::{FilterChain, SessionClock};
use momentumbot::models::Signal;
use momentumbot::notify::{messages, spawn_worker, LogNotifier, Notifications, Notifier, TelegramNotifier};
use momentumbot::risk::{PerformanceReport, RiskLedger};
use momentumbot::watchlist::FileWatchlist;
use momentumbot::{MarketData, NewsSource, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

const NOTIFY_DRAIN_TIMEOUT_SECS: u64 = 10;

#[derive(Parser, Debug)]
#[command(name = "momentumbot", version, about = "US equities momentum trading bot")]
struct Cli {
    /// Print the performance report from the ledger and exit
    #[arg(long)]
    report: bool,

    /// Run a single scan, print the top signals and exit without trading
    #[arg(long)]
    scan_once: bool,

    /// Configuration file (TOML, JSON or YAML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds between cycles
    #[arg(long)]
    interval: Option<u64>,

    /// Starting capital in dollars
    #[arg(long)]
    capital: Option<f64>,

    /// Debug logging for the bot
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = BotConfig::load(cli.config.as_deref())?;
    if let Some(interval) = cli.interval {
        config.run_loop.cycle_interval_secs = interval;
    }
    if let Some(capital) = cli.capital {
        config.trading.risk.capital = capital;
    }
    config.validate()?;

    let clock = SessionClock::new(config.session.clone())?;

    if cli.report {
        return print_performance_report(&config, &clock);
    }

    if !config.trading.dry_run {
        return Err(
            "live order routing is not available; set trading.dry_run = true to run the simulator"
                .into(),
        );
    }

    tracing::info!("🚀 MomentumBot starting (DRY RUN)");

    // ========================================================================
    // Collaborators
    // ========================================================================

    let market: Arc<dyn MarketData> = Arc::new(YahooClient::new()?);
    let news = create_news_source()?;
    let (notifications, notify_worker) = spawn_worker(
        create_notifier(),
        config.notify.queue_capacity,
        chrono::Duration::seconds(config.notify.cooldown_secs),
    );

    let watchlist = Arc::new(FileWatchlist::load(
        &config.paths.watchlist,
        &config.paths.secondary_watchlist,
        &config.paths.blacklist,
    )?);
    let watchlist_size = watchlist.stats().total_count;

    ensure_parent_dir(&config.paths.ledger)?;
    let ledger = RiskLedger::open(
        config.trading.risk.clone(),
        clock.timezone(),
        &config.paths.ledger,
    )?;
    let capital = ledger.capital();

    log_configuration(&config, watchlist_size, capital);

    let chain = FilterChain::new(
        market,
        news,
        watchlist,
        clock.clone(),
        config.filters.clone(),
    );
    let engine = LifecycleEngine::new(
        chain,
        BreakoutValidator::new(config.breakout.clone()),
        ledger,
        Arc::new(DryRunExecutor::new()),
        notifications.clone(),
        config.lifecycle.clone(),
    );

    // ========================================================================
    // Single scan
    // ========================================================================

    if cli.scan_once {
        let snapshot = engine.scan_once(Utc::now()).await;
        println!("\n🌡️  {}", snapshot.overview);
        print_signals(&snapshot.signals, config.run_loop.top_signals_shown);
        drop(engine);
        drain_notifications(notifications, notify_worker).await;
        return Ok(());
    }

    // ========================================================================
    // Trading loop
    // ========================================================================

    notifications.send(messages::startup(
        watchlist_size,
        capital,
        config.trading.dry_run,
        &clock.local(Utc::now()),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("\n⚠️  Received Ctrl+C, finishing current cycle...");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
                // Keep the sender alive so the loop is not stopped by accident
                std::future::pending::<()>().await;
            }
        }
    });

    let orchestrator = Orchestrator::new(
        engine,
        notifications.clone(),
        Duration::from_secs(config.run_loop.cycle_interval_secs),
    );
    let summary = orchestrator.run(shutdown_rx).await;

    drain_notifications(notifications, notify_worker).await;
    tracing::info!(
        "👋 MomentumBot stopped after {} cycle(s), total P&L ${:+.2}",
        summary.cycles,
        summary.total_pnl
    );
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging(verbose: bool) {
    let default_directive = if verbose {
        "momentumbot=debug"
    } else {
        "momentumbot=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_news_source() -> Result<Arc<dyn NewsSource>> {
    match std::env::var("BENZINGA_API_KEY") {
        Ok(api_key) if !api_key.trim().is_empty() => {
            tracing::info!("📰 Benzinga news source enabled");
            Ok(Arc::new(BenzingaClient::new(api_key)?))
        }
        _ => {
            tracing::warn!("BENZINGA_API_KEY not set, news and earnings checks are unavailable");
            Ok(Arc::new(NoNews))
        }
    }
}

fn create_notifier() -> Arc<dyn Notifier> {
    let token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
    let chat_id = std::env::var("TELEGRAM_CHAT_ID").unwrap_or_default();

    if token.is_empty() || chat_id.is_empty() {
        tracing::warn!("Telegram credentials not set, notifications go to the log");
        return Arc::new(LogNotifier);
    }

    tracing::info!("📱 Telegram notifications enabled");
    Arc::new(TelegramNotifier::new(token, chat_id))
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn log_configuration(config: &BotConfig, watchlist_size: usize, capital: f64) {
    let risk = &config.trading.risk;

    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Capital: ${:.2}", capital);
    tracing::info!(
        "  Position size: {}% | Max positions: {}",
        risk.position_size_pct * 100.0,
        risk.max_positions
    );
    tracing::info!(
        "  Stop-loss: -{}% | Take-profit: +{}%",
        risk.stop_loss_pct * 100.0,
        risk.take_profit_pct * 100.0
    );
    tracing::info!(
        "  Loss limits: daily -{}% | weekly -{}%",
        risk.daily_loss_limit * 100.0,
        risk.weekly_loss_limit * 100.0
    );
    tracing::info!("  Watchlist: {} tickers", watchlist_size);
    tracing::info!("  Cycle interval: {}s", config.run_loop.cycle_interval_secs);
    tracing::info!(
        "  News gates: {}",
        if config.filters.news.fail_closed {
            "fail-closed"
        } else {
            "fail-open"
        }
    );
}

// ============================================================================
// Output
// ============================================================================

fn print_performance_report(config: &BotConfig, clock: &SessionClock) -> Result<()> {
    let ledger = RiskLedger::open(
        config.trading.risk.clone(),
        clock.timezone(),
        &config.paths.ledger,
    )?;

    match PerformanceReport::from_closed(ledger.closed_positions(), clock.timezone()) {
        Some(report) => report.print_report(),
        None => println!(
            "No closed positions in {}, nothing to report",
            config.paths.ledger.display()
        ),
    }
    Ok(())
}

fn print_signals(signals: &[Signal], top: usize) {
    if signals.is_empty() {
        println!("\nNo signals this scan");
        return;
    }

    println!("\n🎯 TOP SIGNALS ({} found)", signals.len());
    println!("{}", "─".repeat(72));
    for (rank, signal) in signals.iter().take(top).enumerate() {
        let flow = match signal.orderflow_signal {
            1 => "buyers",
            -1 => "sellers",
            _ => "balanced",
        };
        println!(
            "{:>2}. {:<6} score {:>3} | {:<20} | volume x{:<5.2} | bid {:>3.0}% ({}) | ${:.2}",
            rank + 1,
            signal.ticker,
            signal.score,
            signal.pattern.kind.to_string(),
            signal.volume_ratio,
            signal.bid_pressure_pct,
            flow,
            signal.price
        );
        if let (Some(support), Some(resistance)) = (signal.support, signal.resistance) {
            println!(
                "    support ${:.2} | resistance ${:.2}",
                support, resistance
            );
        }
    }
}

async fn drain_notifications(notifications: Notifications, worker: JoinHandle<()>) {
    drop(notifications);
    if tokio::time::timeout(Duration::from_secs(NOTIFY_DRAIN_TIMEOUT_SECS), worker)
        .await
        .is_err()
    {
        tracing::warn!("⚠️  Notification queue not drained before exit");
    }
}
