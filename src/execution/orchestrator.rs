use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::execution::lifecycle::{CycleReport, CycleStatus, LifecycleEngine};
use crate::notify::{messages, Notifications};

/// End-of-session figures, printed and notified on shutdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub total_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub daily_pnl: f64,
    pub open_positions: usize,
}

/// Polling loop around the lifecycle engine
///
/// A failed cycle is logged and notified; the loop keeps going until shutdown.
pub struct Orchestrator {
    engine: LifecycleEngine,
    notifications: Notifications,
    interval: Duration,
    cycles: u64,
    failed_cycles: u64,
}

impl Orchestrator {
    pub fn new(engine: LifecycleEngine, notifications: Notifications, interval: Duration) -> Self {
        Self {
            engine,
            notifications,
            interval,
            cycles: 0,
            failed_cycles: 0,
        }
    }

    pub fn engine(&self) -> &LifecycleEngine {
        &self.engine
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn failed_cycles(&self) -> u64 {
        self.failed_cycles
    }

    /// One contained cycle; `None` when it failed
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Option<CycleReport> {
        self.cycles += 1;
        let local = self.engine.chain().clock().local(now);
        info!("🔄 Cycle #{} ({})", self.cycles, local.format("%Y-%m-%d %H:%M:%S"));

        match self.engine.run_cycle(now).await {
            Ok(report) => {
                if report.status == CycleStatus::Completed {
                    info!(
                        "✅ Cycle #{} done: {} exit(s), {} signal(s), entry: {}",
                        self.cycles,
                        report.exits.len(),
                        report.signals.len(),
                        report
                            .entry
                            .as_ref()
                            .map(|p| p.ticker.as_str())
                            .unwrap_or("none")
                    );
                }
                Some(report)
            }
            Err(e) => {
                self.failed_cycles += 1;
                error!("❌ Cycle #{} failed: {:#}", self.cycles, e);
                let text = messages::error(&format!("Cycle #{} failed: {:#}", self.cycles, e), &local);
                self.notifications.send(text);
                None
            }
        }
    }

    /// Cycle, then sleep, until `shutdown` flips to true
    ///
    /// A shutdown request during a cycle lets it finish; during the sleep it
    /// cuts the sleep short.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SessionSummary {
        info!(
            "🚀 Trading loop started (every {}s, Ctrl+C to stop)",
            self.interval.as_secs()
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_cycle(Utc::now()).await;

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("⚠️  Shutdown requested, stopping trading loop");
        self.finish(Utc::now())
    }

    pub fn session_summary(&self, now: DateTime<Utc>) -> SessionSummary {
        let ledger = self.engine.ledger();
        let stats = ledger.statistics();
        SessionSummary {
            cycles: self.cycles,
            failed_cycles: self.failed_cycles,
            total_trades: stats.total_trades,
            win_rate: stats.win_rate,
            total_pnl: stats.total_pnl,
            daily_pnl: ledger.daily_pnl_at(now),
            open_positions: ledger.open_positions().len(),
        }
    }

    /// Log and notify the session summary
    pub fn finish(&self, now: DateTime<Utc>) -> SessionSummary {
        let summary = self.session_summary(now);

        info!("\n📊 SESSION SUMMARY");
        info!("  Cycles: {} ({} failed)", summary.cycles, summary.failed_cycles);
        info!("  Trades: {}", summary.total_trades);
        info!("  Win rate: {:.1}%", summary.win_rate);
        info!("  Total P&L: ${:+.2}", summary.total_pnl);
        info!("  Daily P&L: ${:+.2}", summary.daily_pnl);
        info!("  Open positions: {}", summary.open_positions);

        let local = self.engine.chain().clock().local(now);
        self.notifications
            .send(messages::daily_summary(self.engine.ledger().statistics(), &local));
        self.notifications
            .send(messages::shutdown(summary.cycles, &local));

        summary
    }
}
