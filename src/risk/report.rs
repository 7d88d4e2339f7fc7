use chrono::Timelike;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{ClosedPosition, ExitReason};

/// Aggregate for one bucket of trades (exit reason, ticker or entry hour)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStats {
    pub label: String,
    pub trades: usize,
    pub pnl: f64,
    pub win_rate: f64,
    pub share_pct: f64,
}

impl BucketStats {
    fn from_trades(label: String, trades: &[&ClosedPosition], total: usize) -> Self {
        let wins = trades.iter().filter(|t| t.pnl > 0.0).count();
        Self {
            label,
            trades: trades.len(),
            pnl: trades.iter().map(|t| t.pnl).sum(),
            win_rate: wins as f64 / trades.len().max(1) as f64 * 100.0,
            share_pct: trades.len() as f64 / total.max(1) as f64 * 100.0,
        }
    }
}

/// Performance analysis of closed positions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_win: f64,
    pub avg_loss: f64, // Negative
    pub profit_factor: f64,
    pub max_drawdown: f64,

    pub by_exit_reason: Vec<BucketStats>,
    pub by_ticker: Vec<BucketStats>, // Sorted by P&L, best first
    pub by_entry_hour: Vec<BucketStats>,

    pub avg_holding_hours: f64,
    pub min_holding_hours: f64,
    pub max_holding_hours: f64,

    pub recommendations: Vec<String>,
}

impl PerformanceReport {
    /// Build the report; entry hours are bucketed in exchange-local time
    pub fn from_closed(closed: &[ClosedPosition], tz: Tz) -> Option<Self> {
        if closed.is_empty() {
            return None;
        }

        let total_trades = closed.len();
        let wins: Vec<f64> = closed.iter().map(|t| t.pnl).filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = closed.iter().map(|t| t.pnl).filter(|p| *p < 0.0).collect();

        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().map(|l| l.abs()).sum();

        let win_rate = wins.len() as f64 / total_trades as f64 * 100.0;
        let avg_win = if wins.is_empty() {
            0.0
        } else {
            gross_profit / wins.len() as f64
        };
        let avg_loss = if losses.is_empty() {
            0.0
        } else {
            -gross_loss / losses.len() as f64
        };

        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let mut reasons: BTreeMap<String, Vec<&ClosedPosition>> = BTreeMap::new();
        let mut tickers: BTreeMap<String, Vec<&ClosedPosition>> = BTreeMap::new();
        let mut hours: BTreeMap<u32, Vec<&ClosedPosition>> = BTreeMap::new();
        for trade in closed {
            reasons
                .entry(trade.exit_reason.to_string())
                .or_default()
                .push(trade);
            tickers.entry(trade.ticker.clone()).or_default().push(trade);
            hours
                .entry(trade.entry_time.with_timezone(&tz).hour())
                .or_default()
                .push(trade);
        }

        let by_exit_reason: Vec<BucketStats> = reasons
            .into_iter()
            .map(|(label, trades)| BucketStats::from_trades(label, &trades, total_trades))
            .collect();

        let mut by_ticker: Vec<BucketStats> = tickers
            .into_iter()
            .map(|(label, trades)| BucketStats::from_trades(label, &trades, total_trades))
            .collect();
        by_ticker.sort_by(|a, b| b.pnl.total_cmp(&a.pnl));

        let by_entry_hour: Vec<BucketStats> = hours
            .into_iter()
            .map(|(hour, trades)| {
                BucketStats::from_trades(format!("{:02}h", hour), &trades, total_trades)
            })
            .collect();

        let durations: Vec<f64> = closed.iter().map(|t| t.holding_hours()).collect();
        let avg_holding_hours = durations.iter().sum::<f64>() / durations.len() as f64;
        let min_holding_hours = durations.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_holding_hours = durations.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let mut report = Self {
            total_trades,
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate,
            total_pnl: closed.iter().map(|t| t.pnl).sum(),
            avg_win,
            avg_loss,
            profit_factor,
            max_drawdown: max_drawdown(closed),
            by_exit_reason,
            by_ticker,
            by_entry_hour,
            avg_holding_hours,
            min_holding_hours,
            max_holding_hours,
            recommendations: Vec::new(),
        };
        report.recommendations = report.build_recommendations();
        Some(report)
    }

    pub fn exit_reason(&self, reason: ExitReason) -> Option<&BucketStats> {
        let label = reason.to_string();
        self.by_exit_reason.iter().find(|b| b.label == label)
    }

    pub fn best(&self, n: usize) -> &[BucketStats] {
        &self.by_ticker[..n.min(self.by_ticker.len())]
    }

    pub fn worst(&self, n: usize) -> &[BucketStats] {
        &self.by_ticker[self.by_ticker.len().saturating_sub(n)..]
    }

    fn build_recommendations(&self) -> Vec<String> {
        let mut recommendations = Vec::new();

        if self.win_rate < 50.0 {
            recommendations.push("⚠️  Win rate < 50%: tighten entry filters".to_string());
        }
        if self.win_rate > 70.0 {
            recommendations.push("✅ Excellent win rate: consider a larger position size".to_string());
        }

        if self.profit_factor < 1.0 {
            recommendations.push("⚠️  Profit factor < 1: strategy is losing money".to_string());
        } else if self.profit_factor < 1.5 {
            recommendations.push("⚠️  Weak profit factor: improve risk/reward".to_string());
        } else {
            recommendations.push("✅ Profit factor OK".to_string());
        }

        if self.avg_loss != 0.0 && self.avg_loss.abs() > self.avg_win * 1.5 {
            recommendations.push("⚠️  Losses too large versus gains: tighten the stop-loss".to_string());
        }

        if let Some(worst_hour) = self
            .by_entry_hour
            .iter()
            .min_by(|a, b| a.pnl.total_cmp(&b.pnl))
        {
            if worst_hour.pnl < 0.0 {
                recommendations.push(format!(
                    "⚠️  Avoid entries at {} (losing)",
                    worst_hour.label
                ));
            }
        }

        for stat in self.worst(3) {
            if stat.pnl < -100.0 && stat.win_rate < 40.0 {
                recommendations.push(format!("⚠️  Consider blacklisting {} (losing)", stat.label));
            }
        }

        recommendations
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║                  PERFORMANCE REPORT                   ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📈 SUMMARY");
        println!("  Total Trades:          {}", self.total_trades);
        println!(
            "  Winners / Losers:      {} / {}",
            self.winning_trades, self.losing_trades
        );
        println!("  Win Rate:              {:.1}%", self.win_rate);
        println!("  Total P&L:             ${:+.2}", self.total_pnl);
        println!("  Average Win:           ${:+.2}", self.avg_win);
        println!("  Average Loss:          ${:+.2}", self.avg_loss);
        println!("  Profit Factor:         {:.2}", self.profit_factor);
        println!("  Max Drawdown:          ${:.2}", self.max_drawdown);

        println!("\n📋 BY EXIT REASON");
        for bucket in &self.by_exit_reason {
            println!(
                "  {:<12} {} trades ({:.1}%) | P&L: ${:+.2}",
                bucket.label, bucket.trades, bucket.share_pct, bucket.pnl
            );
        }

        println!("\n🏆 BEST TICKERS");
        for (i, stat) in self.best(5).iter().enumerate() {
            println!(
                "  {}. {}: ${:+.2} ({} trades, WR: {:.0}%)",
                i + 1,
                stat.label,
                stat.pnl,
                stat.trades,
                stat.win_rate
            );
        }

        println!("\n💀 WORST TICKERS");
        for (i, stat) in self.worst(5).iter().enumerate() {
            println!(
                "  {}. {}: ${:+.2} ({} trades, WR: {:.0}%)",
                i + 1,
                stat.label,
                stat.pnl,
                stat.trades,
                stat.win_rate
            );
        }

        println!("\n⏰ BY ENTRY HOUR");
        for bucket in &self.by_entry_hour {
            println!(
                "  {}: {} trades | WR: {:.0}% | P&L: ${:+.2}",
                bucket.label, bucket.trades, bucket.win_rate, bucket.pnl
            );
        }

        println!("\n⏱️  HOLDING PERIODS");
        println!("  Average:               {:.1} hours", self.avg_holding_hours);
        println!(
            "  Min / Max:             {:.1}h / {:.1}h",
            self.min_holding_hours, self.max_holding_hours
        );

        println!("\n💡 RECOMMENDATIONS");
        for recommendation in &self.recommendations {
            println!("  {}", recommendation);
        }

        println!("\n═════════════════════════════════════════════════════════\n");
    }
}

/// Largest peak-to-trough decline of cumulative realized P&L, in exit order
fn max_drawdown(closed: &[ClosedPosition]) -> f64 {
    let mut ordered: Vec<&ClosedPosition> = closed.iter().collect();
    ordered.sort_by_key(|t| t.exit_time);

    let mut peak = 0.0_f64;
    let mut equity = 0.0_f64;
    let mut max_dd = 0.0_f64;
    for trade in ordered {
        equity += trade.pnl;
        peak = peak.max(equity);
        max_dd = max_dd.max(peak - equity);
    }
    max_dd
}
