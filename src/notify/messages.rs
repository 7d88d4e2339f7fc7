//! Message bodies for the notifier (Telegram Markdown)
use chrono::DateTime;
use chrono_tz::Tz;

use crate::models::{ClosedPosition, PatternMatch, Position};
use crate::risk::Statistics;

fn clock_line(at: &DateTime<Tz>) -> String {
    format!("⏰ {}", at.format("%H:%M:%S"))
}

fn pct_from(entry: f64, price: f64) -> f64 {
    if entry > 0.0 {
        (price - entry) / entry * 100.0
    } else {
        0.0
    }
}

/// Dollar amount with thousands separators, e.g. `1,234.50`
pub fn money(amount: f64) -> String {
    let formatted = format!("{:.2}", amount.abs());
    let (whole, cents) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, cents)
}

fn signed_money(amount: f64) -> String {
    if amount >= 0.0 {
        format!("+${}", money(amount))
    } else {
        format!("-${}", money(amount.abs()))
    }
}

pub fn entry(position: &Position, at: &DateTime<Tz>) -> String {
    format!(
        "🟢 *BUY* 🟢\n\n\
         *Ticker*: {}\n\
         *Price*: ${:.2}\n\
         *Quantity*: {}\n\
         *Value*: ${}\n\n\
         *Stop-Loss*: {:.0}% (${:.2})\n\
         *Take-Profit*: +{:.0}% (${:.2})\n\n\
         {}",
        position.ticker,
        position.entry_price,
        position.quantity,
        money(position.value),
        pct_from(position.entry_price, position.stop_loss_price),
        position.stop_loss_price,
        pct_from(position.entry_price, position.take_profit_price),
        position.take_profit_price,
        clock_line(at)
    )
}

pub fn take_profit(closed: &ClosedPosition, at: &DateTime<Tz>) -> String {
    format!(
        "🎯 *TAKE PROFIT* 🎯\n\n\
         *Ticker*: {}\n\
         *Entry*: ${:.2}\n\
         *Exit*: ${:.2}\n\
         *Quantity*: {}\n\n\
         *Gain*: {:+.2}% ({})\n\n\
         {}",
        closed.ticker,
        closed.entry_price,
        closed.exit_price,
        closed.quantity,
        closed.pnl_pct,
        signed_money(closed.pnl),
        clock_line(at)
    )
}

pub fn stop_loss(closed: &ClosedPosition, at: &DateTime<Tz>) -> String {
    format!(
        "🛑 *STOP LOSS* 🛑\n\n\
         *Ticker*: {}\n\
         *Entry*: ${:.2}\n\
         *Exit*: ${:.2}\n\
         *Quantity*: {}\n\n\
         *Loss*: {:+.2}% ({})\n\n\
         {}",
        closed.ticker,
        closed.entry_price,
        closed.exit_price,
        closed.quantity,
        closed.pnl_pct,
        signed_money(closed.pnl),
        clock_line(at)
    )
}

pub fn emergency_exit(closed: &ClosedPosition, reason: &str, at: &DateTime<Tz>) -> String {
    let emoji = if closed.pnl >= 0.0 { "🟢" } else { "🔴" };
    format!(
        "⚠️ *EMERGENCY EXIT* ⚠️\n\n\
         *Ticker*: {}\n\
         *Reason*: {}\n\n\
         *Entry*: ${:.2}\n\
         *Exit*: ${:.2}\n\
         *Quantity*: {}\n\n\
         {} *P&L*: {:+.2}% ({})\n\n\
         {}",
        closed.ticker,
        reason,
        closed.entry_price,
        closed.exit_price,
        closed.quantity,
        emoji,
        closed.pnl_pct,
        signed_money(closed.pnl),
        clock_line(at)
    )
}

pub fn error(message: &str, at: &DateTime<Tz>) -> String {
    format!("❌ *ERROR* ❌\n\n{}\n\n{}", message, clock_line(at))
}

pub fn pause(reason: &str, at: &DateTime<Tz>) -> String {
    format!(
        "⏸️ *TRADING PAUSED* ⏸️\n\n\
         *Reason*: {}\n\n\
         The bot is paused and will not open new positions.\n\n\
         {}",
        reason,
        clock_line(at)
    )
}

pub fn daily_summary(stats: &Statistics, at: &DateTime<Tz>) -> String {
    let emoji = if stats.total_pnl >= 0.0 { "🟢" } else { "🔴" };
    format!(
        "📊 *DAILY SUMMARY* 📊\n\n\
         *Trades*: {}\n\
         • Winners: {}\n\
         • Losers: {}\n\
         • Win rate: {:.1}%\n\n\
         {} *Total P&L*: {}\n\n\
         ⏰ {}",
        stats.total_trades,
        stats.winning_trades,
        stats.losing_trades,
        stats.win_rate,
        emoji,
        signed_money(stats.total_pnl),
        at.format("%Y-%m-%d %H:%M:%S")
    )
}

pub fn signal_detected(ticker: &str, pattern: &PatternMatch, at: &DateTime<Tz>) -> String {
    format!(
        "🔔 *SIGNAL DETECTED* 🔔\n\n\
         *Ticker*: {}\n\
         *Pattern*: {}\n\
         *Confidence*: {}%\n\n\
         {}",
        ticker,
        pattern.kind,
        pattern.confidence,
        clock_line(at)
    )
}

pub fn startup(watchlist_size: usize, capital: f64, dry_run: bool, at: &DateTime<Tz>) -> String {
    let mode = if dry_run { "DRY RUN" } else { "LIVE" };
    format!(
        "🚀 *BOT STARTED* ({})\n\n\
         *Watchlist*: {} tickers\n\
         *Capital*: ${}\n\n\
         {}",
        mode,
        watchlist_size,
        money(capital),
        clock_line(at)
    )
}

pub fn shutdown(cycles: u64, at: &DateTime<Tz>) -> String {
    format!(
        "🛑 *BOT STOPPED*\n\n*Cycles run*: {}\n\n{}",
        cycles,
        clock_line(at)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExitReason, PatternKind};
    use chrono::{TimeZone, Utc};

    fn at() -> DateTime<Tz> {
        Utc.with_ymd_and_hms(2024, 1, 9, 16, 0, 0)
            .unwrap()
            .with_timezone(&chrono_tz::America::New_York)
    }

    fn position() -> Position {
        Position {
            ticker: "AAPL".to_string(),
            entry_price: 100.0,
            quantity: 20,
            stop_loss_price: 95.0,
            take_profit_price: 120.0,
            entry_time: Utc.with_ymd_and_hms(2024, 1, 9, 15, 0, 0).unwrap(),
            value: 2000.0,
        }
    }

    #[test]
    fn test_money_grouping() {
        assert_eq!(money(0.5), "0.50");
        assert_eq!(money(1234.5), "1,234.50");
        assert_eq!(money(1_234_567.891), "1,234,567.89");
        assert_eq!(money(-999.0), "-999.00");
    }

    #[test]
    fn test_entry_message() {
        let text = entry(&position(), &at());
        assert!(text.contains("*Ticker*: AAPL"));
        assert!(text.contains("*Value*: $2,000.00"));
        assert!(text.contains("*Stop-Loss*: -5% ($95.00)"));
        assert!(text.contains("*Take-Profit*: +20% ($120.00)"));
        assert!(text.contains("⏰ 11:00:00"));
    }

    #[test]
    fn test_exit_messages() {
        let win = ClosedPosition::from_position(position(), 120.0, Utc::now(), ExitReason::TakeProfit);
        assert!(take_profit(&win, &at()).contains("*Gain*: +20.00% (+$400.00)"));

        let loss = ClosedPosition::from_position(position(), 95.0, Utc::now(), ExitReason::StopLoss);
        assert!(stop_loss(&loss, &at()).contains("*Loss*: -5.00% (-$100.00)"));

        let urgent = emergency_exit(&loss, "URGENCY: excessive spread", &at());
        assert!(urgent.contains("🔴 *P&L*: -5.00% (-$100.00)"));
        assert!(urgent.contains("URGENCY: excessive spread"));
    }

    #[test]
    fn test_signal_and_summary() {
        let pattern = PatternMatch {
            kind: PatternKind::Hammer,
            confidence: 75,
        };
        let text = signal_detected("AAPL", &pattern, &at());
        assert!(text.contains("*Pattern*: Hammer"));
        assert!(text.contains("*Confidence*: 75%"));

        let stats = Statistics {
            total_trades: 4,
            winning_trades: 3,
            losing_trades: 1,
            win_rate: 75.0,
            total_pnl: 1500.0,
            ..Statistics::default()
        };
        let summary = daily_summary(&stats, &at());
        assert!(summary.contains("• Win rate: 75.0%"));
        assert!(summary.contains("🟢 *Total P&L*: +$1,500.00"));
    }
}
