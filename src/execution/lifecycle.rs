//! One trading cycle: gates, exit monitoring, watchlist scan, entry
//!
//! The engine keeps no position state of its own; every open position lives in
//! the `RiskLedger` it owns.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::breakout::{support_resistance, BreakoutValidator};
use crate::execution::executor::{EntryOrder, OrderExecutor};
use crate::filters::{CycleContext, FilterChain, MarketOverview};
use crate::indicators::preceding_average_volume;
use crate::models::{ClosedPosition, ExitReason, Orderflow, Position, Quote, Signal};
use crate::notify::{messages, NotificationKind, Notifications};
use crate::patterns::{detect_bullish_pattern, validate_volume};
use crate::risk::RiskLedger;

const VOLUME_BONUS: u8 = 10;
const VOLUME_BONUS_RATIO: f64 = 2.0;
const PRESSURE_BONUS: u8 = 5;
const PRESSURE_BONUS_PCT: f64 = 60.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub ticker_delay_ms: u64,
    pub pattern_volume_lookback: usize,
    pub pattern_volume_multiplier: f64,
    pub entry_limit_buffer: f64,
    pub emergency_spread_multiple: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ticker_delay_ms: 1_000,          // Throttles the quote API
            pattern_volume_lookback: 19,     // Bars before the pattern candle
            pattern_volume_multiplier: 1.2,  // 1.2x the preceding average
            entry_limit_buffer: 0.002,       // Limit at ask + 0.2%
            emergency_spread_multiple: 2.0,  // 2x the normal spread ceiling
        }
    }
}

/// Pattern confidence plus volume and bid pressure bonuses, capped at 100
pub fn composite_score(confidence: u8, volume_ratio: f64, bid_pressure_pct: f64) -> u8 {
    let mut score = confidence as u16;
    if volume_ratio > VOLUME_BONUS_RATIO {
        score += VOLUME_BONUS as u16;
    }
    if bid_pressure_pct > PRESSURE_BONUS_PCT {
        score += PRESSURE_BONUS as u16;
    }
    score.min(100) as u8
}

fn exit_price(quote: &Quote) -> Option<f64> {
    if quote.bid > 0.0 {
        Some(quote.bid)
    } else if quote.last > 0.0 {
        Some(quote.last)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CycleStatus {
    OutsideHours,
    MarketUnfavorable,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub status: CycleStatus,
    pub reason: String,
    pub exits: Vec<ClosedPosition>,
    pub signals: Vec<Signal>,
    pub entry: Option<Position>,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            status: CycleStatus::Completed,
            reason: "OK".to_string(),
            exits: Vec::new(),
            signals: Vec::new(),
            entry: None,
        }
    }

    fn finish(mut self, status: CycleStatus, reason: impl Into<String>) -> Self {
        self.status = status;
        self.reason = reason.into();
        self
    }
}

/// Result of a standalone scan
#[derive(Debug, Clone)]
pub struct ScanSnapshot {
    pub overview: MarketOverview,
    pub signals: Vec<Signal>,
}

pub struct LifecycleEngine {
    chain: FilterChain,
    breakout: BreakoutValidator,
    ledger: RiskLedger,
    executor: Arc<dyn OrderExecutor>,
    notifications: Notifications,
    config: LifecycleConfig,
}

impl LifecycleEngine {
    pub fn new(
        chain: FilterChain,
        breakout: BreakoutValidator,
        ledger: RiskLedger,
        executor: Arc<dyn OrderExecutor>,
        notifications: Notifications,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            chain,
            breakout,
            ledger,
            executor,
            notifications,
            config,
        }
    }

    pub fn chain(&self) -> &FilterChain {
        &self.chain
    }

    pub fn ledger(&self) -> &RiskLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut RiskLedger {
        &mut self.ledger
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    /// Run one full cycle at `now`
    ///
    /// Order: time gate, market gate, bracket legs, risk gate, emergency exits,
    /// scan, entry on the best signal.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        let mut report = CycleReport::new(now);

        let (time_ok, reason) = self.chain.check_time(now);
        if !time_ok {
            self.log_time_gate(&reason, now);
            return Ok(report.finish(CycleStatus::OutsideHours, reason));
        }

        let ctx = self.chain.cycle_context(now).await;
        let (market_ok, reason) = self.chain.check_market(&ctx);
        if !market_ok {
            info!("📉 {}", reason);
            return Ok(report.finish(CycleStatus::MarketUnfavorable, reason));
        }
        info!("🌡️  {}", ctx.overview());

        // Stop and target legs stand at the broker regardless of the risk gate
        report.exits.extend(self.enforce_brackets(now).await);

        let (can_trade, reason) = self.ledger.can_trade_at(now);
        if !can_trade {
            warn!("⏸️  Trading paused: {}", reason);
            let text = messages::pause(&reason, &self.chain.clock().local(now));
            self.notifications
                .send_throttled("*", NotificationKind::Pause, text, now);
            return Ok(report.finish(CycleStatus::Paused, reason));
        }

        report.exits.extend(self.monitor_positions(now).await);

        if self.ledger.open_positions().len() < self.ledger.config().max_positions {
            report.signals = self.scan(&ctx).await;
            if let Some(best) = report.signals.first().cloned() {
                report.entry = self.execute_signal(&best, now).await?;
            }
        }

        Ok(report)
    }

    fn log_time_gate(&self, reason: &str, now: DateTime<Utc>) {
        let clock = self.chain.clock();
        let until_window_end = clock.minutes_until_excluded_end(now);
        let until_open = clock.minutes_until_open(now);

        if until_window_end > 0 {
            info!("⏰ {} (trading resumes in {} min)", reason, until_window_end);
        } else if until_open > 0 {
            info!("⏰ {} (next open in {} min)", reason, until_open);
        } else {
            info!("⏰ {}", reason);
        }
    }

    /// Negative news, then downgrade, then spread; the first hit wins
    pub async fn check_emergency_exit_conditions(
        &self,
        ticker: &str,
        quote: Option<&Quote>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let news_filter = self.chain.news_filter();
        let source = self.chain.news_source();

        let minutes = news_filter.config().emergency_news_minutes;
        if let Some(articles) = news_filter.negative_news(source, ticker, minutes, now).await {
            if let Some(article) = articles.first() {
                return Some(format!("negative news: {}", article.title));
            }
        }

        let days = news_filter.config().downgrade_window_days;
        if let Some(downgrades) = news_filter
            .downgrades(source, self.chain.clock(), ticker, days, now)
            .await
        {
            if let Some(downgrade) = downgrades.first() {
                return Some(format!("Downgrade: {}", downgrade.analyst));
            }
        }

        if let Some(quote) = quote {
            let flow = Orderflow::from_quote(quote);
            let ceiling =
                self.chain.stock_filter().config().spread_max_pct * self.config.emergency_spread_multiple;
            if flow.spread_pct > ceiling {
                return Some(format!("excessive spread ({:.2}%)", flow.spread_pct));
            }
        }

        None
    }

    /// Close positions whose bid crossed the stop-loss or take-profit price
    pub async fn enforce_brackets(&mut self, now: DateTime<Utc>) -> Vec<ClosedPosition> {
        let positions: Vec<Position> = self.ledger.open_positions().to_vec();
        let mut exits = Vec::new();

        for position in positions {
            let quote = match self.chain.market_data().current_quote(&position.ticker).await {
                Some(quote) => quote,
                None => {
                    warn!("⚠️  No quote for open position {}", position.ticker);
                    continue;
                }
            };
            let price = match exit_price(&quote) {
                Some(price) => price,
                None => continue,
            };

            let reason = if price <= position.stop_loss_price {
                ExitReason::StopLoss
            } else if price >= position.take_profit_price {
                ExitReason::TakeProfit
            } else {
                continue;
            };

            match self
                .exit_position(&position, price, reason, &reason.to_string(), now)
                .await
            {
                Ok(closed) => exits.push(closed),
                Err(e) => error!("❌ Exit for {} failed: {:#}", position.ticker, e),
            }
        }

        exits
    }

    /// Emergency exit checks over every open position
    pub async fn monitor_positions(&mut self, now: DateTime<Utc>) -> Vec<ClosedPosition> {
        let positions: Vec<Position> = self.ledger.open_positions().to_vec();
        let mut exits = Vec::new();

        for position in positions {
            let quote = self.chain.market_data().current_quote(&position.ticker).await;
            let detail = match self
                .check_emergency_exit_conditions(&position.ticker, quote.as_ref(), now)
                .await
            {
                Some(detail) => detail,
                None => continue,
            };

            let reason = format!("URGENCY: {}", detail);
            warn!("🚨 {} {}", position.ticker, reason);

            let price = match quote.as_ref().and_then(exit_price) {
                Some(price) => price,
                None => {
                    error!("❌ Cannot exit {}: no price available", position.ticker);
                    continue;
                }
            };

            match self
                .exit_position(&position, price, ExitReason::Emergency, &reason, now)
                .await
            {
                Ok(closed) => exits.push(closed),
                Err(e) => error!("❌ Emergency exit for {} failed: {:#}", position.ticker, e),
            }
        }

        exits
    }

    async fn exit_position(
        &mut self,
        position: &Position,
        price: f64,
        reason: ExitReason,
        detail: &str,
        now: DateTime<Utc>,
    ) -> Result<ClosedPosition> {
        let ack = self
            .executor
            .place_exit(&position.ticker, position.quantity, price)
            .await
            .with_context(|| format!("exit order for {}", position.ticker))?;

        let closed = self
            .ledger
            .close_position_at(&position.ticker, ack.fill_price, reason, now)?;

        let at = self.chain.clock().local(now);
        match reason {
            ExitReason::TakeProfit => {
                let text = messages::take_profit(&closed, &at);
                self.notifications
                    .send_throttled(&closed.ticker, NotificationKind::TakeProfit, text, now);
            }
            ExitReason::StopLoss => {
                let text = messages::stop_loss(&closed, &at);
                self.notifications
                    .send_throttled(&closed.ticker, NotificationKind::StopLoss, text, now);
            }
            // Emergencies always go out
            _ => {
                self.notifications
                    .send(messages::emergency_exit(&closed, detail, &at));
            }
        }

        Ok(closed)
    }

    /// Full entry chain for one ticker: filters, pattern, volume, breakout
    pub async fn scan_ticker(&self, ticker: &str, ctx: &CycleContext) -> Result<Option<Signal>> {
        let market = self.chain.market_data();
        let spec = self.chain.bar_spec();

        let bars = match market.historical_bars(ticker, &spec.interval, &spec.range).await {
            Some(bars) if !bars.is_empty() => bars,
            _ => {
                debug!("{}: no bars", ticker);
                return Ok(None);
            }
        };
        let orderflow = market
            .current_quote(ticker)
            .await
            .map(|quote| Orderflow::from_quote(&quote));

        let report = self
            .chain
            .validate_with_data(ticker, Some(bars.as_slice()), orderflow.as_ref(), ctx)
            .await;
        if !report.all_passed() {
            debug!("❌ {} rejected: {}", ticker, report.failed_filters().join("; "));
            return Ok(None);
        }

        let pattern = match detect_bullish_pattern(&bars) {
            Some(pattern) => pattern,
            None => {
                debug!("{}: no bullish pattern", ticker);
                return Ok(None);
            }
        };

        let last = bars.last().context("empty bar series")?;
        let avg_volume =
            preceding_average_volume(&bars, self.config.pattern_volume_lookback).unwrap_or(0.0);
        if !validate_volume(last, avg_volume, self.config.pattern_volume_multiplier) {
            debug!("{}: {} without volume confirmation", ticker, pattern.kind);
            return Ok(None);
        }

        let validation = self.breakout.validate(market, ticker, &bars).await;
        if !validation.valid {
            debug!("{}: {}", ticker, validation.reason);
            return Ok(None);
        }

        let volume_ratio = validation
            .breakout
            .as_ref()
            .map(|b| b.volume_ratio)
            .unwrap_or(0.0);
        let flow = validation.orderflow.as_ref();
        let bid_pressure_pct = flow.map(|f| f.bid_pressure_pct).unwrap_or(0.0);
        let orderflow_signal = flow.map(|f| f.signal()).unwrap_or(0);
        let levels = support_resistance(&bars, self.breakout.config().periods);
        let price = flow
            .map(|f| f.ask)
            .filter(|ask| *ask > 0.0)
            .unwrap_or(last.close);

        let score = composite_score(pattern.confidence, volume_ratio, bid_pressure_pct);
        info!(
            "🎯 Signal: {} {} ({}%) | volume x{:.1} | bid pressure {:.0}% | score {}",
            ticker, pattern.kind, pattern.confidence, volume_ratio, bid_pressure_pct, score
        );

        Ok(Some(Signal {
            ticker: ticker.to_string(),
            score,
            pattern,
            volume_ratio,
            bid_pressure_pct,
            orderflow_signal,
            support: levels.map(|(support, _)| support),
            resistance: levels.map(|(_, resistance)| resistance),
            price,
        }))
    }

    /// Scan the whole watchlist sequentially; signals come back best first
    pub async fn scan(&self, ctx: &CycleContext) -> Vec<Signal> {
        let tickers = self.chain.watchlist().all_tickers();
        if tickers.is_empty() {
            info!("Watchlist is empty, nothing to scan");
            return Vec::new();
        }

        info!("🔍 Scanning {} tickers...", tickers.len());
        let mut signals = Vec::new();

        for (i, ticker) in tickers.iter().enumerate() {
            if i > 0 && self.config.ticker_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.ticker_delay_ms)).await;
            }
            if self.ledger.has_open_position(ticker) {
                debug!("{}: already holding", ticker);
                continue;
            }

            match self.scan_ticker(ticker, ctx).await {
                Ok(Some(signal)) => signals.push(signal),
                Ok(None) => {}
                Err(e) => warn!("⚠️  Scan failed for {}: {:#}", ticker, e),
            }
        }

        // Stable: equal scores keep watchlist order
        signals.sort_by(|a, b| b.score.cmp(&a.score));

        let at = self.chain.clock().local(ctx.now);
        for signal in &signals {
            let text = messages::signal_detected(&signal.ticker, &signal.pattern, &at);
            self.notifications
                .send_throttled(&signal.ticker, NotificationKind::Signal, text, ctx.now);
        }

        info!("📊 {} signal(s) found", signals.len());
        signals
    }

    /// Fresh market context plus a scan; never trades
    pub async fn scan_once(&self, now: DateTime<Utc>) -> ScanSnapshot {
        let ctx = self.chain.cycle_context(now).await;
        let signals = self.scan(&ctx).await;
        ScanSnapshot {
            overview: ctx.overview(),
            signals,
        }
    }

    /// Buy `signal` at the live ask with a bracket around the entry price
    pub async fn execute_signal(
        &mut self,
        signal: &Signal,
        now: DateTime<Utc>,
    ) -> Result<Option<Position>> {
        let quote = match self.chain.market_data().current_quote(&signal.ticker).await {
            Some(quote) => quote,
            None => {
                warn!("⚠️  No quote for {}, skipping entry", signal.ticker);
                return Ok(None);
            }
        };

        let ask = if quote.ask > 0.0 { quote.ask } else { quote.last };
        if ask <= 0.0 {
            warn!("⚠️  No usable price for {}, skipping entry", signal.ticker);
            return Ok(None);
        }

        let risk = self.ledger.config();
        let order = EntryOrder {
            ticker: signal.ticker.clone(),
            quantity: self.ledger.calculate_position_size(ask),
            reference_price: ask,
            limit_price: ask * (1.0 + self.config.entry_limit_buffer),
            stop_price: ask * (1.0 - risk.stop_loss_pct),
            target_price: ask * (1.0 + risk.take_profit_pct),
        };

        info!(
            "💰 Entry: {} x{} @ ${:.2} (score {})",
            order.ticker, order.quantity, ask, signal.score
        );

        let ack = match self.executor.place_entry(&order).await {
            Ok(ack) => ack,
            Err(e) => {
                warn!("❌ Entry for {} not filled: {}", order.ticker, e);
                return Ok(None);
            }
        };

        let position = self.ledger.add_position(
            &order.ticker,
            ack.fill_price,
            ack.quantity,
            order.stop_price,
            order.target_price,
            now,
        )?;

        let text = messages::entry(&position, &self.chain.clock().local(now));
        self.notifications
            .send_throttled(&position.ticker, NotificationKind::Entry, text, now);

        Ok(Some(position))
    }
}
