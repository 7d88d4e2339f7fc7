use chrono::{DateTime, Datelike, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{ClosedPosition, ExitReason, Position};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("position already open for {0}")]
    DuplicatePosition(String),

    #[error("no open position for {0}")]
    PositionNotFound(String),
}

/// Position limits and loss limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub capital: f64,
    pub max_positions: usize,
    pub position_size_pct: f64,
    pub daily_loss_limit: f64,
    pub weekly_loss_limit: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub refresh_capital: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            capital: 10_000.0,
            max_positions: 5,
            position_size_pct: 0.20, // 20% of capital per position
            daily_loss_limit: 0.02,  // -2% per day
            weekly_loss_limit: 0.06, // -6% per week
            stop_loss_pct: 0.05,     // -5%
            take_profit_pct: 0.20,   // +20%
            refresh_capital: false,  // Size from the starting capital
        }
    }
}

/// Aggregates over closed positions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Statistics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub average_gain: f64,
    pub average_loss: f64,
    pub profit_factor: f64,
    pub total_pnl: f64,
}

impl Statistics {
    pub fn from_closed(closed: &[ClosedPosition]) -> Self {
        if closed.is_empty() {
            return Self::default();
        }

        let wins: Vec<f64> = closed.iter().map(|p| p.pnl).filter(|pnl| *pnl > 0.0).collect();
        let losses: Vec<f64> = closed.iter().map(|p| p.pnl).filter(|pnl| *pnl < 0.0).collect();

        let gross_profit: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().sum();

        let average = |values: &[f64], sum: f64| {
            if values.is_empty() {
                0.0
            } else {
                sum / values.len() as f64
            }
        };

        Self {
            total_trades: closed.len(),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate: wins.len() as f64 / closed.len() as f64 * 100.0,
            average_gain: average(&wins, gross_profit),
            average_loss: average(&losses, gross_loss),
            profit_factor: if gross_loss != 0.0 {
                (gross_profit / gross_loss).abs()
            } else {
                0.0
            },
            total_pnl: closed.iter().map(|p| p.pnl).sum(),
        }
    }
}

/// Persisted ledger document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerState {
    pub open_positions: Vec<Position>,
    pub closed_positions: Vec<ClosedPosition>,
    pub statistics: Statistics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSummary {
    pub capital: f64,
    pub open_positions: usize,
    pub max_positions: usize,
    pub daily_pnl: f64,
    pub daily_limit: f64,
    pub weekly_pnl: f64,
    pub weekly_limit: f64,
    pub can_trade: bool,
}

/// Owns every open and closed position; the single source of truth for risk state
pub struct RiskLedger {
    config: RiskConfig,
    tz: Tz,
    state: LedgerState,
    path: Option<PathBuf>,
}

impl RiskLedger {
    /// In-memory ledger (nothing is persisted)
    pub fn new(config: RiskConfig, tz: Tz) -> Self {
        Self {
            config,
            tz,
            state: LedgerState::default(),
            path: None,
        }
    }

    /// File-backed ledger; restores state when the file exists
    pub fn open(config: RiskConfig, tz: Tz, path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let mut state = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str::<LedgerState>(&contents)?
        } else {
            LedgerState::default()
        };
        state.statistics = Statistics::from_closed(&state.closed_positions);

        tracing::info!(
            "Restored ledger from {}: {} open, {} closed (total P&L: ${:.2})",
            path.display(),
            state.open_positions.len(),
            state.closed_positions.len(),
            state.statistics.total_pnl
        );

        Ok(Self {
            config,
            tz,
            state,
            path: Some(path),
        })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Capital used for sizing: the starting capital, plus realized P&L when
    /// `refresh_capital` is set
    pub fn capital(&self) -> f64 {
        if self.config.refresh_capital {
            self.config.capital + self.state.statistics.total_pnl
        } else {
            self.config.capital
        }
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.state.open_positions
    }

    pub fn closed_positions(&self) -> &[ClosedPosition] {
        &self.state.closed_positions
    }

    pub fn statistics(&self) -> &Statistics {
        &self.state.statistics
    }

    pub fn get_open_position(&self, ticker: &str) -> Option<&Position> {
        self.state.open_positions.iter().find(|p| p.ticker == ticker)
    }

    pub fn has_open_position(&self, ticker: &str) -> bool {
        self.get_open_position(ticker).is_some()
    }

    pub fn can_open_position(&self) -> (bool, String) {
        let open = self.state.open_positions.len();
        if open >= self.config.max_positions {
            return (
                false,
                format!("Position limit reached ({}/{})", open, self.config.max_positions),
            );
        }
        (true, "OK".to_string())
    }

    /// floor(capital * position_size_pct / price), never less than one share
    pub fn calculate_position_size(&self, price: f64) -> u64 {
        if price <= 0.0 {
            return 1;
        }
        let quantity = (self.capital() * self.config.position_size_pct / price).floor();
        (quantity as u64).max(1)
    }

    /// Realized P&L of positions closed on the current exchange-local day
    pub fn daily_pnl_at(&self, now: DateTime<Utc>) -> f64 {
        let today = now.with_timezone(&self.tz).date_naive();
        self.state
            .closed_positions
            .iter()
            .filter(|p| p.exit_time.with_timezone(&self.tz).date_naive() == today)
            .map(|p| p.pnl)
            .sum()
    }

    /// Realized P&L since Monday 00:00 exchange-local
    pub fn weekly_pnl_at(&self, now: DateTime<Utc>) -> f64 {
        let today = now.with_timezone(&self.tz).date_naive();
        let week_start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        self.state
            .closed_positions
            .iter()
            .filter(|p| p.exit_time.with_timezone(&self.tz).date_naive() >= week_start)
            .map(|p| p.pnl)
            .sum()
    }

    pub fn daily_pnl(&self) -> f64 {
        self.daily_pnl_at(Utc::now())
    }

    pub fn weekly_pnl(&self) -> f64 {
        self.weekly_pnl_at(Utc::now())
    }

    pub fn check_daily_loss_limit_at(&self, now: DateTime<Utc>) -> (bool, String) {
        let pnl = self.daily_pnl_at(now);
        if pnl <= -(self.config.capital * self.config.daily_loss_limit) {
            return (false, format!("Daily loss limit reached: ${:.2}", pnl));
        }
        (true, "OK".to_string())
    }

    pub fn check_weekly_loss_limit_at(&self, now: DateTime<Utc>) -> (bool, String) {
        let pnl = self.weekly_pnl_at(now);
        if pnl <= -(self.config.capital * self.config.weekly_loss_limit) {
            return (false, format!("Weekly loss limit reached: ${:.2}", pnl));
        }
        (true, "OK".to_string())
    }

    pub fn check_daily_loss_limit(&self) -> (bool, String) {
        self.check_daily_loss_limit_at(Utc::now())
    }

    pub fn check_weekly_loss_limit(&self) -> (bool, String) {
        self.check_weekly_loss_limit_at(Utc::now())
    }

    /// Position limit, then daily limit, then weekly limit; first failure wins
    pub fn can_trade_at(&self, now: DateTime<Utc>) -> (bool, String) {
        let (ok, reason) = self.can_open_position();
        if !ok {
            return (false, reason);
        }

        let (ok, reason) = self.check_daily_loss_limit_at(now);
        if !ok {
            return (false, reason);
        }

        let (ok, reason) = self.check_weekly_loss_limit_at(now);
        if !ok {
            return (false, reason);
        }

        (true, "OK".to_string())
    }

    pub fn can_trade(&self) -> (bool, String) {
        self.can_trade_at(Utc::now())
    }

    /// Record a new open position; a ticker may only be open once
    pub fn add_position(
        &mut self,
        ticker: &str,
        entry_price: f64,
        quantity: u64,
        stop_loss_price: f64,
        take_profit_price: f64,
        entry_time: DateTime<Utc>,
    ) -> Result<Position, LedgerError> {
        if self.has_open_position(ticker) {
            return Err(LedgerError::DuplicatePosition(ticker.to_string()));
        }

        let position = Position {
            ticker: ticker.to_string(),
            entry_price,
            quantity,
            stop_loss_price,
            take_profit_price,
            entry_time,
            value: entry_price * quantity as f64,
        };

        let mut next = self.state.clone();
        next.open_positions.push(position.clone());
        self.commit(next)?;

        tracing::info!(
            "✅ Position added: {} x{} @ ${:.2}",
            ticker,
            quantity,
            entry_price
        );
        Ok(position)
    }

    pub fn close_position(
        &mut self,
        ticker: &str,
        exit_price: f64,
        exit_reason: ExitReason,
    ) -> Result<ClosedPosition, LedgerError> {
        self.close_position_at(ticker, exit_price, exit_reason, Utc::now())
    }

    /// Move the open position for `ticker` to the closed list
    pub fn close_position_at(
        &mut self,
        ticker: &str,
        exit_price: f64,
        exit_reason: ExitReason,
        exit_time: DateTime<Utc>,
    ) -> Result<ClosedPosition, LedgerError> {
        let index = self
            .state
            .open_positions
            .iter()
            .position(|p| p.ticker == ticker)
            .ok_or_else(|| LedgerError::PositionNotFound(ticker.to_string()))?;

        let mut next = self.state.clone();
        let position = next.open_positions.remove(index);
        let closed = ClosedPosition::from_position(position, exit_price, exit_time, exit_reason);

        next.closed_positions.push(closed.clone());
        next.statistics = Statistics::from_closed(&next.closed_positions);
        self.commit(next)?;

        tracing::info!(
            "✅ Position closed: {} | P&L: ${:+.2} ({:+.2}%) [{}]",
            ticker,
            closed.pnl,
            closed.pnl_pct,
            exit_reason
        );
        Ok(closed)
    }

    pub fn risk_summary_at(&self, now: DateTime<Utc>) -> RiskSummary {
        RiskSummary {
            capital: self.capital(),
            open_positions: self.state.open_positions.len(),
            max_positions: self.config.max_positions,
            daily_pnl: self.daily_pnl_at(now),
            daily_limit: -self.config.capital * self.config.daily_loss_limit,
            weekly_pnl: self.weekly_pnl_at(now),
            weekly_limit: -self.config.capital * self.config.weekly_loss_limit,
            can_trade: self.can_trade_at(now).0,
        }
    }

    pub fn risk_summary(&self) -> RiskSummary {
        self.risk_summary_at(Utc::now())
    }

    /// Persist `next`, then make it the live state. A failed write leaves the
    /// ledger untouched.
    fn commit(&mut self, next: LedgerState) -> Result<(), LedgerError> {
        if let Err(e) = self.save(&next) {
            tracing::error!("❌ Ledger not saved, change discarded: {}", e);
            return Err(e);
        }
        self.state = next;
        Ok(())
    }

    /// Write the whole document to a sibling temp file, then rename over the target
    fn save(&self, state: &LedgerState) -> Result<(), LedgerError> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(state)?)?;
        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            LedgerError::Io(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn ledger() -> RiskLedger {
        RiskLedger::new(RiskConfig::default(), chrono_tz::America::New_York)
    }

    // Wednesday 2024-01-10 12:00 New York
    fn wednesday_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 17, 0, 0).unwrap()
    }

    fn book_loss(ledger: &mut RiskLedger, ticker: &str, quantity: u64, at: DateTime<Utc>) {
        ledger
            .add_position(ticker, 10.0, quantity, 9.5, 12.0, at - Duration::hours(1))
            .unwrap();
        ledger
            .close_position_at(ticker, 9.0, ExitReason::StopLoss, at)
            .unwrap();
    }

    #[test]
    fn test_position_sizing() {
        let ledger = ledger();
        assert_eq!(ledger.calculate_position_size(150.0), 13);
        // Never zero, even when one share exceeds the allocation
        assert_eq!(ledger.calculate_position_size(5_000.0), 1);
    }

    #[test]
    fn test_refresh_capital_uses_realized_pnl() {
        let mut ledger = RiskLedger::new(
            RiskConfig {
                refresh_capital: true,
                ..RiskConfig::default()
            },
            chrono_tz::America::New_York,
        );
        let now = wednesday_noon();
        ledger.add_position("AAPL", 100.0, 10, 95.0, 120.0, now).unwrap();
        ledger
            .close_position_at("AAPL", 200.0, ExitReason::TakeProfit, now)
            .unwrap();

        // (10000 + 1000) * 0.2 / 100
        assert_eq!(ledger.capital(), 11_000.0);
        assert_eq!(ledger.calculate_position_size(100.0), 22);
    }

    #[test]
    fn test_daily_loss_limit_boundary() {
        let now = wednesday_noon();

        let mut over = ledger();
        book_loss(&mut over, "AAPL", 201, now);
        assert_eq!(over.daily_pnl_at(now), -201.0);
        assert!(!over.check_daily_loss_limit_at(now).0);

        let mut under = ledger();
        book_loss(&mut under, "AAPL", 199, now);
        assert!(under.check_daily_loss_limit_at(now).0);
    }

    #[test]
    fn test_weekly_pnl_starts_monday() {
        let now = wednesday_noon();
        let mut ledger = ledger();

        // Monday 2024-01-08 10:00 New York
        book_loss(&mut ledger, "AAPL", 100, Utc.with_ymd_and_hms(2024, 1, 8, 15, 0, 0).unwrap());
        // Friday of the previous week
        book_loss(&mut ledger, "MSFT", 50, Utc.with_ymd_and_hms(2024, 1, 5, 15, 0, 0).unwrap());

        assert_eq!(ledger.weekly_pnl_at(now), -100.0);
        assert_eq!(ledger.daily_pnl_at(now), 0.0);
    }

    #[test]
    fn test_can_trade_reports_first_failure() {
        let now = wednesday_noon();
        let mut ledger = RiskLedger::new(
            RiskConfig {
                max_positions: 1,
                ..RiskConfig::default()
            },
            chrono_tz::America::New_York,
        );
        book_loss(&mut ledger, "AAPL", 300, now);
        ledger.add_position("MSFT", 100.0, 1, 95.0, 120.0, now).unwrap();

        let (ok, reason) = ledger.can_trade_at(now);
        assert!(!ok);
        assert_eq!(reason, "Position limit reached (1/1)");

        ledger.close_position_at("MSFT", 100.0, ExitReason::Other, now).unwrap();
        let (ok, reason) = ledger.can_trade_at(now);
        assert!(!ok);
        assert!(reason.starts_with("Daily loss limit reached"));
    }

    #[test]
    fn test_round_trip_at_entry_price() {
        let mut ledger = ledger();
        let now = wednesday_noon();

        ledger.add_position("AAPL", 150.0, 13, 142.5, 180.0, now).unwrap();
        let closed = ledger
            .close_position_at("AAPL", 150.0, ExitReason::Other, now)
            .unwrap();

        assert_eq!(closed.pnl, 0.0);
        assert_eq!(closed.pnl_pct, 0.0);
        assert!(ledger.open_positions().is_empty());
        assert_eq!(ledger.closed_positions().len(), 1);
    }

    #[test]
    fn test_duplicate_and_missing_positions() {
        let mut ledger = ledger();
        let now = wednesday_noon();

        ledger.add_position("AAPL", 150.0, 13, 142.5, 180.0, now).unwrap();
        assert!(matches!(
            ledger.add_position("AAPL", 151.0, 13, 143.0, 181.0, now),
            Err(LedgerError::DuplicatePosition(_))
        ));
        assert_eq!(ledger.open_positions().len(), 1);

        assert!(matches!(
            ledger.close_position("TSLA", 100.0, ExitReason::Other),
            Err(LedgerError::PositionNotFound(_))
        ));
    }

    #[test]
    fn test_statistics() {
        let mut ledger = ledger();
        let now = wednesday_noon();

        ledger.add_position("AAPL", 100.0, 10, 95.0, 120.0, now).unwrap();
        ledger.close_position_at("AAPL", 120.0, ExitReason::TakeProfit, now).unwrap();
        ledger.add_position("MSFT", 100.0, 10, 95.0, 120.0, now).unwrap();
        ledger.close_position_at("MSFT", 95.0, ExitReason::StopLoss, now).unwrap();

        let stats = ledger.statistics();
        assert_eq!(stats.total_trades, 2);
        assert_eq!(stats.win_rate, 50.0);
        assert_eq!(stats.average_gain, 200.0);
        assert_eq!(stats.average_loss, -50.0);
        assert_eq!(stats.profit_factor, 4.0);
        assert_eq!(stats.total_pnl, 150.0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("risk_state.json");
        let now = wednesday_noon();

        {
            let mut ledger =
                RiskLedger::open(RiskConfig::default(), chrono_tz::America::New_York, &path)
                    .unwrap();
            ledger.add_position("AAPL", 100.0, 10, 95.0, 120.0, now).unwrap();
            ledger.add_position("NVDA", 500.0, 4, 475.0, 600.0, now).unwrap();
            ledger.close_position_at("AAPL", 120.0, ExitReason::TakeProfit, now).unwrap();
        }

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["closed_positions"][0]["exit_reason"], "TAKE_PROFIT");
        assert!(json.get("statistics").is_some());

        let restored =
            RiskLedger::open(RiskConfig::default(), chrono_tz::America::New_York, &path).unwrap();
        assert_eq!(restored.open_positions().len(), 1);
        assert_eq!(restored.open_positions()[0].ticker, "NVDA");
        assert_eq!(restored.statistics().total_pnl, 200.0);
    }

    #[test]
    fn test_failed_save_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        let data_dir = dir.path().join("data");
        let path = data_dir.join("risk_state.json");
        let now = wednesday_noon();

        let mut ledger =
            RiskLedger::open(RiskConfig::default(), chrono_tz::America::New_York, &path).unwrap();
        ledger.add_position("AAPL", 100.0, 10, 95.0, 120.0, now).unwrap();

        // A plain file where the data directory should be makes every write fail
        fs::remove_dir_all(&data_dir).unwrap();
        fs::write(&data_dir, "not a directory").unwrap();

        let closed = ledger.close_position_at("AAPL", 110.0, ExitReason::TakeProfit, now);
        assert!(matches!(closed, Err(LedgerError::Io(_))));
        assert_eq!(ledger.open_positions().len(), 1);
        assert!(ledger.closed_positions().is_empty());
        assert_eq!(ledger.statistics().total_trades, 0);

        let added = ledger.add_position("MSFT", 200.0, 5, 190.0, 240.0, now);
        assert!(matches!(added, Err(LedgerError::Io(_))));
        assert!(!ledger.has_open_position("MSFT"));
        assert_eq!(ledger.open_positions().len(), 1);

        // Writable again: the same close goes through
        fs::remove_file(&data_dir).unwrap();
        let closed = ledger
            .close_position_at("AAPL", 110.0, ExitReason::TakeProfit, now)
            .unwrap();
        assert_eq!(closed.pnl, 100.0);
        assert!(ledger.open_positions().is_empty());
    }

    #[test]
    fn test_risk_summary() {
        let ledger = ledger();
        let summary = ledger.risk_summary_at(wednesday_noon());
        assert_eq!(summary.max_positions, 5);
        assert_eq!(summary.daily_limit, -200.0);
        assert!((summary.weekly_limit + 600.0).abs() < 1e-9);
        assert!(summary.can_trade);
    }
}
