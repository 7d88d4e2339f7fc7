use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One OHLCV sample
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_shadow(&self) -> f64 {
        self.high - self.open.max(self.close)
    }

    pub fn lower_shadow(&self) -> f64 {
        self.open.min(self.close) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }
}

/// Bar interval and lookback range requested from the market data source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BarSpec {
    pub interval: String,
    pub range: String,
}

impl Default for BarSpec {
    fn default() -> Self {
        Self {
            interval: "5m".to_string(),
            range: "2d".to_string(),
        }
    }
}

/// Live quote snapshot from the market data source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub last: f64,
    pub bid: f64,
    pub ask: f64,
    pub bid_size: u64,
    pub ask_size: u64,
    pub volume: u64,
}

/// Bid/ask derived view of a single quote
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Orderflow {
    pub bid: f64,
    pub ask: f64,
    pub bid_size: u64,
    pub ask_size: u64,
    pub spread: f64,
    pub spread_pct: f64,       // Percent units (0.5 = 0.5%)
    pub bid_pressure_pct: f64, // 0-100
}

impl Orderflow {
    pub fn from_quote(quote: &Quote) -> Self {
        let (spread, spread_pct) = if quote.bid > 0.0 && quote.ask > 0.0 {
            let spread = quote.ask - quote.bid;
            (spread, spread / quote.ask * 100.0)
        } else {
            (0.0, 0.0)
        };

        let total_size = quote.bid_size + quote.ask_size;
        let bid_pressure_pct = if total_size > 0 {
            quote.bid_size as f64 / total_size as f64 * 100.0
        } else {
            0.0
        };

        Self {
            bid: quote.bid,
            ask: quote.ask,
            bid_size: quote.bid_size,
            ask_size: quote.ask_size,
            spread,
            spread_pct,
            bid_pressure_pct,
        }
    }

    /// +1 buyers dominate, -1 sellers dominate, 0 balanced
    pub fn signal(&self) -> i8 {
        if self.bid_pressure_pct > 55.0 {
            1
        } else if self.bid_pressure_pct < 45.0 {
            -1
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PatternKind {
    ThreeWhiteSoldiers,
    BullishEngulfing,
    PiercingLine,
    Hammer,
    InvertedHammer,
    Doji,
    BearishEngulfing,
    ShootingStar,
    HangingMan,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatternKind::ThreeWhiteSoldiers => "Three White Soldiers",
            PatternKind::BullishEngulfing => "Bullish Engulfing",
            PatternKind::PiercingLine => "Piercing Line",
            PatternKind::Hammer => "Hammer",
            PatternKind::InvertedHammer => "Inverted Hammer",
            PatternKind::Doji => "Doji",
            PatternKind::BearishEngulfing => "Bearish Engulfing",
            PatternKind::ShootingStar => "Shooting Star",
            PatternKind::HangingMan => "Hanging Man",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PatternMatch {
    pub kind: PatternKind,
    pub confidence: u8,
}

/// Open position, keyed by ticker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub ticker: String,
    pub entry_price: f64,
    pub quantity: u64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Emergency,
    Other,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExitReason::TakeProfit => "TAKE_PROFIT",
            ExitReason::StopLoss => "STOP_LOSS",
            ExitReason::Emergency => "EMERGENCY",
            ExitReason::Other => "OTHER",
        };
        write!(f, "{}", name)
    }
}

/// Closed position record (append-only)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosedPosition {
    pub ticker: String,
    pub entry_price: f64,
    pub quantity: u64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub entry_time: DateTime<Utc>,
    pub value: f64,
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub pnl: f64,
    pub pnl_pct: f64,
}

impl ClosedPosition {
    pub fn from_position(
        position: Position,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        exit_reason: ExitReason,
    ) -> Self {
        let pnl = (exit_price - position.entry_price) * position.quantity as f64;
        let pnl_pct = if position.entry_price > 0.0 {
            (exit_price - position.entry_price) / position.entry_price * 100.0
        } else {
            0.0
        };

        Self {
            ticker: position.ticker,
            entry_price: position.entry_price,
            quantity: position.quantity,
            stop_loss_price: position.stop_loss_price,
            take_profit_price: position.take_profit_price,
            entry_time: position.entry_time,
            value: position.value,
            exit_price,
            exit_time,
            exit_reason,
            pnl,
            pnl_pct,
        }
    }

    pub fn holding_hours(&self) -> f64 {
        (self.exit_time - self.entry_time).num_seconds() as f64 / 3600.0
    }
}

/// News article from the news source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub title: String,
    pub body: String,
    pub created: DateTime<Utc>,
}

/// Analyst rating action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingChange {
    pub action: String,
    pub analyst: String,
    pub date: NaiveDate,
}

impl RatingChange {
    pub fn is_downgrade(&self) -> bool {
        self.action.to_lowercase().contains("downgrade")
    }
}

/// When an earnings release happens relative to the regular session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReleaseTime {
    BeforeOpen,
    AfterClose,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EarningsEvent {
    pub ticker: String,
    pub date: NaiveDate,
    pub release: ReleaseTime,
}

/// A ticker that passed the whole entry chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub ticker: String,
    pub score: u8,
    pub pattern: PatternMatch,
    pub volume_ratio: f64,
    pub bid_pressure_pct: f64,
    pub orderflow_signal: i8,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    pub price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(bid: f64, ask: f64, bid_size: u64, ask_size: u64) -> Quote {
        Quote {
            last: bid,
            bid,
            ask,
            bid_size,
            ask_size,
            volume: 0,
        }
    }

    #[test]
    fn test_bar_geometry() {
        let bar = Bar::new(100.0, 110.0, 95.0, 105.0, 1_000);
        assert_eq!(bar.body(), 5.0);
        assert_eq!(bar.range(), 15.0);
        assert_eq!(bar.upper_shadow(), 5.0);
        assert_eq!(bar.lower_shadow(), 5.0);
        assert!(bar.is_bullish());
        assert!(!bar.is_bearish());
    }

    #[test]
    fn test_orderflow_bid_pressure() {
        let flow = Orderflow::from_quote(&quote(99.9, 100.0, 70, 30));
        assert!((flow.bid_pressure_pct - 70.0).abs() < 1e-9);
        assert!((flow.spread_pct - 0.1).abs() < 1e-9);
        assert_eq!(flow.signal(), 1);
    }

    #[test]
    fn test_orderflow_missing_prices_and_sizes() {
        let flow = Orderflow::from_quote(&quote(0.0, 100.0, 0, 0));
        assert_eq!(flow.spread, 0.0);
        assert_eq!(flow.spread_pct, 0.0);
        assert_eq!(flow.bid_pressure_pct, 0.0);
        assert_eq!(flow.signal(), -1);
    }

    #[test]
    fn test_closed_position_pnl() {
        let position = Position {
            ticker: "AAPL".to_string(),
            entry_price: 100.0,
            quantity: 10,
            stop_loss_price: 95.0,
            take_profit_price: 120.0,
            entry_time: Utc::now(),
            value: 1000.0,
        };

        let closed = ClosedPosition::from_position(position, 120.0, Utc::now(), ExitReason::TakeProfit);
        assert_eq!(closed.pnl, 200.0);
        assert!((closed.pnl_pct - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_exit_reason_serializes_screaming_case() {
        let json = serde_json::to_string(&ExitReason::TakeProfit).unwrap();
        assert_eq!(json, "\"TAKE_PROFIT\"");
    }

    #[test]
    fn test_downgrade_detection_is_case_insensitive() {
        let rating = RatingChange {
            action: "Downgrades".to_string(),
            analyst: "Acme".to_string(),
            date: Utc::now().date_naive(),
        };
        assert!(rating.is_downgrade());
    }
}
