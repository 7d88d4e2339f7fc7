use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::MarketData;
use crate::indicators::{close_change_pct, is_above_sma};
use crate::models::{Bar, BarSpec};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub spy_symbol: String,
    pub qqq_symbol: String,
    pub vix_symbol: String,
    pub spy_min_change: f64,
    pub qqq_min_change: f64,
    pub vix_max_level: f64,
    pub sma_period: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            spy_symbol: "SPY".to_string(),
            qqq_symbol: "QQQ".to_string(),
            vix_symbol: "^VIX".to_string(),
            spy_min_change: 0.003, // +0.3%
            qqq_min_change: 0.003, // +0.3%
            vix_max_level: 25.0,
            sma_period: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexStatus {
    pub symbol: String,
    pub price: f64,
    pub change_pct: f64, // Percent units
    pub above_sma: Option<bool>,
    pub bullish: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VixMood {
    VeryCalm,
    Calm,
    Normal,
    Nervous,
    Panic,
}

impl VixMood {
    pub fn from_level(level: f64) -> Self {
        if level < 15.0 {
            VixMood::VeryCalm
        } else if level < 20.0 {
            VixMood::Calm
        } else if level < 25.0 {
            VixMood::Normal
        } else if level < 30.0 {
            VixMood::Nervous
        } else {
            VixMood::Panic
        }
    }
}

impl fmt::Display for VixMood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VixMood::VeryCalm => "🟢 very calm",
            VixMood::Calm => "🟢 calm",
            VixMood::Normal => "🟡 normal",
            VixMood::Nervous => "🟠 nervous",
            VixMood::Panic => "🔴 panic",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VixStatus {
    pub level: f64,
    pub mood: VixMood,
    pub favorable: bool,
}

/// Broad market state, fetched once per cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarketSnapshot {
    pub spy: Option<IndexStatus>,
    pub qqq: Option<IndexStatus>,
    pub vix: Option<VixStatus>,
}

pub struct MarketFilter {
    config: MarketConfig,
}

impl MarketFilter {
    pub fn new(config: MarketConfig) -> Self {
        Self { config }
    }

    pub fn index_status_from_bars(
        &self,
        symbol: &str,
        bars: &[Bar],
        min_change: f64,
    ) -> Option<IndexStatus> {
        let change_pct = close_change_pct(bars)? * 100.0;
        let price = bars.last()?.close;

        Some(IndexStatus {
            symbol: symbol.to_string(),
            price,
            change_pct,
            above_sma: is_above_sma(bars, self.config.sma_period),
            bullish: change_pct >= min_change * 100.0,
        })
    }

    pub fn vix_status(&self, level: f64) -> VixStatus {
        VixStatus {
            level,
            mood: VixMood::from_level(level),
            favorable: level < self.config.vix_max_level,
        }
    }

    pub async fn snapshot(&self, market: &dyn MarketData, bars: &BarSpec) -> MarketSnapshot {
        let spy = market
            .historical_bars(&self.config.spy_symbol, &bars.interval, &bars.range)
            .await
            .and_then(|b| {
                self.index_status_from_bars(&self.config.spy_symbol, &b, self.config.spy_min_change)
            });

        let qqq = market
            .historical_bars(&self.config.qqq_symbol, &bars.interval, &bars.range)
            .await
            .and_then(|b| {
                self.index_status_from_bars(&self.config.qqq_symbol, &b, self.config.qqq_min_change)
            });

        let vix = market
            .current_quote(&self.config.vix_symbol)
            .await
            .map(|q| self.vix_status(q.last));

        MarketSnapshot { spy, qqq, vix }
    }

    /// Market emotion: SPY and QQQ up by the minimum change, VIX under the ceiling
    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> (bool, String) {
        let (spy, qqq, vix) = match (&snapshot.spy, &snapshot.qqq, &snapshot.vix) {
            (Some(spy), Some(qqq), Some(vix)) => (spy, qqq, vix),
            _ => return (false, "Market data error: missing data".to_string()),
        };

        let mut failed = Vec::new();
        if !spy.bullish {
            failed.push(format!("spy_bullish ({:+.2}%)", spy.change_pct));
        }
        if !qqq.bullish {
            failed.push(format!("qqq_bullish ({:+.2}%)", qqq.change_pct));
        }
        if !vix.favorable {
            failed.push(format!("vix_favorable ({:.1})", vix.level));
        }

        if failed.is_empty() {
            (true, "OK".to_string())
        } else {
            (false, format!("Market not favorable: {}", failed.join(", ")))
        }
    }
}

impl Default for MarketFilter {
    fn default() -> Self {
        Self::new(MarketConfig::default())
    }
}

/// 0 (very bearish) to 100 (very bullish); 50 when data is missing
pub fn market_score(snapshot: &MarketSnapshot) -> u8 {
    let (spy, qqq, vix) = match (&snapshot.spy, &snapshot.qqq, &snapshot.vix) {
        (Some(spy), Some(qqq), Some(vix)) => (spy, qqq, vix),
        _ => return 50,
    };

    let index_points = |status: &IndexStatus| -> i32 {
        if status.bullish {
            25
        } else if status.change_pct > 0.0 {
            15
        } else if status.change_pct < -0.5 {
            -20
        } else {
            0
        }
    };

    let vix_points = match vix.mood {
        VixMood::VeryCalm => 0,
        VixMood::Calm => -5,
        VixMood::Normal => -10,
        VixMood::Nervous => -15,
        VixMood::Panic => -25,
    };

    let score = 50 + index_points(spy) + index_points(qqq) + vix_points;
    score.clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(symbol: &str, change_pct: f64, bullish: bool) -> IndexStatus {
        IndexStatus {
            symbol: symbol.to_string(),
            price: 100.0,
            change_pct,
            above_sma: None,
            bullish,
        }
    }

    fn snapshot(spy: f64, qqq: f64, vix: f64) -> MarketSnapshot {
        let filter = MarketFilter::default();
        MarketSnapshot {
            spy: Some(index("SPY", spy, spy >= 0.3)),
            qqq: Some(index("QQQ", qqq, qqq >= 0.3)),
            vix: Some(filter.vix_status(vix)),
        }
    }

    #[test]
    fn test_index_status_from_bars() {
        let filter = MarketFilter::default();
        let bars = vec![
            Bar::new(100.0, 100.5, 99.5, 100.0, 1000),
            Bar::new(100.0, 100.6, 99.9, 100.4, 1000),
        ];

        let status = filter.index_status_from_bars("SPY", &bars, 0.003).unwrap();
        assert!((status.change_pct - 0.4).abs() < 1e-9);
        assert!(status.bullish);
        assert_eq!(status.above_sma, None);

        let status = filter.index_status_from_bars("SPY", &bars, 0.005).unwrap();
        assert!(!status.bullish);
    }

    #[test]
    fn test_evaluate_requires_all_conditions() {
        let filter = MarketFilter::default();

        assert!(filter.evaluate(&snapshot(0.5, 0.4, 18.0)).0);

        let (ok, reason) = filter.evaluate(&snapshot(0.5, 0.1, 26.0));
        assert!(!ok);
        assert!(reason.contains("qqq_bullish"));
        assert!(reason.contains("vix_favorable"));
        assert!(!reason.contains("spy_bullish"));
    }

    #[test]
    fn test_evaluate_missing_data() {
        let filter = MarketFilter::default();
        let (ok, reason) = filter.evaluate(&MarketSnapshot::default());
        assert!(!ok);
        assert!(reason.contains("missing data"));
    }

    #[test]
    fn test_vix_moods() {
        assert_eq!(VixMood::from_level(12.0), VixMood::VeryCalm);
        assert_eq!(VixMood::from_level(19.9), VixMood::Calm);
        assert_eq!(VixMood::from_level(24.9), VixMood::Normal);
        assert_eq!(VixMood::from_level(25.0), VixMood::Nervous);
        assert_eq!(VixMood::from_level(45.0), VixMood::Panic);
    }

    #[test]
    fn test_market_score() {
        // Both bullish, VIX calm: 50 + 25 + 25 - 5
        assert_eq!(market_score(&snapshot(0.5, 0.4, 18.0)), 95);
        // SPY slightly up, QQQ down hard, VIX panic: 50 + 15 - 20 - 25
        assert_eq!(market_score(&snapshot(0.1, -0.8, 35.0)), 20);
        // Clamped at 0: 50 - 20 - 20 - 25
        assert_eq!(market_score(&snapshot(-1.0, -1.0, 40.0)), 0);
        assert_eq!(market_score(&MarketSnapshot::default()), 50);
    }
}
