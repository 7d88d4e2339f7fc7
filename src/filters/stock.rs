use serde::{Deserialize, Serialize};

use crate::indicators::preceding_average_volume;
use crate::models::{Bar, Orderflow};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StockConfig {
    pub doji_body_pct: f64,
    pub high_wick_pct: f64,
    pub min_volume_ratio: f64,
    pub volume_window: usize,
    pub spread_max_pct: f64, // Percent units
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            doji_body_pct: 0.20,   // Body under 20% of range = indecision
            high_wick_pct: 0.50,   // Upper wick over 50% of range = sellers
            min_volume_ratio: 0.5, // At least half the trailing average
            volume_window: 20,     // Window includes the latest bar
            spread_max_pct: 0.5,
        }
    }
}

pub struct StockFilter {
    config: StockConfig,
}

impl StockFilter {
    pub fn new(config: StockConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StockConfig {
        &self.config
    }

    /// Stock emotion on the latest bar: rejects doji, long upper wick and thin volume
    pub fn check_emotion(&self, bars: &[Bar]) -> (bool, String) {
        let last = match bars.last() {
            Some(bar) => bar,
            None => return (false, "No data".to_string()),
        };

        let range = last.range();
        if range <= 0.0 {
            return (false, "Zero range (suspect)".to_string());
        }

        let body_pct = last.body() / range;
        if body_pct < self.config.doji_body_pct {
            return (
                false,
                format!("Doji detected (body {:.1}%)", body_pct * 100.0),
            );
        }

        let wick_pct = last.upper_shadow() / range;
        if wick_pct > self.config.high_wick_pct {
            return (
                false,
                format!("Excessive upper wick ({:.1}%)", wick_pct * 100.0),
            );
        }

        let lookback = self.config.volume_window.saturating_sub(1);
        if let Some(avg_volume) = preceding_average_volume(bars, lookback) {
            if avg_volume > 0.0 && (last.volume as f64) < avg_volume * self.config.min_volume_ratio
            {
                return (
                    false,
                    format!(
                        "Low volume ({:.0}% of average)",
                        last.volume as f64 / avg_volume * 100.0
                    ),
                );
            }
        }

        (true, "OK".to_string())
    }

    pub fn check_spread(&self, orderflow: Option<&Orderflow>) -> (bool, String) {
        let flow = match orderflow {
            Some(flow) => flow,
            None => return (false, "No orderflow data".to_string()),
        };

        if flow.spread_pct > self.config.spread_max_pct {
            (false, format!("Spread too wide ({:.2}%)", flow.spread_pct))
        } else {
            (true, format!("Spread OK ({:.2}%)", flow.spread_pct))
        }
    }
}

impl Default for StockFilter {
    fn default() -> Self {
        Self::new(StockConfig::default())
    }
}
