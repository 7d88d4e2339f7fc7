//! Breakout and orderflow confirmation
//!
//! The breakout test runs first and short-circuits: the live quote for the
//! orderflow test is only fetched once a breakout is confirmed.
use serde::{Deserialize, Serialize};

use crate::api::MarketData;
use crate::indicators::{preceding_average_volume, resistance_level, support_level};
use crate::models::{Bar, Orderflow};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutConfig {
    pub periods: usize,
    pub volume_multiplier: f64,
    pub min_bid_pressure_pct: f64,
    pub spread_max_pct: f64, // Percent units
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        Self {
            periods: 20,
            volume_multiplier: 1.5,     // 1.5x the preceding average
            min_bid_pressure_pct: 55.0, // Buyers must dominate
            spread_max_pct: 0.5,        // 0.5%
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakoutResult {
    pub is_breakout: bool,
    pub current_price: f64,
    pub resistance: f64,
    pub breakout_pct: f64,
    pub is_green_candle: bool,
    pub volume: u64,
    pub avg_volume: f64,
    pub volume_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakoutOutcome {
    NoBreakout,
    BreakoutNoOrderflow,
    Valid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CombinedValidation {
    pub valid: bool,
    pub outcome: BreakoutOutcome,
    pub reason: String,
    pub breakout: Option<BreakoutResult>,
    pub orderflow: Option<Orderflow>,
}

pub struct BreakoutValidator {
    config: BreakoutConfig,
}

impl BreakoutValidator {
    pub fn new(config: BreakoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BreakoutConfig {
        &self.config
    }

    /// Test the latest bar against the resistance of the `periods` bars before it
    ///
    /// Returns `None` when fewer than `periods + 1` bars are available.
    pub fn detect_breakout(&self, bars: &[Bar]) -> Option<BreakoutResult> {
        let periods = self.config.periods;
        if periods == 0 || bars.len() < periods + 1 {
            return None;
        }

        let last = &bars[bars.len() - 1];
        let preceding = &bars[bars.len() - 1 - periods..bars.len() - 1];

        let resistance = resistance_level(preceding, periods)?;
        let avg_volume = preceding_average_volume(bars, periods)?;
        let volume_ratio = if avg_volume > 0.0 {
            last.volume as f64 / avg_volume
        } else {
            0.0
        };

        let breakout_pct = if resistance > 0.0 {
            (last.close - resistance) / resistance * 100.0
        } else {
            0.0
        };
        let is_green_candle = last.is_bullish();

        let is_breakout = last.close > resistance
            && is_green_candle
            && volume_ratio >= self.config.volume_multiplier;

        Some(BreakoutResult {
            is_breakout,
            current_price: last.close,
            resistance,
            breakout_pct,
            is_green_candle,
            volume: last.volume,
            avg_volume,
            volume_ratio,
        })
    }

    /// Bullish iff bid pressure is above the threshold and the spread is under the ceiling
    pub fn is_orderflow_bullish(&self, orderflow: &Orderflow) -> bool {
        orderflow.bid_pressure_pct > self.config.min_bid_pressure_pct
            && orderflow.spread_pct < self.config.spread_max_pct
    }

    /// Breakout first, then orderflow from a freshly fetched quote
    pub async fn validate(
        &self,
        market: &dyn MarketData,
        ticker: &str,
        bars: &[Bar],
    ) -> CombinedValidation {
        let breakout = match self.detect_breakout(bars) {
            Some(result) if result.is_breakout => result,
            other => {
                return CombinedValidation {
                    valid: false,
                    outcome: BreakoutOutcome::NoBreakout,
                    reason: "no breakout".to_string(),
                    breakout: other,
                    orderflow: None,
                };
            }
        };

        let orderflow = market
            .current_quote(ticker)
            .await
            .map(|quote| Orderflow::from_quote(&quote));

        match orderflow {
            Some(flow) if self.is_orderflow_bullish(&flow) => CombinedValidation {
                valid: true,
                outcome: BreakoutOutcome::Valid,
                reason: format!(
                    "breakout +{:.2}% (volume x{:.1}, bid pressure {:.0}%)",
                    breakout.breakout_pct, breakout.volume_ratio, flow.bid_pressure_pct
                ),
                breakout: Some(breakout),
                orderflow: Some(flow),
            },
            flow => CombinedValidation {
                valid: false,
                outcome: BreakoutOutcome::BreakoutNoOrderflow,
                reason: "orderflow not favorable".to_string(),
                breakout: Some(breakout),
                orderflow: flow,
            },
        }
    }
}

impl Default for BreakoutValidator {
    fn default() -> Self {
        Self::new(BreakoutConfig::default())
    }
}

/// Support and resistance over the last `lookback` bars
pub fn support_resistance(bars: &[Bar], lookback: usize) -> Option<(f64, f64)> {
    Some((support_level(bars, lookback)?, resistance_level(bars, lookback)?))
}
