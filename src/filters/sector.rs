use serde::{Deserialize, Serialize};

use crate::api::MarketData;
use crate::indicators::{calculate_average_volume, close_change_pct, is_above_sma};
use crate::models::{Bar, BarSpec};

/// Sector name -> sector ETF
pub const SECTOR_ETFS: &[(&str, &str)] = &[
    ("technology", "XLK"),
    ("consumer_discretionary", "XLY"),
    ("energy", "XLE"),
    ("financials", "XLF"),
    ("healthcare", "XLV"),
    ("industrials", "XLI"),
    ("consumer_staples", "XLP"),
    ("utilities", "XLU"),
    ("materials", "XLB"),
    ("real_estate", "XLRE"),
    ("communication", "XLC"),
];

const SECTOR_MEMBERS: &[(&str, &[&str])] = &[
    (
        "technology",
        &["AAPL", "MSFT", "NVDA", "AMD", "META", "GOOGL", "AVGO", "ADBE"],
    ),
    (
        "consumer_discretionary",
        &["AMZN", "TSLA", "HD", "NKE", "SBUX", "MCD", "LOW"],
    ),
    ("healthcare", &["UNH", "JNJ", "LLY", "ABBV", "TMO"]),
    ("energy", &["XOM", "CVX", "COP", "SLB"]),
];

pub fn sector_for(ticker: &str) -> Option<&'static str> {
    let ticker = ticker.to_uppercase();
    SECTOR_MEMBERS
        .iter()
        .find(|(_, members)| members.contains(&ticker.as_str()))
        .map(|(sector, _)| *sector)
}

pub fn sector_etf(sector: &str) -> Option<&'static str> {
    SECTOR_ETFS
        .iter()
        .find(|(name, _)| *name == sector)
        .map(|(_, etf)| *etf)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorConfig {
    pub min_change: f64,
    pub min_volume_ratio: f64,
    pub volume_period: usize,
    pub sma_period: usize,
}

impl Default for SectorConfig {
    fn default() -> Self {
        Self {
            min_change: 0.005,     // +0.5%
            min_volume_ratio: 1.2, // 1.2x the 20-bar average
            volume_period: 20,
            sma_period: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SectorStatus {
    pub sector: String,
    pub etf: String,
    pub change_pct: f64, // Percent units
    pub volume_ratio: f64,
    pub above_sma: Option<bool>,
    pub bullish: bool,
}

pub struct SectorFilter {
    config: SectorConfig,
}

impl SectorFilter {
    pub fn new(config: SectorConfig) -> Self {
        Self { config }
    }

    pub fn status_from_bars(&self, sector: &str, etf: &str, bars: &[Bar]) -> Option<SectorStatus> {
        let change_pct = close_change_pct(bars)? * 100.0;
        let last = bars.last()?;

        // ETF average includes the latest bar
        let avg_volume = calculate_average_volume(bars, self.config.volume_period)?;
        let volume_ratio = if avg_volume > 0.0 {
            last.volume as f64 / avg_volume
        } else {
            0.0
        };

        let bullish = change_pct >= self.config.min_change * 100.0
            && volume_ratio >= self.config.min_volume_ratio;

        Some(SectorStatus {
            sector: sector.to_string(),
            etf: etf.to_string(),
            change_pct,
            volume_ratio,
            above_sma: is_above_sma(bars, self.config.sma_period),
            bullish,
        })
    }

    pub async fn sector_status(
        &self,
        market: &dyn MarketData,
        sector: &str,
        bars: &BarSpec,
    ) -> Option<SectorStatus> {
        let etf = sector_etf(sector)?;
        let etf_bars = market
            .historical_bars(etf, &bars.interval, &bars.range)
            .await?;
        self.status_from_bars(sector, etf, &etf_bars)
    }

    /// Sector emotion for a ticker against this cycle's sector statuses
    ///
    /// Tickers outside the sector map never block.
    pub fn evaluate(&self, ticker: &str, statuses: &[SectorStatus]) -> (bool, String) {
        let sector = match sector_for(ticker) {
            Some(sector) => sector,
            None => return (true, "Sector unknown (not blocking)".to_string()),
        };

        match statuses.iter().find(|s| s.sector == sector) {
            Some(status) if status.bullish => (
                true,
                format!("Sector {} favorable ({:+.2}%)", sector, status.change_pct),
            ),
            Some(status) => (
                false,
                format!(
                    "Sector {} not bullish ({:+.2}%, volume x{:.2})",
                    sector, status.change_pct, status.volume_ratio
                ),
            ),
            None => (false, format!("Sector {} not bullish (no data)", sector)),
        }
    }

    pub async fn all_sector_statuses(
        &self,
        market: &dyn MarketData,
        bars: &BarSpec,
    ) -> Vec<SectorStatus> {
        let mut statuses = Vec::new();
        for (sector, _) in SECTOR_ETFS {
            if let Some(status) = self.sector_status(market, sector, bars).await {
                statuses.push(status);
            }
        }
        statuses
    }
}

impl Default for SectorFilter {
    fn default() -> Self {
        Self::new(SectorConfig::default())
    }
}

/// Bullish sectors, strongest first
pub fn bullish_sectors(statuses: &[SectorStatus]) -> Vec<SectorStatus> {
    let mut bullish: Vec<SectorStatus> = statuses.iter().filter(|s| s.bullish).cloned().collect();
    bullish.sort_by(|a, b| b.change_pct.total_cmp(&a.change_pct));
    bullish
}

/// Share of bullish sectors, 0-100 (50 when nothing is known)
pub fn sector_strength(statuses: &[SectorStatus]) -> u8 {
    if statuses.is_empty() {
        return 50;
    }
    let bullish = statuses.iter().filter(|s| s.bullish).count();
    (bullish * 100 / statuses.len()) as u8
}
