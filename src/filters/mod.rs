//! Nine-way entry filter chain
//!
//! Every filter is evaluated for every ticker, even after an earlier one has
//! failed, so the report always explains all of the reasons for a rejection.
pub mod market;
pub mod news;
pub mod sector;
pub mod stock;
pub mod time;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::api::{MarketData, NewsSource};
use crate::models::{Bar, BarSpec, Orderflow};
use crate::watchlist::Watchlist;

pub use market::{market_score, IndexStatus, MarketConfig, MarketFilter, MarketSnapshot, VixMood};
pub use news::{NewsConfig, NewsFilter};
pub use sector::{bullish_sectors, sector_strength, SectorConfig, SectorFilter, SectorStatus};
pub use stock::{StockConfig, StockFilter};
pub use time::{SessionClock, SessionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterName {
    Watchlist,
    Time,
    Earnings,
    Market,
    Sector,
    Stock,
    NegativeNews,
    Downgrade,
    Spread,
}

impl FilterName {
    /// Evaluation order
    pub const ALL: [FilterName; 9] = [
        FilterName::Watchlist,
        FilterName::Time,
        FilterName::Earnings,
        FilterName::Market,
        FilterName::Sector,
        FilterName::Stock,
        FilterName::NegativeNews,
        FilterName::Downgrade,
        FilterName::Spread,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterName::Watchlist => "watchlist",
            FilterName::Time => "time",
            FilterName::Earnings => "earnings",
            FilterName::Market => "market",
            FilterName::Sector => "sector",
            FilterName::Stock => "stock",
            FilterName::NegativeNews => "negative_news",
            FilterName::Downgrade => "downgrade",
            FilterName::Spread => "spread",
        }
    }
}

impl fmt::Display for FilterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    pub passed: bool,
    pub reason: String,
}

impl From<(bool, String)> for FilterResult {
    fn from((passed, reason): (bool, String)) -> Self {
        Self { passed, reason }
    }
}

/// Outcome of all nine filters for one ticker, in evaluation order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterReport {
    pub ticker: String,
    results: Vec<(FilterName, FilterResult)>,
}

impl FilterReport {
    fn new(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            results: Vec::with_capacity(FilterName::ALL.len()),
        }
    }

    fn record(&mut self, name: FilterName, check: (bool, String)) {
        if !check.0 {
            tracing::debug!("❌ {} {}: {}", self.ticker, name, check.1);
        }
        self.results.push((name, check.into()));
    }

    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|(_, result)| result.passed)
    }

    pub fn get(&self, name: FilterName) -> Option<&FilterResult> {
        self.results
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, result)| result)
    }

    pub fn results(&self) -> &[(FilterName, FilterResult)] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// "name: reason" for every failed filter
    pub fn failed_filters(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|(_, result)| !result.passed)
            .map(|(name, result)| format!("{}: {}", name, result.reason))
            .collect()
    }
}

/// Thresholds for every filter in the chain
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub market: MarketConfig,
    pub sector: SectorConfig,
    pub stock: StockConfig,
    pub news: NewsConfig,
    pub bars: BarSpec,
}

/// Per-cycle shared state: one clock reading and one market/sector fetch
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub now: DateTime<Utc>,
    pub market: MarketSnapshot,
    pub sectors: Vec<SectorStatus>,
}

impl CycleContext {
    pub fn new(now: DateTime<Utc>, market: MarketSnapshot, sectors: Vec<SectorStatus>) -> Self {
        Self {
            now,
            market,
            sectors,
        }
    }

    pub fn overview(&self) -> MarketOverview {
        MarketOverview {
            market_score: market_score(&self.market),
            sector_strength: sector_strength(&self.sectors),
            bullish_sectors: bullish_sectors(&self.sectors)
                .into_iter()
                .map(|s| s.sector)
                .collect(),
        }
    }
}

/// Market score, sector strength and the bullish sectors (strongest first)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketOverview {
    pub market_score: u8,
    pub sector_strength: u8,
    pub bullish_sectors: Vec<String>,
}

impl fmt::Display for MarketOverview {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sectors = if self.bullish_sectors.is_empty() {
            "none".to_string()
        } else {
            self.bullish_sectors.join(", ")
        };
        write!(
            f,
            "market score {}/100 | sector strength {}% | bullish sectors: {}",
            self.market_score, self.sector_strength, sectors
        )
    }
}

pub struct FilterChain {
    market_data: Arc<dyn MarketData>,
    news: Arc<dyn NewsSource>,
    watchlist: Arc<dyn Watchlist>,
    clock: SessionClock,
    market_filter: MarketFilter,
    sector_filter: SectorFilter,
    stock_filter: StockFilter,
    news_filter: NewsFilter,
    bars: BarSpec,
}

impl FilterChain {
    pub fn new(
        market_data: Arc<dyn MarketData>,
        news: Arc<dyn NewsSource>,
        watchlist: Arc<dyn Watchlist>,
        clock: SessionClock,
        config: FilterConfig,
    ) -> Self {
        Self {
            market_data,
            news,
            watchlist,
            clock,
            market_filter: MarketFilter::new(config.market),
            sector_filter: SectorFilter::new(config.sector),
            stock_filter: StockFilter::new(config.stock),
            news_filter: NewsFilter::new(config.news),
            bars: config.bars,
        }
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn market_data(&self) -> &dyn MarketData {
        self.market_data.as_ref()
    }

    pub fn news_source(&self) -> &dyn NewsSource {
        self.news.as_ref()
    }

    pub fn news_filter(&self) -> &NewsFilter {
        &self.news_filter
    }

    pub fn watchlist(&self) -> &dyn Watchlist {
        self.watchlist.as_ref()
    }

    pub fn bar_spec(&self) -> &BarSpec {
        &self.bars
    }

    pub fn stock_filter(&self) -> &StockFilter {
        &self.stock_filter
    }

    /// Fetch the market and sector state shared by every ticker in a cycle
    pub async fn cycle_context(&self, now: DateTime<Utc>) -> CycleContext {
        let market = self
            .market_filter
            .snapshot(self.market_data.as_ref(), &self.bars)
            .await;
        let sectors = self
            .sector_filter
            .all_sector_statuses(self.market_data.as_ref(), &self.bars)
            .await;
        CycleContext::new(now, market, sectors)
    }

    pub fn check_time(&self, now: DateTime<Utc>) -> (bool, String) {
        self.clock.can_trade_now(now)
    }

    pub fn check_market(&self, ctx: &CycleContext) -> (bool, String) {
        self.market_filter.evaluate(&ctx.market)
    }

    /// Run all nine filters with bars and orderflow the caller already fetched
    pub async fn validate_with_data(
        &self,
        ticker: &str,
        bars: Option<&[Bar]>,
        orderflow: Option<&Orderflow>,
        ctx: &CycleContext,
    ) -> FilterReport {
        let news = self.news.as_ref();
        let mut report = FilterReport::new(ticker);

        report.record(FilterName::Watchlist, self.watchlist.can_trade(ticker));
        report.record(FilterName::Time, self.check_time(ctx.now));
        report.record(
            FilterName::Earnings,
            self.news_filter
                .check_earnings(news, &self.clock, ticker, ctx.now)
                .await,
        );
        report.record(FilterName::Market, self.check_market(ctx));
        report.record(
            FilterName::Sector,
            self.sector_filter.evaluate(ticker, &ctx.sectors),
        );
        report.record(
            FilterName::Stock,
            self.stock_filter.check_emotion(bars.unwrap_or(&[])),
        );
        report.record(
            FilterName::NegativeNews,
            self.news_filter
                .check_negative_news(news, ticker, ctx.now)
                .await,
        );
        report.record(
            FilterName::Downgrade,
            self.news_filter
                .check_downgrade(news, &self.clock, ticker, ctx.now)
                .await,
        );
        report.record(FilterName::Spread, self.stock_filter.check_spread(orderflow));

        report
    }

    /// Fetch bars and a quote for `ticker`, then run all nine filters
    pub async fn validate_all_filters(&self, ticker: &str, ctx: &CycleContext) -> FilterReport {
        let bars = self
            .market_data
            .historical_bars(ticker, &self.bars.interval, &self.bars.range)
            .await;
        let orderflow = self
            .market_data
            .current_quote(ticker)
            .await
            .map(|quote| Orderflow::from_quote(&quote));

        self.validate_with_data(ticker, bars.as_deref(), orderflow.as_ref(), ctx)
            .await
    }
}
