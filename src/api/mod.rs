//! External data sources: market data and news/calendar
//!
//! Collaborators report "nothing available" through `Option`. `None` from a
//! `NewsSource` means the lookup itself failed; an empty list means it succeeded
//! and found nothing.
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::models::{Article, Bar, EarningsEvent, Quote, RatingChange};

pub mod benzinga;
pub mod yahoo;

pub use benzinga::{BenzingaClient, NoNews};
pub use yahoo::YahooClient;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {0}")]
    Http(u16),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("no data returned")]
    NotFound,
}

#[async_trait]
pub trait MarketData: Send + Sync {
    /// Latest quote, or `None` when unavailable
    async fn current_quote(&self, ticker: &str) -> Option<Quote>;

    /// Time-ordered bars for `ticker`, e.g. interval "5m" over range "1d"
    async fn historical_bars(&self, ticker: &str, interval: &str, range: &str)
        -> Option<Vec<Bar>>;
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Earnings releases scheduled between `from` and `to` (inclusive)
    async fn earnings_calendar(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Option<Vec<EarningsEvent>>;

    /// Articles created at or after `since`
    async fn recent_news(&self, ticker: &str, since: DateTime<Utc>) -> Option<Vec<Article>>;

    /// Analyst rating actions dated on or after `since`
    async fn rating_changes(&self, ticker: &str, since: NaiveDate) -> Option<Vec<RatingChange>>;
}
