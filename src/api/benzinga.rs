use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;

use super::NewsSource;
use crate::models::{Article, EarningsEvent, RatingChange, ReleaseTime};

const BENZINGA_API_BASE: &str = "https://api.benzinga.com/api/v2.1";
const RATE_LIMIT_RPM: u32 = 60;
const NEWS_PAGE_SIZE: &str = "50";

type BenzingaRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Benzinga news, earnings calendar and analyst ratings client
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct BenzingaClient {
    client: Client,
    api_key: String,
    base_url: String,
    rate_limiter: Arc<BenzingaRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct EarningsResponse {
    #[serde(default)]
    earnings: Vec<EarningsEntry>,
}

#[derive(Debug, Deserialize)]
struct EarningsEntry {
    ticker: String,
    date: String,
    #[serde(default)]
    time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    created: String,
}

#[derive(Debug, Deserialize)]
struct RatingsResponse {
    #[serde(default)]
    ratings: Vec<RatingEntry>,
}

#[derive(Debug, Deserialize)]
struct RatingEntry {
    #[serde(alias = "action_company")]
    action: String,
    #[serde(default)]
    analyst: String,
    date: String,
}

impl BenzingaClient {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, BENZINGA_API_BASE)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .query(&[("token", self.api_key.as_str())])
            .query(params)
            .send()
            .await
            .with_context(|| format!("Benzinga request to {} failed", endpoint))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Benzinga API error ({}) on {}", status, endpoint);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse Benzinga {} response", endpoint))
    }

    pub async fn fetch_earnings(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<EarningsEvent>> {
        let params = [
            ("parameters[tickers]", ticker.to_uppercase()),
            ("parameters[date_from]", from.format("%Y-%m-%d").to_string()),
            ("parameters[date_to]", to.format("%Y-%m-%d").to_string()),
        ];
        let response: EarningsResponse = self.get("calendar/earnings", &params).await?;

        let ticker = ticker.to_uppercase();
        let events = response
            .earnings
            .into_iter()
            .filter(|e| e.ticker.to_uppercase() == ticker)
            .filter_map(|e| {
                let date = NaiveDate::parse_from_str(&e.date, "%Y-%m-%d").ok()?;
                Some(EarningsEvent {
                    ticker: e.ticker.to_uppercase(),
                    date,
                    release: parse_release_time(e.time.as_deref()),
                })
            })
            .collect();

        Ok(events)
    }

    pub async fn fetch_news(&self, ticker: &str, since: DateTime<Utc>) -> Result<Vec<Article>> {
        let params = [
            ("pageSize", NEWS_PAGE_SIZE.to_string()),
            ("displayOutput", "full".to_string()),
            ("dateFrom", since.format("%Y-%m-%d").to_string()),
            ("dateTo", Utc::now().format("%Y-%m-%d").to_string()),
            ("tickers", ticker.to_uppercase()),
        ];
        let entries: Vec<NewsEntry> = self.get("news", &params).await?;

        let articles = entries
            .into_iter()
            .filter_map(|n| {
                let created = parse_created(&n.created)?;
                Some(Article {
                    title: n.title,
                    body: n.body,
                    created,
                })
            })
            .filter(|a| a.created >= since)
            .collect();

        Ok(articles)
    }

    pub async fn fetch_ratings(&self, ticker: &str, since: NaiveDate) -> Result<Vec<RatingChange>> {
        let params = [
            ("parameters[date_from]", since.format("%Y-%m-%d").to_string()),
            ("parameters[date_to]", Utc::now().format("%Y-%m-%d").to_string()),
            ("parameters[tickers]", ticker.to_uppercase()),
        ];
        let response: RatingsResponse = self.get("calendar/ratings", &params).await?;

        let ratings = response
            .ratings
            .into_iter()
            .filter_map(|r| {
                let date = NaiveDate::parse_from_str(&r.date, "%Y-%m-%d").ok()?;
                Some(RatingChange {
                    action: r.action,
                    analyst: r.analyst,
                    date,
                })
            })
            .filter(|r| r.date >= since)
            .collect();

        Ok(ratings)
    }
}

/// "bmo", or a clock time before 09:30, resolves to before the open; anything else to after the close
fn parse_release_time(time: Option<&str>) -> ReleaseTime {
    match time.map(|t| t.trim().to_lowercase()) {
        Some(t) if t == "bmo" => ReleaseTime::BeforeOpen,
        Some(t) => match NaiveTime::parse_from_str(&t, "%H:%M:%S") {
            Ok(clock) if Some(clock) < NaiveTime::from_hms_opt(9, 30, 0) => ReleaseTime::BeforeOpen,
            _ => ReleaseTime::AfterClose,
        },
        None => ReleaseTime::AfterClose,
    }
}

/// Benzinga uses RFC 2822 dates on news items; accept RFC 3339 too
fn parse_created(created: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(created)
        .or_else(|_| DateTime::parse_from_rfc3339(created))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl NewsSource for BenzingaClient {
    async fn earnings_calendar(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Option<Vec<EarningsEvent>> {
        match self.fetch_earnings(ticker, from, to).await {
            Ok(events) => Some(events),
            Err(e) => {
                tracing::warn!("Earnings lookup failed for {}: {:#}", ticker, e);
                None
            }
        }
    }

    async fn recent_news(&self, ticker: &str, since: DateTime<Utc>) -> Option<Vec<Article>> {
        match self.fetch_news(ticker, since).await {
            Ok(articles) => Some(articles),
            Err(e) => {
                tracing::warn!("News lookup failed for {}: {:#}", ticker, e);
                None
            }
        }
    }

    async fn rating_changes(&self, ticker: &str, since: NaiveDate) -> Option<Vec<RatingChange>> {
        match self.fetch_ratings(ticker, since).await {
            Ok(ratings) => Some(ratings),
            Err(e) => {
                tracing::warn!("Ratings lookup failed for {}: {:#}", ticker, e);
                None
            }
        }
    }
}

/// Stand-in used when no news API key is configured; every lookup is unavailable
#[derive(Debug, Clone, Default)]
pub struct NoNews;

#[async_trait]
impl NewsSource for NoNews {
    async fn earnings_calendar(
        &self,
        _ticker: &str,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Option<Vec<EarningsEvent>> {
        None
    }

    async fn recent_news(&self, _ticker: &str, _since: DateTime<Utc>) -> Option<Vec<Article>> {
        None
    }

    async fn rating_changes(&self, _ticker: &str, _since: NaiveDate) -> Option<Vec<RatingChange>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_parse_release_time() {
        assert_eq!(parse_release_time(Some("bmo")), ReleaseTime::BeforeOpen);
        assert_eq!(parse_release_time(Some("amc")), ReleaseTime::AfterClose);
        assert_eq!(parse_release_time(Some("07:00:00")), ReleaseTime::BeforeOpen);
        assert_eq!(parse_release_time(Some("16:05:00")), ReleaseTime::AfterClose);
        assert_eq!(parse_release_time(None), ReleaseTime::AfterClose);
    }

    #[test]
    fn test_parse_created_formats() {
        assert!(parse_created("Tue, 14 Nov 2023 13:20:00 -0400").is_some());
        assert!(parse_created("2023-11-14T17:20:00Z").is_some());
        assert!(parse_created("yesterday").is_none());
    }

    #[tokio::test]
    async fn test_fetch_news_filters_old_articles() {
        let now = Utc::now();
        let fresh = (now - Duration::minutes(5)).to_rfc3339();
        let stale = (now - Duration::hours(3)).to_rfc3339();
        let body = format!(
            r#"[{{"title":"Fresh","body":"","created":"{}"}},{{"title":"Stale","body":"","created":"{}"}}]"#,
            fresh, stale
        );

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/news")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("token".into(), "secret".into()),
                mockito::Matcher::UrlEncoded("tickers".into(), "AAPL".into()),
            ]))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let client = BenzingaClient::with_base_url("secret".to_string(), &server.url()).unwrap();
        let articles = client
            .fetch_news("aapl", now - Duration::minutes(30))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Fresh");
    }

    #[tokio::test]
    async fn test_fetch_earnings() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/calendar/earnings")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"earnings":[
                    {"ticker":"AAPL","date":"2024-02-01","time":"16:30:00"},
                    {"ticker":"MSFT","date":"2024-02-01","time":"bmo"}
                ]}"#,
            )
            .create_async()
            .await;

        let client = BenzingaClient::with_base_url("secret".to_string(), &server.url()).unwrap();
        let from = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 2, 2).unwrap();
        let events = client.fetch_earnings("AAPL", from, to).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].release, ReleaseTime::AfterClose);
    }

    #[tokio::test]
    async fn test_http_failure_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/calendar/ratings")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .create_async()
            .await;

        let client = BenzingaClient::with_base_url("bad".to_string(), &server.url()).unwrap();
        let since = Utc::now().date_naive();
        assert!(client.rating_changes("AAPL", since).await.is_none());
    }
}
