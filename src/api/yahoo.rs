use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::time::{sleep, Duration};

use super::{ApiError, MarketData};
use crate::models::{Bar, Quote};

const YAHOO_API_BASE: &str = "https://query1.finance.yahoo.com";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Yahoo Finance market data client (chart bars + quotes)
#[derive(Clone)]
pub struct YahooClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    quote_response: QuoteBody,
}

#[derive(Debug, Deserialize)]
struct QuoteBody {
    result: Vec<QuoteEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteEntry {
    regular_market_price: Option<f64>,
    bid: Option<f64>,
    ask: Option<f64>,
    bid_size: Option<u64>,
    ask_size: Option<u64>,
    regular_market_volume: Option<u64>,
}

impl YahooClient {
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(YAHOO_API_BASE)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) momentumbot")
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch OHLCV bars, retrying transient failures with exponential backoff
    pub async fn fetch_bars(
        &self,
        ticker: &str,
        interval: &str,
        range: &str,
    ) -> Result<Vec<Bar>, ApiError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, ticker);
        let query = [("interval", interval), ("range", range)];

        let response: ChartResponse = self.get_json(&url, &query).await?;

        if let Some(err) = response.chart.error {
            return Err(ApiError::Parse(err.description));
        }

        let result = response
            .chart
            .result
            .and_then(|mut r| r.pop())
            .ok_or(ApiError::NotFound)?;

        let quote = result
            .indicators
            .quote
            .first()
            .ok_or_else(|| ApiError::Parse("No quote data".into()))?;

        let mut bars = Vec::with_capacity(result.timestamp.len());
        for (i, &ts) in result.timestamp.iter().enumerate() {
            // Yahoo leaves gaps as nulls; skip incomplete samples
            if let (Some(o), Some(h), Some(l), Some(c), Some(v), Some(timestamp)) = (
                quote.open.get(i).and_then(|x| *x),
                quote.high.get(i).and_then(|x| *x),
                quote.low.get(i).and_then(|x| *x),
                quote.close.get(i).and_then(|x| *x),
                quote.volume.get(i).and_then(|x| *x),
                Utc.timestamp_opt(ts, 0).single(),
            ) {
                bars.push(Bar {
                    timestamp,
                    open: o,
                    high: h,
                    low: l,
                    close: c,
                    volume: v.max(0.0) as u64,
                });
            }
        }

        if bars.is_empty() {
            return Err(ApiError::NotFound);
        }

        Ok(bars)
    }

    pub async fn fetch_quote(&self, ticker: &str) -> Result<Quote, ApiError> {
        let url = format!("{}/v7/finance/quote", self.base_url);
        let query = [("symbols", ticker)];

        let response: QuoteResponse = self.get_json(&url, &query).await?;
        let entry = response
            .quote_response
            .result
            .into_iter()
            .next()
            .ok_or(ApiError::NotFound)?;

        let last = entry.regular_market_price.ok_or(ApiError::NotFound)?;

        Ok(Quote {
            last,
            bid: entry.bid.unwrap_or(0.0),
            ask: entry.ask.unwrap_or(0.0),
            bid_size: entry.bid_size.unwrap_or(0),
            ask_size: entry.ask_size.unwrap_or(0),
            volume: entry.regular_market_volume.unwrap_or(0),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let mut last_error = ApiError::NotFound;

        for attempt in 1..=MAX_RETRIES {
            match self.client.get(url).query(query).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .map_err(|e| ApiError::Parse(e.to_string()));
                    }

                    // Only rate limits and server errors are worth retrying
                    if status.as_u16() != 429 && !status.is_server_error() {
                        return Err(ApiError::Http(status.as_u16()));
                    }
                    last_error = ApiError::Http(status.as_u16());
                }
                Err(e) => {
                    last_error = ApiError::Network(e.to_string());
                }
            }

            if attempt < MAX_RETRIES {
                let backoff_ms = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                tracing::debug!(
                    "Yahoo request failed ({}), retrying in {}ms (attempt {}/{})",
                    last_error,
                    backoff_ms,
                    attempt,
                    MAX_RETRIES
                );
                sleep(Duration::from_millis(backoff_ms)).await;
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl MarketData for YahooClient {
    async fn current_quote(&self, ticker: &str) -> Option<Quote> {
        match self.fetch_quote(ticker).await {
            Ok(quote) => Some(quote),
            Err(e) => {
                tracing::warn!("Quote unavailable for {}: {}", ticker, e);
                None
            }
        }
    }

    async fn historical_bars(
        &self,
        ticker: &str,
        interval: &str,
        range: &str,
    ) -> Option<Vec<Bar>> {
        match self.fetch_bars(ticker, interval, range).await {
            Ok(bars) => Some(bars),
            Err(e) => {
                tracing::warn!("Bars unavailable for {} ({} / {}): {}", ticker, interval, range, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHART_BODY: &str = r#"{
        "chart": {
            "result": [{
                "timestamp": [1700000000, 1700000300, 1700000600],
                "indicators": {
                    "quote": [{
                        "open":   [100.0, 101.0, null],
                        "high":   [101.5, 102.0, 103.0],
                        "low":    [99.5, 100.5, 101.0],
                        "close":  [101.0, 101.8, 102.5],
                        "volume": [12000, 15000, 9000]
                    }]
                }
            }],
            "error": null
        }
    }"#;

    #[tokio::test]
    async fn test_fetch_bars_skips_incomplete_samples() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v8/finance/chart/AAPL")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(CHART_BODY)
            .create_async()
            .await;

        let client = YahooClient::with_base_url(&server.url()).unwrap();
        let bars = client.fetch_bars("AAPL", "5m", "1d").await.unwrap();

        mock.assert_async().await;
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 101.8);
        assert_eq!(bars[1].volume, 15000);
    }

    #[tokio::test]
    async fn test_fetch_quote() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v7/finance/quote")
            .match_query(mockito::Matcher::UrlEncoded("symbols".into(), "AAPL".into()))
            .with_status(200)
            .with_body(
                r#"{"quoteResponse":{"result":[{"regularMarketPrice":190.5,"bid":190.4,"ask":190.6,"bidSize":8,"askSize":12,"regularMarketVolume":5000000}]}}"#,
            )
            .create_async()
            .await;

        let client = YahooClient::with_base_url(&server.url()).unwrap();
        let quote = client.fetch_quote("AAPL").await.unwrap();

        assert_eq!(quote.last, 190.5);
        assert_eq!(quote.bid_size, 8);
        assert_eq!(quote.ask_size, 12);
    }

    #[tokio::test]
    async fn test_client_error_degrades_to_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v7/finance/quote")
            .match_query(mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let client = YahooClient::with_base_url(&server.url()).unwrap();
        assert!(client.current_quote("NOPE").await.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires network
    async fn test_live_spy_bars() {
        let client = YahooClient::new().unwrap();
        let bars = client.historical_bars("SPY", "5m", "1d").await;
        assert!(bars.is_some());
    }
}
