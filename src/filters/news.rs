//! Earnings, negative news and analyst downgrade gates
//!
//! A `None` from the news source means the lookup failed. Whether that blocks
//! an entry is decided by `fail_closed`.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::NewsSource;
use crate::filters::time::SessionClock;
use crate::models::{Article, EarningsEvent, RatingChange, ReleaseTime};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub earnings_horizon_hours: i64,
    pub news_window_minutes: i64,
    pub downgrade_window_days: i64,
    pub emergency_news_minutes: i64,
    pub negative_keywords: Vec<String>,
    pub fail_closed: bool,
}

impl Default for NewsConfig {
    fn default() -> Self {
        let negative_keywords = [
            "downgrade",
            "lawsuit",
            "investigation",
            "recall",
            "fraud",
            "bankruptcy",
            "miss",
            "below expectations",
            "disappointing",
            "weak",
            "loss",
            "decline",
        ]
        .iter()
        .map(|k| k.to_string())
        .collect();

        Self {
            earnings_horizon_hours: 48,
            news_window_minutes: 30,
            downgrade_window_days: 1,
            emergency_news_minutes: 10,
            negative_keywords,
            fail_closed: false, // Unavailable news does not block entries
        }
    }
}

/// Scheduled earnings release resolved to a session instant
#[derive(Debug, Clone, PartialEq)]
pub struct UpcomingEarnings {
    pub event: EarningsEvent,
    pub release_at: DateTime<Utc>,
    pub hours_until: f64,
}

pub struct NewsFilter {
    config: NewsConfig,
}

impl NewsFilter {
    pub fn new(config: NewsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NewsConfig {
        &self.config
    }

    fn unavailable(&self, what: &str) -> (bool, String) {
        if self.config.fail_closed {
            (false, format!("{} unavailable (fail-closed)", what))
        } else {
            (true, format!("{} unavailable (fail-open)", what))
        }
    }

    /// Case-insensitive keyword match over title and body
    pub fn is_negative(&self, article: &Article) -> bool {
        let text = format!("{} {}", article.title, article.body).to_lowercase();
        self.config
            .negative_keywords
            .iter()
            .any(|keyword| text.contains(&keyword.to_lowercase()))
    }

    /// First release inside the horizon: before-open resolves to the session
    /// open, after-close to the session close of the release date
    pub async fn earnings_in_window(
        &self,
        source: &dyn NewsSource,
        clock: &SessionClock,
        ticker: &str,
        now: DateTime<Utc>,
    ) -> Option<Option<UpcomingEarnings>> {
        let horizon = self.config.earnings_horizon_hours;
        let today = clock.local_date(now);
        let until = today + Duration::days(horizon / 24 + 1);

        let events = source.earnings_calendar(ticker, today, until).await?;

        let upcoming = events
            .into_iter()
            .filter(|event| event.ticker.eq_ignore_ascii_case(ticker))
            .filter_map(|event| {
                let release_at = match event.release {
                    ReleaseTime::BeforeOpen => clock.session_open_on(event.date),
                    ReleaseTime::AfterClose => clock.session_close_on(event.date),
                }?;
                let hours_until = (release_at - now).num_seconds() as f64 / 3600.0;
                Some(UpcomingEarnings {
                    event,
                    release_at,
                    hours_until,
                })
            })
            .find(|upcoming| upcoming.hours_until >= 0.0 && upcoming.hours_until <= horizon as f64);

        Some(upcoming)
    }

    pub async fn check_earnings(
        &self,
        source: &dyn NewsSource,
        clock: &SessionClock,
        ticker: &str,
        now: DateTime<Utc>,
    ) -> (bool, String) {
        match self.earnings_in_window(source, clock, ticker, now).await {
            Some(Some(upcoming)) => (
                false,
                format!("Earnings in {:.1}h", upcoming.hours_until),
            ),
            Some(None) => (true, "OK".to_string()),
            None => self.unavailable("Earnings calendar"),
        }
    }

    /// Negative articles within the last `minutes`
    pub async fn negative_news(
        &self,
        source: &dyn NewsSource,
        ticker: &str,
        minutes: i64,
        now: DateTime<Utc>,
    ) -> Option<Vec<Article>> {
        let since = now - Duration::minutes(minutes);
        let articles = source.recent_news(ticker, since).await?;
        Some(
            articles
                .into_iter()
                .filter(|article| article.created >= since && self.is_negative(article))
                .collect(),
        )
    }

    pub async fn check_negative_news(
        &self,
        source: &dyn NewsSource,
        ticker: &str,
        now: DateTime<Utc>,
    ) -> (bool, String) {
        match self
            .negative_news(source, ticker, self.config.news_window_minutes, now)
            .await
        {
            Some(negative) if !negative.is_empty() => (
                false,
                format!("{} recent negative news item(s)", negative.len()),
            ),
            Some(_) => (true, "OK".to_string()),
            None => self.unavailable("News feed"),
        }
    }

    /// Downgrades dated within the last `days` exchange-local days
    pub async fn downgrades(
        &self,
        source: &dyn NewsSource,
        clock: &SessionClock,
        ticker: &str,
        days: i64,
        now: DateTime<Utc>,
    ) -> Option<Vec<RatingChange>> {
        let since = clock.local_date(now) - Duration::days(days);
        let ratings = source.rating_changes(ticker, since).await?;
        Some(
            ratings
                .into_iter()
                .filter(|rating| rating.date >= since && rating.is_downgrade())
                .collect(),
        )
    }

    pub async fn check_downgrade(
        &self,
        source: &dyn NewsSource,
        clock: &SessionClock,
        ticker: &str,
        now: DateTime<Utc>,
    ) -> (bool, String) {
        match self
            .downgrades(source, clock, ticker, self.config.downgrade_window_days, now)
            .await
        {
            Some(downgrades) if !downgrades.is_empty() => (
                false,
                format!("{} recent downgrade(s)", downgrades.len()),
            ),
            Some(_) => (true, "OK".to_string()),
            None => self.unavailable("Ratings feed"),
        }
    }
}

impl Default for NewsFilter {
    fn default() -> Self {
        Self::new(NewsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::time::SessionConfig;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};

    #[derive(Default)]
    struct StubNews {
        earnings: Option<Vec<EarningsEvent>>,
        articles: Option<Vec<Article>>,
        ratings: Option<Vec<RatingChange>>,
    }

    #[async_trait]
    impl NewsSource for StubNews {
        async fn earnings_calendar(
            &self,
            _ticker: &str,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> Option<Vec<EarningsEvent>> {
            self.earnings.clone()
        }

        async fn recent_news(&self, _ticker: &str, _since: DateTime<Utc>) -> Option<Vec<Article>> {
            self.articles.clone()
        }

        async fn rating_changes(
            &self,
            _ticker: &str,
            _since: NaiveDate,
        ) -> Option<Vec<RatingChange>> {
            self.ratings.clone()
        }
    }

    fn clock() -> SessionClock {
        SessionClock::new(SessionConfig::default()).unwrap()
    }

    // Tuesday 2024-01-09 11:00 New York (UTC-5)
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 9, 16, 0, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn article(title: &str, minutes_ago: i64) -> Article {
        Article {
            title: title.to_string(),
            body: String::new(),
            created: now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn test_earnings_after_close_today_blocks() {
        let source = StubNews {
            earnings: Some(vec![EarningsEvent {
                ticker: "AAPL".to_string(),
                date: date(9),
                release: ReleaseTime::AfterClose,
            }]),
            ..Default::default()
        };

        let (ok, reason) = NewsFilter::default()
            .check_earnings(&source, &clock(), "AAPL", now())
            .await;
        assert!(!ok);
        assert_eq!(reason, "Earnings in 5.0h");
    }

    #[tokio::test]
    async fn test_earnings_outside_horizon_passes() {
        // Friday before open is 70.5h away
        let source = StubNews {
            earnings: Some(vec![EarningsEvent {
                ticker: "AAPL".to_string(),
                date: date(12),
                release: ReleaseTime::BeforeOpen,
            }]),
            ..Default::default()
        };

        let filter = NewsFilter::default();
        let (ok, _) = filter.check_earnings(&source, &clock(), "AAPL", now()).await;
        assert!(ok);
    }

    #[tokio::test]
    async fn test_past_release_is_ignored() {
        let source = StubNews {
            earnings: Some(vec![EarningsEvent {
                ticker: "AAPL".to_string(),
                date: date(9),
                release: ReleaseTime::BeforeOpen,
            }]),
            ..Default::default()
        };

        let upcoming = NewsFilter::default()
            .earnings_in_window(&source, &clock(), "AAPL", now())
            .await;
        assert_eq!(upcoming, Some(None));
    }

    #[tokio::test]
    async fn test_negative_news_keyword_match() {
        let source = StubNews {
            articles: Some(vec![
                article("Company beats estimates", 5),
                article("Regulators open INVESTIGATION into accounting", 12),
            ]),
            ..Default::default()
        };

        let filter = NewsFilter::default();
        let (ok, reason) = filter.check_negative_news(&source, "AAPL", now()).await;
        assert!(!ok);
        assert_eq!(reason, "1 recent negative news item(s)");

        // Only the last 10 minutes count for emergency exits
        let emergency = filter.negative_news(&source, "AAPL", 10, now()).await.unwrap();
        assert!(emergency.is_empty());
    }

    #[tokio::test]
    async fn test_downgrade_detection() {
        let source = StubNews {
            ratings: Some(vec![
                RatingChange {
                    action: "Upgrades".to_string(),
                    analyst: "Acme".to_string(),
                    date: date(9),
                },
                RatingChange {
                    action: "Downgrades".to_string(),
                    analyst: "Globex".to_string(),
                    date: date(8),
                },
            ]),
            ..Default::default()
        };

        let (ok, reason) = NewsFilter::default()
            .check_downgrade(&source, &clock(), "AAPL", now())
            .await;
        assert!(!ok);
        assert_eq!(reason, "1 recent downgrade(s)");
    }

    #[tokio::test]
    async fn test_unavailable_source_policy() {
        let source = StubNews::default();

        let open = NewsFilter::default();
        assert!(open.check_negative_news(&source, "AAPL", now()).await.0);
        assert!(open.check_earnings(&source, &clock(), "AAPL", now()).await.0);

        let closed = NewsFilter::new(NewsConfig {
            fail_closed: true,
            ..NewsConfig::default()
        });
        let (ok, reason) = closed.check_downgrade(&source, &clock(), "AAPL", now()).await;
        assert!(!ok);
        assert!(reason.contains("fail-closed"));
    }
}
