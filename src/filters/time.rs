use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Regular session and the excluded opening window, in exchange-local time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub timezone: String,
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub excluded_start: NaiveTime,
    pub excluded_end: NaiveTime,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            open: hm(9, 30),
            close: hm(16, 0),
            excluded_start: hm(9, 30), // First 45 minutes are too noisy
            excluded_end: hm(10, 15),
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

fn is_weekend(day: Weekday) -> bool {
    matches!(day, Weekday::Sat | Weekday::Sun)
}

/// Exchange clock: converts instants to local session time
#[derive(Debug, Clone)]
pub struct SessionClock {
    tz: Tz,
    config: SessionConfig,
}

impl SessionClock {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let tz: Tz = config
            .timezone
            .parse()
            .map_err(|e| anyhow!("Invalid timezone {}: {}", config.timezone, e))?;
        Ok(Self { tz, config })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn local(&self, now: DateTime<Utc>) -> DateTime<Tz> {
        now.with_timezone(&self.tz)
    }

    /// Local date in exchange time
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local(now).date_naive()
    }

    /// Instant of a local wall-clock time on a given date
    pub fn instant_at(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.tz
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn session_open_on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        self.instant_at(date, self.config.open)
    }

    pub fn session_close_on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        self.instant_at(date, self.config.close)
    }

    /// Weekday and open <= t < close
    pub fn is_trading_hours(&self, now: DateTime<Utc>) -> (bool, String) {
        let local = self.local(now);
        let time = local.time();

        if is_weekend(local.weekday()) {
            return (false, format!("Weekend ({})", local.weekday()));
        }
        if time < self.config.open {
            return (
                false,
                format!("Market not open yet (opens {})", self.config.open.format("%H:%M")),
            );
        }
        if time >= self.config.close {
            return (
                false,
                format!("Market closed (closes {})", self.config.close.format("%H:%M")),
            );
        }

        (true, "OK".to_string())
    }

    pub fn is_excluded_time(&self, now: DateTime<Utc>) -> (bool, String) {
        let time = self.local(now).time();

        if self.config.excluded_start <= time && time < self.config.excluded_end {
            return (
                true,
                format!(
                    "Volatile window excluded ({}-{})",
                    self.config.excluded_start.format("%H:%M"),
                    self.config.excluded_end.format("%H:%M")
                ),
            );
        }

        (false, "OK".to_string())
    }

    /// Time filter: inside the session AND outside the excluded window
    pub fn can_trade_now(&self, now: DateTime<Utc>) -> (bool, String) {
        let (is_trading, reason) = self.is_trading_hours(now);
        if !is_trading {
            return (false, reason);
        }

        let (is_excluded, reason) = self.is_excluded_time(now);
        if is_excluded {
            return (false, reason);
        }

        (true, "OK".to_string())
    }

    /// Minutes until the next session open (0 while the session is open)
    pub fn minutes_until_open(&self, now: DateTime<Utc>) -> i64 {
        if self.is_trading_hours(now).0 {
            return 0;
        }

        let mut date = self.local_date(now);
        for _ in 0..8 {
            if !is_weekend(date.weekday()) {
                if let Some(open) = self.session_open_on(date) {
                    if open > now {
                        return (open - now).num_minutes();
                    }
                }
            }
            date += Duration::days(1);
        }

        0
    }

    /// Minutes until the excluded window ends (0 outside it)
    pub fn minutes_until_excluded_end(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_excluded_time(now).0 {
            return 0;
        }

        self.instant_at(self.local_date(now), self.config.excluded_end)
            .map(|end| (end - now).num_minutes())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> SessionClock {
        SessionClock::new(SessionConfig::default()).unwrap()
    }

    // January: New York is UTC-5
    fn et(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour + 5, minute, 0).unwrap()
    }

    #[test]
    fn test_trading_hours() {
        let clock = clock();
        // Monday 2024-01-08
        assert!(clock.is_trading_hours(et(8, 9, 30)).0);
        assert!(clock.is_trading_hours(et(8, 15, 59)).0);
        assert!(!clock.is_trading_hours(et(8, 9, 29)).0);
        assert!(!clock.is_trading_hours(et(8, 16, 0)).0);
    }

    #[test]
    fn test_weekend_is_closed() {
        let (ok, reason) = clock().is_trading_hours(et(13, 11, 0));
        assert!(!ok);
        assert!(reason.contains("Weekend"));
    }

    #[test]
    fn test_excluded_window() {
        let clock = clock();
        let (ok, reason) = clock.can_trade_now(et(8, 10, 0));
        assert!(!ok);
        assert!(reason.contains("09:30-10:15"));

        assert!(clock.can_trade_now(et(8, 10, 15)).0);
        assert!(clock.can_trade_now(et(8, 14, 0)).0);
    }

    #[test]
    fn test_summer_time_offset() {
        // July: New York is UTC-4, 10:30 local = 14:30 UTC
        let now = Utc.with_ymd_and_hms(2024, 7, 9, 14, 30, 0).unwrap();
        assert!(clock().can_trade_now(now).0);
    }

    #[test]
    fn test_minutes_until_open() {
        let clock = clock();
        assert_eq!(clock.minutes_until_open(et(8, 9, 0)), 30);
        assert_eq!(clock.minutes_until_open(et(8, 11, 0)), 0);
        // Friday after close -> Monday 09:30
        let friday_close = et(12, 16, 0);
        assert_eq!(clock.minutes_until_open(friday_close), (2 * 24 + 17) * 60 + 30);
    }

    #[test]
    fn test_minutes_until_excluded_end() {
        let clock = clock();
        assert_eq!(clock.minutes_until_excluded_end(et(8, 9, 45)), 30);
        assert_eq!(clock.minutes_until_excluded_end(et(8, 11, 0)), 0);
    }

    #[test]
    fn test_invalid_timezone() {
        let config = SessionConfig {
            timezone: "Mars/Olympus".to_string(),
            ..SessionConfig::default()
        };
        assert!(SessionClock::new(config).is_err());
    }
}
