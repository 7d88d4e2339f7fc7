//! Tradable universe: core and secondary watchlists plus the blacklist
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

/// Membership oracle for the scan universe
pub trait Watchlist: Send + Sync {
    /// Every tradable ticker, sorted and without duplicates
    fn all_tickers(&self) -> Vec<String>;

    fn contains(&self, ticker: &str) -> bool;

    fn is_blacklisted(&self, ticker: &str) -> bool;

    /// Blacklist always overrides watchlist membership
    fn can_trade(&self, ticker: &str) -> (bool, String) {
        if self.is_blacklisted(ticker) {
            return (false, format!("{} is blacklisted", ticker));
        }
        if !self.contains(ticker) {
            return (false, format!("{} is not in the watchlist", ticker));
        }
        (true, "OK".to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
struct StockGroup {
    #[serde(default)]
    stocks: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CoreFile {
    #[serde(default)]
    sectors: HashMap<String, StockGroup>,
}

#[derive(Debug, Default, Deserialize)]
struct SecondaryFile {
    #[serde(default)]
    categories: HashMap<String, StockGroup>,
}

#[derive(Debug, Default, Deserialize)]
struct BlacklistFile {
    #[serde(default, alias = "excluded_tickers")]
    tickers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchlistStats {
    pub core_count: usize,
    pub secondary_count: usize,
    pub total_count: usize,
    pub blacklist_count: usize,
}

/// Watchlist loaded once from JSON files
#[derive(Debug, Clone, Default)]
pub struct FileWatchlist {
    core: BTreeSet<String>,
    secondary: BTreeSet<String>,
    blacklist: BTreeSet<String>,
}

fn normalize<I: IntoIterator<Item = String>>(tickers: I) -> BTreeSet<String> {
    tickers
        .into_iter()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Missing file reads as the default (empty) document
fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        tracing::warn!("⚠️  {} not found, using an empty list", path.display());
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

impl FileWatchlist {
    pub fn new<I, J, K>(core: I, secondary: J, blacklist: K) -> Self
    where
        I: IntoIterator<Item = String>,
        J: IntoIterator<Item = String>,
        K: IntoIterator<Item = String>,
    {
        let blacklist = normalize(blacklist);
        let core: BTreeSet<String> = normalize(core).difference(&blacklist).cloned().collect();
        let secondary: BTreeSet<String> = normalize(secondary)
            .difference(&blacklist)
            .cloned()
            .collect();

        Self {
            core,
            secondary,
            blacklist,
        }
    }

    pub fn load(core_path: &Path, secondary_path: &Path, blacklist_path: &Path) -> Result<Self> {
        let core: CoreFile = read_json(core_path)?;
        let secondary: SecondaryFile = read_json(secondary_path)?;
        let blacklist: BlacklistFile = read_json(blacklist_path)?;

        let watchlist = Self::new(
            core.sectors.into_values().flat_map(|g| g.stocks),
            secondary.categories.into_values().flat_map(|g| g.stocks),
            blacklist.tickers,
        );

        let stats = watchlist.stats();
        tracing::info!(
            "📋 Watchlist loaded: {} core, {} secondary, {} blacklisted",
            stats.core_count,
            stats.secondary_count,
            stats.blacklist_count
        );
        Ok(watchlist)
    }

    pub fn stats(&self) -> WatchlistStats {
        WatchlistStats {
            core_count: self.core.len(),
            secondary_count: self.secondary.len(),
            total_count: self.core.union(&self.secondary).count(),
            blacklist_count: self.blacklist.len(),
        }
    }
}

impl Watchlist for FileWatchlist {
    fn all_tickers(&self) -> Vec<String> {
        self.core.union(&self.secondary).cloned().collect()
    }

    fn contains(&self, ticker: &str) -> bool {
        let ticker = ticker.to_uppercase();
        self.core.contains(&ticker) || self.secondary.contains(&ticker)
    }

    fn is_blacklisted(&self, ticker: &str) -> bool {
        self.blacklist.contains(&ticker.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_blacklist_overrides_membership() {
        let watchlist = FileWatchlist::new(
            strings(&["AAPL", "MSFT"]),
            strings(&["PLTR"]),
            strings(&["msft"]),
        );

        assert_eq!(watchlist.can_trade("AAPL"), (true, "OK".to_string()));
        assert_eq!(
            watchlist.can_trade("MSFT"),
            (false, "MSFT is blacklisted".to_string())
        );
        assert!(!watchlist.can_trade("TSLA").0);
        assert_eq!(watchlist.all_tickers(), strings(&["AAPL", "PLTR"]));
    }

    #[test]
    fn test_load_from_files() {
        let dir = TempDir::new().unwrap();
        let core = dir.path().join("watchlist.json");
        let secondary = dir.path().join("secondary.json");
        let blacklist = dir.path().join("blacklist.json");

        let mut f = fs::File::create(&core).unwrap();
        write!(
            f,
            r#"{{"sectors": {{"technology": {{"stocks": ["NVDA", "AAPL"]}}, "energy": {{"stocks": ["XOM"]}}}}}}"#
        )
        .unwrap();
        let mut f = fs::File::create(&secondary).unwrap();
        write!(
            f,
            r#"{{"categories": {{"momentum_leaders": {{"stocks": ["AAPL", "SMCI"]}}}}}}"#
        )
        .unwrap();
        let mut f = fs::File::create(&blacklist).unwrap();
        write!(f, r#"{{"excluded_tickers": ["XOM"]}}"#).unwrap();

        let watchlist = FileWatchlist::load(&core, &secondary, &blacklist).unwrap();
        assert_eq!(watchlist.all_tickers(), strings(&["AAPL", "NVDA", "SMCI"]));
        assert!(watchlist.is_blacklisted("xom"));

        let stats = watchlist.stats();
        assert_eq!(stats.core_count, 2);
        assert_eq!(stats.total_count, 3);
    }

    #[test]
    fn test_missing_files_are_empty() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json");

        let watchlist = FileWatchlist::load(&missing, &missing, &missing).unwrap();
        assert!(watchlist.all_tickers().is_empty());
    }
}
