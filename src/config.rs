//! Bot configuration
//!
//! Every section has serde defaults, so an empty source yields the stock
//! configuration. Values layer as: defaults, then the optional config file, then
//! `MOMENTUMBOT__<SECTION>__<KEY>` environment variables.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::breakout::BreakoutConfig;
use crate::execution::LifecycleConfig;
use crate::filters::time::SessionConfig;
use crate::filters::FilterConfig;
use crate::risk::RiskConfig;

const ENV_PREFIX: &str = "MOMENTUMBOT";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    #[serde(flatten)]
    pub risk: RiskConfig,
    pub dry_run: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            risk: RiskConfig::default(),
            dry_run: true, // Only the simulated executor ships
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub cycle_interval_secs: u64,
    pub top_signals_shown: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 300, // 5 minutes
            top_signals_shown: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub queue_capacity: usize,
    pub cooldown_secs: i64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            cooldown_secs: 300, // Same ticker and kind at most every 5 minutes
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub ledger: PathBuf,
    pub watchlist: PathBuf,
    pub secondary_watchlist: PathBuf,
    pub blacklist: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            ledger: PathBuf::from("data/risk_state.json"),
            watchlist: PathBuf::from("data/watchlist.json"),
            secondary_watchlist: PathBuf::from("data/secondary_watchlist.json"),
            blacklist: PathBuf::from("data/blacklist.json"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub trading: TradingConfig,
    pub session: SessionConfig,
    pub filters: FilterConfig,
    pub breakout: BreakoutConfig,
    pub lifecycle: LifecycleConfig,
    #[serde(rename = "loop")]
    pub run_loop: LoopConfig,
    pub notify: NotifyConfig,
    pub paths: PathsConfig,
}

impl BotConfig {
    /// Load from an optional file (TOML, JSON, YAML by extension) plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                bail!("config file {} not found", path.display());
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: BotConfig = builder
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let risk = &self.trading.risk;

        if risk.capital <= 0.0 {
            bail!("trading.capital must be positive (got {})", risk.capital);
        }
        if risk.max_positions == 0 {
            bail!("trading.max_positions must be at least 1");
        }
        if !(0.0..=1.0).contains(&risk.position_size_pct) || risk.position_size_pct == 0.0 {
            bail!(
                "trading.position_size_pct must be in (0, 1] (got {})",
                risk.position_size_pct
            );
        }
        if !(0.0..1.0).contains(&risk.stop_loss_pct) {
            bail!("trading.stop_loss_pct must be in [0, 1) (got {})", risk.stop_loss_pct);
        }
        if self.session.open >= self.session.close {
            bail!("session.open must be before session.close");
        }
        if self.run_loop.cycle_interval_secs == 0 {
            bail!("loop.cycle_interval_secs must be positive");
        }

        Ok(())
    }
}
