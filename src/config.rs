use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fs,
    path::Path,
    time::Duration,
};
use thiserror::Error;

/// Geometry of the shared grid. Tier bands are data, not code: the three
/// thresholds are the outer edge (inclusive, in Manhattan distance from the
/// center) of the legendary, epic and rare bands; everything beyond is
/// common.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub side: u16,
    pub tier_thresholds: [u64; 3],
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            side: 50,
            tier_thresholds: [6, 12, 20],
        }
    }
}

impl GridConfig {
    pub fn center(&self) -> (u16, u16) {
        (self.side / 2, self.side / 2)
    }

    pub fn total_pixels(&self) -> u64 {
        u64::from(self.side) * u64::from(self.side)
    }

    pub fn contains(&self, x: u16, y: u16) -> bool {
        x < self.side && y < self.side
    }
}

/// Prices and flat fees. `tier_prices` is indexed by `Tier::index()`,
/// nearest band first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomyConfig {
    pub tier_prices: [u64; 4],
    pub transfer_fee: u64,
    pub melt_fee: u64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            tier_prices: [100_000, 25_000, 5_000, 1_000],
            transfer_fee: 500,
            melt_fee: 250,
        }
    }
}

/// Knobs for the poll/push reconciliation loop. Stored as milliseconds so a
/// config file stays plain numbers; accessors hand out `Duration`s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub poll_interval_ms: u64,
    pub stale_window_ms: u64,
    pub coalesce_window_ms: u64,
    pub submit_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub grace_period_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            stale_window_ms: 2_000,
            coalesce_window_ms: 150,
            submit_timeout_ms: 5_000,
            retry_backoff_ms: 500,
            max_backoff_ms: 30_000,
            grace_period_ms: 30_000,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_millis(self.stale_window_ms)
    }

    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grid: GridConfig,
    pub economy: EconomyConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let config = Config::default();
        assert_eq!(config.grid.side, 50);
        assert_eq!(config.grid.total_pixels(), 2_500);
        assert_eq!(config.grid.center(), (25, 25));
        assert_eq!(config.economy.tier_prices[0], 100_000);
        assert_eq!(config.sync.poll_interval(), Duration::from_secs(5));
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let parsed: Config =
            serde_json::from_str(r#"{ "grid": { "side": 10 } }"#).unwrap();
        assert_eq!(parsed.grid.side, 10);
        assert_eq!(parsed.grid.tier_thresholds, [6, 12, 20]);
        assert_eq!(parsed.economy, EconomyConfig::default());
    }
}
