//! Configuration structures for the candle-replay system.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound for `analyzer.record_interval_secs` (one year).
pub const MAX_RECORD_INTERVAL_SECS: u64 = 366 * 24 * 60 * 60;

/// Main configuration for a simulation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Virtual market configuration.
    pub market: MarketConfig,
    /// Simulation period and budget.
    pub simulation: SimulationConfig,
    /// Analyzer configuration.
    pub analyzer: AnalyzerConfig,
    /// Ledger output configuration.
    pub output: OutputConfig,
}

impl Config {
    /// Parse a JSON document; missing sections fall back to defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let commission = self.market.commission_ratio;
        if !(0.0..1.0).contains(&commission) {
            return Err(Error::config(format!(
                "commission_ratio must be in [0, 1), got {commission}"
            )));
        }
        if self.simulation.count == 0 {
            return Err(Error::config("simulation.count must be positive"));
        }
        if !(self.simulation.budget >= 0.0) {
            return Err(Error::config(format!(
                "simulation.budget must be non-negative, got {}",
                self.simulation.budget
            )));
        }
        let interval = self.analyzer.record_interval_secs;
        if interval == 0 || interval > MAX_RECORD_INTERVAL_SECS {
            return Err(Error::config(format!(
                "analyzer.record_interval_secs must be in 1..={MAX_RECORD_INTERVAL_SECS}, got {interval}"
            )));
        }
        Ok(())
    }
}

/// Virtual market configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Market symbol requested from the candle API.
    pub symbol: String,
    /// Fractional fee applied to every fill's notional.
    pub commission_ratio: f64,
    /// Minute-candle endpoint.
    pub candle_url: String,
    /// HTTP timeout for the one-time candle load.
    pub request_timeout_secs: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: "KRW-BTC".to_string(),
            commission_ratio: 0.0005,
            candle_url: "https://api.upbit.com/v1/candles/minutes/1".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// Simulation period and budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Last candle time (KST, `YYYY-MM-DDTHH:MM:SS`); latest available if unset.
    pub end: Option<String>,
    /// Number of candles to replay.
    pub count: usize,
    /// Starting cash.
    pub budget: f64,
    /// Minimum order value the strategy may emit.
    pub min_price: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            end: None,
            count: 100,
            budget: 500_000.0,
            min_price: 5_000.0,
        }
    }
}

/// Analyzer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Seconds between periodic valuation snapshots.
    pub record_interval_secs: u64,
    /// Measure time on candle timestamps instead of the wall clock.
    pub replay_mode: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            record_interval_secs: 60,
            replay_mode: true,
        }
    }
}

/// Ledger storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Json,
    Sqlite,
}

impl std::str::FromStr for StoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(StoreKind::Json),
            "sqlite" => Ok(StoreKind::Sqlite),
            other => Err(Error::config(format!("unknown store kind '{other}'"))),
        }
    }
}

/// Ledger output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory that receives the ledger files.
    pub dir: String,
    /// Storage backend.
    pub store: StoreKind,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "output".to_string(),
            store: StoreKind::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.market.commission_ratio, 0.0005);
        assert_eq!(config.analyzer.record_interval_secs, 60);
        assert_eq!(config.simulation.budget, 500_000.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json_str(r#"{"simulation": {"count": 30}}"#).unwrap();
        assert_eq!(config.simulation.count, 30);
        assert_eq!(config.simulation.min_price, 5_000.0);
        assert_eq!(config.market.symbol, "KRW-BTC");
        assert_eq!(config.output.store, StoreKind::Json);
    }

    #[test]
    fn test_validate_rejects_bad_commission() {
        let err = Config::from_json_str(r#"{"market": {"commission_ratio": 1.5}}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate_rejects_out_of_range_interval() {
        let mut config = Config::default();
        config.analyzer.record_interval_secs = 10_000_000_000_000_000;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.analyzer.record_interval_secs = 0;
        assert!(config.validate().is_err());

        config.analyzer.record_interval_secs = MAX_RECORD_INTERVAL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_kind_from_str() {
        assert_eq!("SQLite".parse::<StoreKind>().unwrap(), StoreKind::Sqlite);
        assert!("csv".parse::<StoreKind>().is_err());
    }
}
