//! Candle-series sources.
//!
//! A source returns `count` ascending candles ending at `end`. Every failure
//! is reported as a single [`Error::Initialization`] so the market can fail
//! its one-time load atomically.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use replay_core::{Candle, Error, Result};
use tracing::debug;

use crate::upbit::parse_candles;

/// Provider of historical candles.
pub trait CandleSource {
    /// Fetch up to `count` ascending candles ending at `end` (latest if `None`).
    fn fetch(&self, end: Option<NaiveDateTime>, count: usize) -> Result<Vec<Candle>>;
}

impl<S: CandleSource + ?Sized> CandleSource for Box<S> {
    fn fetch(&self, end: Option<NaiveDateTime>, count: usize) -> Result<Vec<Candle>> {
        (**self).fetch(end, count)
    }
}

/// Check that a series is usable for replay.
///
/// Rejects empty series, non-finite prices, inverted bands and timestamps
/// that are not strictly ascending.
pub fn validate_series(candles: &[Candle]) -> Result<()> {
    if candles.is_empty() {
        return Err(Error::initialization("candle series is empty"));
    }
    for (i, candle) in candles.iter().enumerate() {
        let prices = [candle.open, candle.high, candle.low, candle.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(Error::initialization(format!(
                "non-finite price in candle {i} at {}",
                candle.date_time
            )));
        }
        if candle.low > candle.high {
            return Err(Error::initialization(format!(
                "low {} above high {} in candle {i}",
                candle.low, candle.high
            )));
        }
        if i > 0 && candles[i - 1].date_time >= candle.date_time {
            return Err(Error::initialization(format!(
                "candles not ascending at index {i} ({} >= {})",
                candles[i - 1].date_time, candle.date_time
            )));
        }
    }
    Ok(())
}

/// Keep the last `count` candles at or before `end`.
fn window(candles: &[Candle], end: Option<NaiveDateTime>, count: usize) -> Vec<Candle> {
    let upto = match end {
        Some(end) => candles.partition_point(|c| c.date_time <= end),
        None => candles.len(),
    };
    let start = upto.saturating_sub(count);
    candles[start..upto].to_vec()
}

/// In-memory series.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    candles: Vec<Candle>,
}

impl StaticSource {
    /// Create from ascending candles.
    pub fn new(candles: Vec<Candle>) -> Self {
        Self { candles }
    }
}

impl CandleSource for StaticSource {
    fn fetch(&self, end: Option<NaiveDateTime>, count: usize) -> Result<Vec<Candle>> {
        let candles = window(&self.candles, end, count);
        validate_series(&candles)?;
        Ok(candles)
    }
}

/// Offline replay from a saved candle API response.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CandleSource for JsonFileSource {
    fn fetch(&self, end: Option<NaiveDateTime>, count: usize) -> Result<Vec<Candle>> {
        let body = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::initialization(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let all = parse_candles(&body)?;
        let candles = window(&all, end, count);
        validate_series(&candles)?;
        debug!(
            path = %self.path.display(),
            loaded = candles.len(),
            "candles loaded from file"
        );
        Ok(candles)
    }
}
