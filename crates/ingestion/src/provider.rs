//! Sequential tick delivery for replay runs.

use chrono::NaiveDateTime;
use replay_core::{Candle, Result};
use tracing::{debug, info};

use crate::source::CandleSource;

/// Loads a candle series once and hands it out one candle per call.
pub struct SimulationDataProvider {
    data: Vec<Candle>,
    index: usize,
    is_initialized: bool,
}

impl SimulationDataProvider {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            index: 0,
            is_initialized: false,
        }
    }

    /// Load `count` candles ending at `end` and rewind to the first one.
    pub fn initialize_simulation(
        &mut self,
        source: &dyn CandleSource,
        end: Option<NaiveDateTime>,
        count: usize,
    ) -> Result<()> {
        let data = source.fetch(end, count)?;
        info!(?end, count = data.len(), "data provider loaded");
        self.data = data;
        self.index = 0;
        self.is_initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// Next candle, or `None` once the series is exhausted.
    pub fn next_candle(&mut self) -> Option<Candle> {
        let candle = self.data.get(self.index)?.clone();
        self.index += 1;
        debug!(date_time = %candle.date_time, "tick");
        Some(candle)
    }

    /// Candles not delivered yet.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.index)
    }
}

impl Default for SimulationDataProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use replay_core::time::parse_date_time;

    fn make_candle(minute: u32) -> Candle {
        Candle {
            symbol: "KRW-BTC".to_string(),
            date_time: parse_date_time(&format!("2020-05-01T00:{minute:02}:00")).unwrap(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            acc_price: 0.0,
            acc_volume: 0.0,
        }
    }

    #[test]
    fn test_next_candle_in_order_then_none() {
        let source = StaticSource::new(vec![make_candle(0), make_candle(1)]);
        let mut provider = SimulationDataProvider::new();
        assert!(provider.next_candle().is_none());

        provider.initialize_simulation(&source, None, 10).unwrap();
        assert!(provider.is_initialized());
        assert_eq!(provider.remaining(), 2);
        assert_eq!(provider.next_candle().unwrap().date_time, make_candle(0).date_time);
        assert_eq!(provider.next_candle().unwrap().date_time, make_candle(1).date_time);
        assert!(provider.next_candle().is_none());
    }

    #[test]
    fn test_initialize_failure_keeps_provider_uninitialized() {
        let source = StaticSource::new(Vec::new());
        let mut provider = SimulationDataProvider::new();
        assert!(provider.initialize_simulation(&source, None, 10).is_err());
        assert!(!provider.is_initialized());
    }
}
