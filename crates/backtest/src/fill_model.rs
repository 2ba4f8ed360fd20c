//! Fill model for the virtual market.
//!
//! Fills are validated against the high/low band of the turn after the
//! decision and charged a fractional commission. Fees are rounded once,
//! after the commission is applied to the notional, on both sides.

use replay_core::{round_to, Candle};

/// Configuration for the fill model.
#[derive(Debug, Clone)]
pub struct FillModelConfig {
    /// Fractional fee applied to the notional of every fill.
    pub commission_ratio: f64,
}

impl Default for FillModelConfig {
    fn default() -> Self {
        Self {
            commission_ratio: 0.0005,
        }
    }
}

/// Fill model for simulating order execution.
#[derive(Debug, Clone)]
pub struct FillModel {
    config: FillModelConfig,
}

impl FillModel {
    /// Create a new fill model.
    pub fn new(config: FillModelConfig) -> Self {
        Self { config }
    }

    /// Cash needed for a buy: round(price × amount × (1 + commission)).
    pub fn buy_cost(&self, price: f64, amount: f64) -> f64 {
        round_to(price * amount * (1.0 + self.config.commission_ratio), 0)
    }

    /// Cash credited for a sell: round(price × amount × (1 − commission)).
    pub fn sell_proceeds(&self, price: f64, amount: f64) -> f64 {
        round_to(price * amount * (1.0 - self.config.commission_ratio), 0)
    }

    /// Commission on a notional, unrounded.
    pub fn commission(&self, notional: f64) -> f64 {
        notional * self.config.commission_ratio
    }

    /// A buy fills unless its price is below the band's low.
    #[inline]
    pub fn buy_matches(&self, price: f64, band: &Candle) -> bool {
        price >= band.low
    }

    /// A sell fills only when its price is below the band's high.
    #[inline]
    pub fn sell_matches(&self, price: f64, band: &Candle) -> bool {
        price < band.high
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use replay_core::time::parse_date_time;

    fn make_band(low: f64, high: f64) -> Candle {
        Candle {
            symbol: "KRW-BTC".to_string(),
            date_time: parse_date_time("2022-11-18T12:16:00").unwrap(),
            open: low,
            high,
            low,
            close: high,
            acc_price: 0.0,
            acc_volume: 0.0,
        }
    }

    #[test]
    fn test_buy_cost_rounds_once() {
        let model = FillModel::new(FillModelConfig::default());
        // 23011000 × 0.0043 = 98947.3; × 1.0005 = 98996.77365
        assert_relative_eq!(model.buy_cost(23011000.0, 0.0043), 98997.0);
    }

    #[test]
    fn test_sell_proceeds() {
        let model = FillModel::new(FillModelConfig::default());
        // 10000 × 2 × 0.9995 = 19990
        assert_relative_eq!(model.sell_proceeds(10000.0, 2.0), 19990.0);
    }

    #[test]
    fn test_zero_commission() {
        let model = FillModel::new(FillModelConfig {
            commission_ratio: 0.0,
        });
        assert_relative_eq!(model.buy_cost(100.0, 1.5), 150.0);
        assert_relative_eq!(model.commission(150.0), 0.0);
    }

    #[test]
    fn test_band_checks() {
        let model = FillModel::new(FillModelConfig::default());
        let band = make_band(100.0, 110.0);

        assert!(model.buy_matches(100.0, &band));
        assert!(!model.buy_matches(99.9, &band));

        assert!(model.sell_matches(109.9, &band));
        assert!(!model.sell_matches(110.0, &band));
    }
}
