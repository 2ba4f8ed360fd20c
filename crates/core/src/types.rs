//! Core data types for the candle-replay system.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::time::{date_time_format, opt_date_time_format};

/// Round half away from zero to `decimals` places.
#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Accepts a JSON number or a numeric string for price/amount fields.
pub fn de_lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrStr {
        Num(f64),
        Str(String),
    }

    match NumOrStr::deserialize(deserializer)? {
        NumOrStr::Num(v) => Ok(v),
        NumOrStr::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid number '{s}': {e}"))),
    }
}

/// One OHLCV bar for a fixed time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Market symbol, e.g. `KRW-BTC`.
    #[serde(rename = "market")]
    pub symbol: String,
    /// Bucket start in exchange-local time.
    #[serde(with = "date_time_format")]
    pub date_time: NaiveDateTime,
    #[serde(rename = "opening_price")]
    pub open: f64,
    #[serde(rename = "high_price")]
    pub high: f64,
    #[serde(rename = "low_price")]
    pub low: f64,
    /// Close, i.e. the last trade price of the bucket.
    #[serde(rename = "closing_price")]
    pub close: f64,
    /// Accumulated traded value in the bucket.
    pub acc_price: f64,
    /// Accumulated traded volume in the bucket.
    pub acc_volume: f64,
}

/// Request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Buy,
    Sell,
    Cancel,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Buy => "buy",
            RequestType::Sell => "sell",
            RequestType::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trading request produced by a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Unique request token.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RequestType,
    #[serde(deserialize_with = "de_lenient_f64")]
    pub price: f64,
    #[serde(deserialize_with = "de_lenient_f64")]
    pub amount: f64,
    /// Creation time; data time in replay mode.
    #[serde(with = "date_time_format")]
    pub date_time: NaiveDateTime,
}

impl Request {
    pub fn new(
        id: impl Into<String>,
        kind: RequestType,
        price: f64,
        amount: f64,
        date_time: NaiveDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            price,
            amount,
            date_time,
        }
    }

    /// Cancel requests carry price = amount = 0.
    pub fn cancel(id: impl Into<String>, date_time: NaiveDateTime) -> Self {
        Self::new(id, RequestType::Cancel, 0.0, 0.0, date_time)
    }

    /// A buy with zero price and amount; the market passes the turn.
    pub fn skip(id: impl Into<String>, date_time: NaiveDateTime) -> Self {
        Self::new(id, RequestType::Buy, 0.0, 0.0, date_time)
    }

    /// Whether the market should treat this as an intentional skip.
    #[inline]
    pub fn is_skip(&self) -> bool {
        self.price == 0.0 || self.amount == 0.0
    }

    /// Notional value (price × amount).
    #[inline]
    pub fn notional(&self) -> f64 {
        self.price * self.amount
    }
}

/// Result lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultState {
    /// Accepted but not filled yet.
    Requested,
    /// Completed.
    Done,
}

/// Outcome record for a handled request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    /// Originating request.
    pub request: Request,
    /// Realized type.
    #[serde(rename = "type")]
    pub kind: RequestType,
    /// Realized price.
    #[serde(deserialize_with = "de_lenient_f64")]
    pub price: f64,
    /// Realized amount (may be clamped on sells).
    #[serde(deserialize_with = "de_lenient_f64")]
    pub amount: f64,
    pub state: ResultState,
    pub msg: String,
    /// Cash balance after the request.
    pub balance: f64,
    #[serde(with = "date_time_format")]
    pub date_time: NaiveDateTime,
}

/// Held position in one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetPosition {
    /// Quantity-weighted average purchase price.
    pub avg_cost: f64,
    /// Held quantity, never negative.
    pub quantity: f64,
}

impl AssetPosition {
    pub fn new(avg_cost: f64, quantity: f64) -> Self {
        Self { avg_cost, quantity }
    }

    /// Cost basis (avg_cost × quantity).
    #[inline]
    pub fn cost_basis(&self) -> f64 {
        self.avg_cost * self.quantity
    }
}

/// Cash, holdings and current quotes at one point in the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub balance: f64,
    /// Holdings keyed by symbol.
    pub asset: BTreeMap<String, AssetPosition>,
    /// Current price per symbol; `None` when no quote could be produced.
    pub quote: Option<BTreeMap<String, f64>>,
    #[serde(with = "opt_date_time_format")]
    pub date_time: Option<NaiveDateTime>,
}

impl BalanceSnapshot {
    /// Cash plus holdings valued at the current quotes.
    ///
    /// Returns `None` if any held symbol has no quote.
    pub fn marked_total(&self) -> Option<f64> {
        let quote = self.quote.as_ref()?;
        let mut total = self.balance;
        for (symbol, position) in &self.asset {
            total += quote.get(symbol)? * position.quantity;
        }
        Some(total)
    }

    /// Cash plus holdings valued at cost.
    pub fn cost_total(&self) -> f64 {
        self.balance + self.asset.values().map(AssetPosition::cost_basis).sum::<f64>()
    }
}

/// Per-symbol line of a score record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetYield {
    pub symbol: String,
    pub avg_cost: f64,
    pub price: f64,
    pub quantity: f64,
    /// (price − avg_cost) / avg_cost × 100, 3 decimals.
    pub item_yield: f64,
}

/// Performance snapshot derived from a balance snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub balance: f64,
    /// Return versus the baseline snapshot, percent.
    pub cumulative_return: f64,
    /// Price change versus the baseline quote, percent, per symbol.
    pub price_change_ratio: BTreeMap<String, f64>,
    pub asset: Vec<AssetYield>,
    #[serde(with = "opt_date_time_format")]
    pub date_time: Option<NaiveDateTime>,
}

/// Kind tag attached to ledger records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Tick,
    Request,
    Result,
    Score,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Tick => "tick",
            RecordKind::Request => "request",
            RecordKind::Result => "result",
            RecordKind::Score => "score",
        }
    }
}

/// A ledger entry: the record plus its kind tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tagged<T> {
    pub kind: RecordKind,
    #[serde(flatten)]
    pub record: T,
}

impl<T> Tagged<T> {
    pub fn new(kind: RecordKind, record: T) -> Self {
        Self { kind, record }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_date_time;
    use approx::assert_relative_eq;

    #[test]
    fn test_round_to() {
        assert_relative_eq!(round_to(0.1234567, 6), 0.123457);
        assert_relative_eq!(round_to(-12.34567, 3), -12.346);
        assert_relative_eq!(round_to(98996.77365, 0), 98997.0);
    }

    #[test]
    fn test_request_accepts_string_numbers() {
        let json = r#"{"id":"1","type":"buy","price":"23011000","amount":"0.0043","date_time":"2022-11-18T12:15:00"}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(req.kind, RequestType::Buy);
        assert_relative_eq!(req.price, 23011000.0);
        assert_relative_eq!(req.amount, 0.0043);
    }

    #[test]
    fn test_request_rejects_non_numeric_string() {
        let json = r#"{"id":"1","type":"sell","price":"abc","amount":1,"date_time":"2022-11-18T12:15:00"}"#;
        assert!(serde_json::from_str::<Request>(json).is_err());
    }

    #[test]
    fn test_candle_uses_exchange_field_names() {
        let candle = Candle {
            symbol: "KRW-BTC".to_string(),
            date_time: parse_date_time("2020-05-01T00:40:00").unwrap(),
            open: 10662000.0,
            high: 10676000.0,
            low: 10662000.0,
            close: 10675000.0,
            acc_price: 3411043.24676,
            acc_volume: 0.31962699,
        };
        let value = serde_json::to_value(&candle).unwrap();
        assert_eq!(value["market"], "KRW-BTC");
        assert_eq!(value["date_time"], "2020-05-01T00:40:00");
        assert_eq!(value["closing_price"], 10675000.0);
    }

    #[test]
    fn test_snapshot_totals() {
        let mut asset = BTreeMap::new();
        asset.insert("KRW-BTC".to_string(), AssetPosition::new(100.0, 2.0));
        let mut quote = BTreeMap::new();
        quote.insert("KRW-BTC".to_string(), 150.0);
        let snapshot = BalanceSnapshot {
            balance: 1000.0,
            asset,
            quote: Some(quote),
            date_time: None,
        };
        assert_relative_eq!(snapshot.cost_total(), 1200.0);
        assert_relative_eq!(snapshot.marked_total().unwrap(), 1300.0);
    }

    #[test]
    fn test_marked_total_needs_quote_for_every_holding() {
        let mut asset = BTreeMap::new();
        asset.insert("KRW-ETH".to_string(), AssetPosition::new(10.0, 1.0));
        let snapshot = BalanceSnapshot {
            balance: 0.0,
            asset,
            quote: Some(BTreeMap::new()),
            date_time: None,
        };
        assert!(snapshot.marked_total().is_none());
    }

    #[test]
    fn test_tagged_record_flattens() {
        let req = Request::cancel("42", parse_date_time("2022-11-18T12:15:00").unwrap());
        let value = serde_json::to_value(Tagged::new(RecordKind::Request, req)).unwrap();
        assert_eq!(value["kind"], "request");
        assert_eq!(value["type"], "cancel");
        assert_eq!(value["price"], 0.0);
    }
}
