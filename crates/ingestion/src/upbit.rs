//! Upbit minute-candle client.
//!
//! The candle API returns at most 200 candles per call, newest first, and
//! takes its `to` bound in UTC. Larger requests are paged backwards.

use std::time::Duration;

use chrono::NaiveDateTime;
use replay_core::config::MarketConfig;
use replay_core::time::{parse_date_time, to_utc_query_string};
use replay_core::{Candle, Error, Result};
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::source::{validate_series, CandleSource};

/// Maximum candles per API call.
const MAX_PAGE: usize = 200;

/// Raw candle as returned by the API.
#[derive(Debug, Deserialize)]
struct UpbitCandle {
    market: String,
    candle_date_time_kst: String,
    opening_price: f64,
    high_price: f64,
    low_price: f64,
    trade_price: f64,
    candle_acc_trade_price: f64,
    candle_acc_trade_volume: f64,
}

impl UpbitCandle {
    fn into_candle(self) -> Result<Candle> {
        let date_time = parse_date_time(&self.candle_date_time_kst)
            .map_err(|e| Error::initialization(e.to_string()))?;
        Ok(Candle {
            symbol: self.market,
            date_time,
            open: self.opening_price,
            high: self.high_price,
            low: self.low_price,
            close: self.trade_price,
            acc_price: self.candle_acc_trade_price,
            acc_volume: self.candle_acc_trade_volume,
        })
    }
}

/// Parse a candle API body into ascending candles.
pub fn parse_candles(body: &str) -> Result<Vec<Candle>> {
    let raw: Vec<UpbitCandle> = serde_json::from_str(body)
        .map_err(|e| Error::initialization(format!("malformed candle data: {e}")))?;
    let mut candles = raw
        .into_iter()
        .map(UpbitCandle::into_candle)
        .collect::<Result<Vec<_>>>()?;
    candles.sort_by_key(|c| c.date_time);
    Ok(candles)
}

/// Blocking client for the minute-candle endpoint.
pub struct UpbitClient {
    client: reqwest::blocking::Client,
    url: String,
    market: String,
}

impl UpbitClient {
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::initialization(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.candle_url.clone(),
            market: config.symbol.clone(),
        })
    }

    fn fetch_page(&self, to: Option<NaiveDateTime>, count: usize) -> Result<Vec<Candle>> {
        let mut query = vec![
            ("market", self.market.clone()),
            ("count", count.to_string()),
        ];
        if let Some(to) = to {
            query.push(("to", to_utc_query_string(to)));
        }

        let resp = self
            .client
            .get(&self.url)
            .query(&query)
            .send()
            .map_err(|e| {
                error!(error = %e, "candle request failed");
                Error::initialization(format!("request failed: {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            error!(%status, market = %self.market, "candle request rejected");
            return Err(Error::initialization(format!("HTTP {status} for {}", self.market)));
        }

        let body = resp
            .text()
            .map_err(|e| Error::initialization(format!("failed to read body: {e}")))?;
        parse_candles(&body)
    }
}

impl CandleSource for UpbitClient {
    fn fetch(&self, end: Option<NaiveDateTime>, count: usize) -> Result<Vec<Candle>> {
        let mut candles: Vec<Candle> = Vec::with_capacity(count);
        // The first page includes `end` itself; later pages are bounded by the
        // oldest candle seen so far, which the API treats as exclusive.
        let mut to = end.map(|e| e + chrono::Duration::minutes(1));

        while candles.len() < count {
            let want = (count - candles.len()).min(MAX_PAGE);
            let page = self.fetch_page(to, want)?;
            debug!(received = page.len(), ?to, "candle page");
            if page.is_empty() {
                break;
            }
            to = page.first().map(|c| c.date_time);
            let short = page.len() < want;
            candles.splice(0..0, page);
            if short {
                break;
            }
        }

        validate_series(&candles)?;
        info!(
            market = %self.market,
            count = candles.len(),
            first = %candles[0].date_time,
            "candles loaded"
        );
        Ok(candles)
    }
}
