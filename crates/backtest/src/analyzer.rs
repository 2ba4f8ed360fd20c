//! Run ledger and periodic scoring.
//!
//! The analyzer appends ticks, requests, results and balance snapshots to
//! lists it owns exclusively. Snapshots come from a read-only balance query
//! installed with [`Analyzer::initialize`]; each one is turned into a
//! [`ScoreRecord`] against the first snapshot of the run.

use chrono::{Duration, NaiveDateTime};
use replay_core::config::AnalyzerConfig;
use replay_core::{
    BalanceSnapshot, Candle, Error, RecordKind, Request, RequestType, Result, ScoreRecord, Tagged,
    TradeResult,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::metrics::score;

/// Read-only balance query into the market.
pub type BalanceQuery = Box<dyn Fn() -> BalanceSnapshot>;

/// Every list the analyzer keeps, ready for serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecords {
    pub trading_info: Vec<Tagged<Candle>>,
    pub requests: Vec<Tagged<Request>>,
    pub results: Vec<Tagged<TradeResult>>,
    pub asset_info: Vec<BalanceSnapshot>,
    pub scores: Vec<Tagged<ScoreRecord>>,
}

/// Append-only record keeper for one run.
pub struct Analyzer {
    config: AnalyzerConfig,
    balance_query: Option<BalanceQuery>,
    trading_info_list: Vec<Tagged<Candle>>,
    request_list: Vec<Tagged<Request>>,
    result_list: Vec<Tagged<TradeResult>>,
    asset_info_list: Vec<BalanceSnapshot>,
    score_list: Vec<Tagged<ScoreRecord>>,
    last_record_time: Option<NaiveDateTime>,
}

impl Analyzer {
    /// Create an empty analyzer. Performs no I/O.
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            balance_query: None,
            trading_info_list: Vec::new(),
            request_list: Vec::new(),
            result_list: Vec::new(),
            asset_info_list: Vec::new(),
            score_list: Vec::new(),
            last_record_time: None,
        }
    }

    /// Install the balance query used for snapshots.
    pub fn initialize(&mut self, balance_query: BalanceQuery) {
        self.balance_query = Some(balance_query);
    }

    /// Record a tick, then take a snapshot if the record interval elapsed.
    pub fn save_trading_info(&mut self, candle: &Candle) {
        self.trading_info_list
            .push(Tagged::new(RecordKind::Tick, candle.clone()));
        self.make_periodic_record();
    }

    /// Record a request batch.
    ///
    /// Cancels are stored with zero price and amount. Other requests without
    /// a positive finite price and amount are dropped; the rest of the batch
    /// is still recorded.
    pub fn save_request_info(&mut self, requests: &[Request]) {
        for request in requests {
            let mut record = request.clone();
            if request.kind == RequestType::Cancel {
                record.price = 0.0;
                record.amount = 0.0;
            } else if !is_positive(request.price) || !is_positive(request.amount) {
                continue;
            }
            self.request_list
                .push(Tagged::new(RecordKind::Request, record));
        }
    }

    /// Record a fill result and refresh the valuation.
    pub fn save_result_info(&mut self, result: &TradeResult) {
        if let Err(e) = check_result(result) {
            warn!(id = %result.request.id, error = %e, "result dropped");
            return;
        }
        if !is_positive(result.price) || !is_positive(result.amount) {
            debug!(
                id = %result.request.id,
                price = result.price,
                amount = result.amount,
                "result without fill dropped"
            );
            return;
        }
        self.result_list
            .push(Tagged::new(RecordKind::Result, result.clone()));
        self.update_asset_info();
    }

    /// Take a balance snapshot and score it.
    pub fn update_asset_info(&mut self) {
        let Some(query) = &self.balance_query else {
            warn!("balance query is not set");
            return;
        };

        let mut snapshot = query();
        if self.config.replay_mode {
            if let Some(last) = self.trading_info_list.last() {
                snapshot.date_time = Some(last.record.date_time);
            }
        }
        self.asset_info_list.push(snapshot.clone());
        self.make_score_record(&snapshot);
    }

    /// Score `snapshot` against the first snapshot of the run.
    ///
    /// A failure is logged and leaves the score list unchanged.
    pub fn make_score_record(&mut self, snapshot: &BalanceSnapshot) {
        let Some(baseline) = self.asset_info_list.first() else {
            error!("no baseline snapshot, score not recorded");
            return;
        };

        match score(baseline, snapshot, self.asset_info_list.len() == 1) {
            Ok(record) => {
                debug!(
                    balance = record.balance,
                    cumulative_return = record.cumulative_return,
                    "score recorded"
                );
                self.score_list.push(Tagged::new(RecordKind::Score, record));
            }
            Err(e) => error!(error = %e, "failed to make score record"),
        }
    }

    fn make_periodic_record(&mut self) {
        let now = match (self.config.replay_mode, self.trading_info_list.last()) {
            (true, Some(last)) => last.record.date_time,
            _ => chrono::Local::now().naive_local(),
        };
        let Some(interval) = i64::try_from(self.config.record_interval_secs)
            .ok()
            .and_then(Duration::try_seconds)
        else {
            warn!(
                interval = self.config.record_interval_secs,
                "record interval out of range, periodic sampling skipped"
            );
            return;
        };

        let due = match self.last_record_time {
            None => true,
            Some(last) => now - last >= interval,
        };
        if due {
            self.update_asset_info();
            self.last_record_time = Some(now);
        }
    }

    /// Recorded ticks.
    pub fn trading_info(&self) -> &[Tagged<Candle>] {
        &self.trading_info_list
    }

    /// Recorded requests.
    pub fn requests(&self) -> &[Tagged<Request>] {
        &self.request_list
    }

    /// Recorded fill results.
    pub fn results(&self) -> &[Tagged<TradeResult>] {
        &self.result_list
    }

    /// Balance snapshots, baseline first.
    pub fn asset_info(&self) -> &[BalanceSnapshot] {
        &self.asset_info_list
    }

    /// Score records.
    pub fn scores(&self) -> &[Tagged<ScoreRecord>] {
        &self.score_list
    }

    /// Copy of every list as it stands now.
    pub fn records(&self) -> LedgerRecords {
        LedgerRecords {
            trading_info: self.trading_info_list.clone(),
            requests: self.request_list.clone(),
            results: self.result_list.clone(),
            asset_info: self.asset_info_list.clone(),
            scores: self.score_list.clone(),
        }
    }
}

/// Non-finite numerics make a result malformed; zero ones only mean no fill.
fn check_result(result: &TradeResult) -> Result<()> {
    if !result.price.is_finite() || !result.amount.is_finite() {
        return Err(Error::invalid_record(format!(
            "non-finite price {} or amount {}",
            result.price, result.amount
        )));
    }
    Ok(())
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use replay_core::time::parse_date_time;
    use replay_core::{AssetPosition, ResultState};
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    fn make_candle(date_time: &str, close: f64) -> Candle {
        Candle {
            symbol: "KRW-BTC".to_string(),
            date_time: parse_date_time(date_time).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            acc_price: 0.0,
            acc_volume: 0.0,
        }
    }

    fn make_snapshot(balance: f64, position: Option<(f64, f64)>, price: f64) -> BalanceSnapshot {
        let mut asset = BTreeMap::new();
        if let Some((avg_cost, quantity)) = position {
            asset.insert("KRW-BTC".to_string(), AssetPosition::new(avg_cost, quantity));
        }
        BalanceSnapshot {
            balance,
            asset,
            quote: Some(BTreeMap::from([("KRW-BTC".to_string(), price)])),
            date_time: Some(parse_date_time("2000-01-01T00:00:00").unwrap()),
        }
    }

    fn make_result(price: f64, amount: f64) -> TradeResult {
        let dt = parse_date_time("2022-11-18T12:15:00").unwrap();
        TradeResult {
            request: Request::new("1", RequestType::Buy, price, amount, dt),
            kind: RequestType::Buy,
            price,
            amount,
            state: ResultState::Done,
            msg: "success".to_string(),
            balance: 0.0,
            date_time: dt,
        }
    }

    /// Analyzer wired to a snapshot cell the test can swap.
    fn make_analyzer(initial: BalanceSnapshot) -> (Analyzer, Rc<RefCell<BalanceSnapshot>>) {
        make_analyzer_with(AnalyzerConfig::default(), initial)
    }

    fn make_analyzer_with(
        config: AnalyzerConfig,
        initial: BalanceSnapshot,
    ) -> (Analyzer, Rc<RefCell<BalanceSnapshot>>) {
        let cell = Rc::new(RefCell::new(initial));
        let query_cell = Rc::clone(&cell);
        let mut analyzer = Analyzer::new(config);
        analyzer.initialize(Box::new(move || query_cell.borrow().clone()));
        (analyzer, cell)
    }

    #[test]
    fn test_request_batch_keeps_valid_entries() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::default());
        let dt = parse_date_time("2022-11-18T12:15:00").unwrap();
        let requests = vec![
            Request::new("1", RequestType::Buy, 100.0, 0.0, dt),
            Request::new("2", RequestType::Cancel, 55.0, 3.0, dt),
            Request::new("3", RequestType::Sell, 100.0, 1.5, dt),
            Request::new("4", RequestType::Buy, -1.0, 1.0, dt),
        ];

        analyzer.save_request_info(&requests);

        let saved = analyzer.requests();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].record.id, "2");
        assert_eq!(saved[0].record.price, 0.0);
        assert_eq!(saved[0].record.amount, 0.0);
        assert_eq!(saved[1].record.id, "3");
        assert_eq!(saved[1].kind, RecordKind::Request);
    }

    #[test]
    fn test_invalid_result_is_dropped() {
        let (mut analyzer, _) = make_analyzer(make_snapshot(1000.0, None, 10.0));
        analyzer.save_result_info(&make_result(0.0, 1.0));
        analyzer.save_result_info(&make_result(10.0, f64::NAN));

        assert!(analyzer.results().is_empty());
        assert!(analyzer.asset_info().is_empty());
    }

    #[test]
    fn test_non_finite_result_is_invalid_record() {
        assert!(matches!(
            check_result(&make_result(f64::INFINITY, 1.0)),
            Err(Error::InvalidRecord(_))
        ));
        // A zero fill is well formed, only empty.
        assert!(check_result(&make_result(0.0, 0.0)).is_ok());
    }

    #[test]
    fn test_result_triggers_snapshot_and_score() {
        let (mut analyzer, _) = make_analyzer(make_snapshot(1000.0, None, 10.0));
        analyzer.save_result_info(&make_result(10.0, 1.0));

        assert_eq!(analyzer.results().len(), 1);
        assert_eq!(analyzer.asset_info().len(), 1);
        assert_eq!(analyzer.scores().len(), 1);
    }

    #[test]
    fn test_first_score_has_zero_return() {
        // Holding bought at 100, now quoted at 150.
        let (mut analyzer, _) = make_analyzer(make_snapshot(1000.0, Some((100.0, 2.0)), 150.0));
        analyzer.update_asset_info();

        let first = &analyzer.scores()[0].record;
        assert_eq!(first.cumulative_return, 0.0);
        assert_eq!(first.price_change_ratio["KRW-BTC"], 0.0);
        assert_relative_eq!(first.asset[0].item_yield, 50.0);
    }

    #[test]
    fn test_score_against_baseline() {
        let (mut analyzer, cell) = make_analyzer(make_snapshot(1000.0, Some((100.0, 2.0)), 100.0));
        analyzer.update_asset_info();

        *cell.borrow_mut() = make_snapshot(1000.0, Some((100.0, 2.0)), 110.0);
        analyzer.update_asset_info();

        let second = &analyzer.scores()[1].record;
        // baseline 1200, current 1220
        assert_relative_eq!(second.cumulative_return, 1.667);
        assert_relative_eq!(second.price_change_ratio["KRW-BTC"], 10.0);
        assert_relative_eq!(second.asset[0].item_yield, 10.0);
    }

    #[test]
    fn test_missing_quote_records_no_score() {
        let (mut analyzer, cell) = make_analyzer(make_snapshot(1000.0, None, 10.0));
        analyzer.update_asset_info();

        let mut broken = make_snapshot(1000.0, Some((10.0, 1.0)), 10.0);
        broken.quote = None;
        *cell.borrow_mut() = broken;
        analyzer.update_asset_info();

        assert_eq!(analyzer.asset_info().len(), 2);
        assert_eq!(analyzer.scores().len(), 1);
    }

    #[test]
    fn test_periodic_record_uses_tick_time() {
        let (mut analyzer, _) = make_analyzer(make_snapshot(1000.0, None, 10.0));

        analyzer.save_trading_info(&make_candle("2022-11-18T12:15:00", 10.0));
        analyzer.save_trading_info(&make_candle("2022-11-18T12:15:30", 10.0));
        analyzer.save_trading_info(&make_candle("2022-11-18T12:16:00", 10.0));

        assert_eq!(analyzer.trading_info().len(), 3);
        assert_eq!(analyzer.asset_info().len(), 2);
        assert_eq!(
            analyzer.asset_info()[1].date_time,
            Some(parse_date_time("2022-11-18T12:16:00").unwrap())
        );
    }

    #[test]
    fn test_wall_clock_mode_keeps_snapshot_time() {
        let config = AnalyzerConfig {
            replay_mode: false,
            ..Default::default()
        };
        let (mut analyzer, _) = make_analyzer_with(config, make_snapshot(1000.0, None, 10.0));

        // Tick times an hour apart do not count; only the wall clock does.
        analyzer.save_trading_info(&make_candle("2022-11-18T12:00:00", 10.0));
        analyzer.save_trading_info(&make_candle("2022-11-18T13:00:00", 10.0));

        assert_eq!(analyzer.trading_info().len(), 2);
        assert_eq!(analyzer.asset_info().len(), 1);
        assert_eq!(
            analyzer.asset_info()[0].date_time,
            Some(parse_date_time("2000-01-01T00:00:00").unwrap())
        );
    }

    #[test]
    fn test_oversized_interval_skips_sampling() {
        let config = AnalyzerConfig {
            record_interval_secs: 10_000_000_000_000_000,
            ..Default::default()
        };
        let (mut analyzer, _) = make_analyzer_with(config, make_snapshot(1000.0, None, 10.0));

        analyzer.save_trading_info(&make_candle("2022-11-18T12:15:00", 10.0));

        assert_eq!(analyzer.trading_info().len(), 1);
        assert!(analyzer.asset_info().is_empty());
    }

    #[test]
    fn test_unscored_baseline_still_anchors_returns() {
        // First snapshot holds a symbol it has no quote for, so it cannot be scored.
        let mut first = make_snapshot(1000.0, None, 100.0);
        first
            .asset
            .insert("KRW-ETH".to_string(), AssetPosition::new(10.0, 1.0));
        let (mut analyzer, cell) = make_analyzer(first);
        analyzer.update_asset_info();
        assert!(analyzer.scores().is_empty());

        *cell.borrow_mut() = make_snapshot(1000.0, Some((100.0, 2.0)), 110.0);
        analyzer.update_asset_info();

        // baseline 1010 at cost, current 1220
        let record = &analyzer.scores()[0].record;
        assert_relative_eq!(record.cumulative_return, 20.792);
        assert_relative_eq!(record.price_change_ratio["KRW-BTC"], 10.0);
    }

    #[test]
    fn test_update_without_query_is_noop() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::default());
        analyzer.save_trading_info(&make_candle("2022-11-18T12:15:00", 10.0));
        assert_eq!(analyzer.trading_info().len(), 1);
        assert!(analyzer.asset_info().is_empty());
    }

    #[test]
    fn test_records_serialize_with_kind_tags() {
        let (mut analyzer, _) = make_analyzer(make_snapshot(1000.0, None, 10.0));
        analyzer.save_trading_info(&make_candle("2022-11-18T12:15:00", 10.0));

        let records = analyzer.records();
        let json = serde_json::to_value(&records).unwrap();
        assert_eq!(json["trading_info"][0]["kind"], "tick");
        assert_eq!(json["scores"][0]["kind"], "score");
    }
}
