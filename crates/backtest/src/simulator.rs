//! Replay simulator.
//!
//! Drives one run: each tick goes to the analyzer and the strategy, the
//! strategy's requests go to the market, and fill results flow back to both.
//! The analyzer reads the market only through its balance query.

use std::cell::RefCell;
use std::rc::Rc;

use replay_core::time::parse_date_time;
use replay_core::{Config, Error, Request, Result};
use replay_ingestion::{CandleSource, SimulationDataProvider, StaticSource};
use replay_strategy::Strategy;
use tracing::{debug, info};

use crate::analyzer::{Analyzer, LedgerRecords};
use crate::fill_model::FillModelConfig;
use crate::market::{MarketOutcome, VirtualMarket};
use crate::metrics::{RunSummary, SummaryCalculator};

/// One replay run over a candle series.
pub struct Simulator {
    config: Config,
    market: Rc<RefCell<VirtualMarket>>,
    provider: SimulationDataProvider,
    strategy: Box<dyn Strategy>,
    analyzer: Analyzer,
    skip_seq: u64,
}

impl Simulator {
    pub fn new(config: &Config, source: Box<dyn CandleSource>, strategy: Box<dyn Strategy>) -> Self {
        let fill_model = FillModelConfig {
            commission_ratio: config.market.commission_ratio,
        };
        Self {
            config: config.clone(),
            market: Rc::new(RefCell::new(VirtualMarket::new(source, fill_model))),
            provider: SimulationDataProvider::new(),
            strategy,
            analyzer: Analyzer::new(config.analyzer.clone()),
            skip_seq: 0,
        }
    }

    /// Load the series into the market and wire every component.
    pub fn initialize(&mut self) -> Result<()> {
        let sim = &self.config.simulation;
        let end = sim.end.as_deref().map(parse_date_time).transpose()?;

        self.market
            .borrow_mut()
            .initialize(end, sim.count, sim.budget)?;

        // The provider replays exactly the series the market matches against.
        let candles = self.market.borrow().candles().to_vec();
        let count = candles.len();
        self.provider
            .initialize_simulation(&StaticSource::new(candles), None, count)?;

        self.strategy.initialize(sim.budget, sim.min_price);

        let market = Rc::clone(&self.market);
        self.analyzer
            .initialize(Box::new(move || market.borrow().get_balance()));

        info!(
            strategy = self.strategy.name(),
            symbol = %self.config.market.symbol,
            count,
            budget = sim.budget,
            "simulation initialized"
        );
        Ok(())
    }

    /// Replay until the session ends or the ticks run out.
    pub fn run(&mut self) -> Result<RunSummary> {
        if !self.provider.is_initialized() {
            self.initialize()?;
        }

        while let Some(candle) = self.provider.next_candle() {
            self.analyzer.save_trading_info(&candle);
            self.strategy.update_trading_info(&candle);

            let mut requests = self.strategy.get_request().unwrap_or_default();
            if requests.is_empty() {
                self.skip_seq += 1;
                requests.push(Request::skip(
                    format!("skip.{}", self.skip_seq),
                    candle.date_time,
                ));
            }
            self.analyzer.save_request_info(&requests);

            if self.handle_requests(&requests)? {
                break;
            }
        }

        self.analyzer.update_asset_info();
        let summary = self.summary();
        info!(
            final_balance = summary.final_balance,
            final_total = summary.final_total,
            cumulative_return = summary.cumulative_return,
            buy_fills = summary.buy_fills,
            sell_fills = summary.sell_fills,
            "simulation finished"
        );
        Ok(summary)
    }

    /// Send a batch to the market in order. Returns true once the session ended.
    fn handle_requests(&mut self, requests: &[Request]) -> Result<bool> {
        for request in requests {
            let outcome = self.market.borrow_mut().handle_request(request);
            match outcome {
                MarketOutcome::Filled(result) => {
                    self.strategy.update_result(&result);
                    self.analyzer.save_result_info(&result);
                }
                MarketOutcome::SessionEnded(result) => {
                    self.strategy.update_result(&result);
                    self.analyzer.save_result_info(&result);
                    info!(turn = self.market.borrow().turn(), "session ended");
                    return Ok(true);
                }
                MarketOutcome::Rejected(reason) => {
                    debug!(id = %request.id, %reason, "request not filled");
                }
                MarketOutcome::Skipped | MarketOutcome::Cancelled { .. } => {}
                MarketOutcome::NotInitialized => {
                    return Err(Error::not_initialized("virtual market is not initialized"));
                }
            }
        }
        Ok(false)
    }

    /// Summary of the ledger as it stands.
    pub fn summary(&self) -> RunSummary {
        SummaryCalculator::new(self.config.simulation.budget).calculate(&self.analyzer.records())
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn records(&self) -> LedgerRecords {
        self.analyzer.records()
    }

    /// Market cash balance.
    pub fn balance(&self) -> f64 {
        self.market.borrow().balance()
    }
}
