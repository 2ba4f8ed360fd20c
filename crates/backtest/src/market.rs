//! Turn-based virtual market.
//!
//! Replays a candle series one turn per handled request. A request decided
//! on turn T is matched against the band of turn T+1, which the policy could
//! not see when it decided. The market owns the cash balance and positions;
//! only [`VirtualMarket::handle_request`] mutates them.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use replay_core::{
    BalanceSnapshot, Candle, Error, Request, RequestType, Result, ResultState, TradeResult,
};
use replay_ingestion::CandleSource;
use tracing::{debug, error, info, warn};

use crate::fill_model::{FillModel, FillModelConfig};
use crate::position::{PositionBook, QUANTITY_DECIMALS};

/// Message on a successful fill.
pub const MSG_SUCCESS: &str = "success";
/// Message on the terminal result.
pub const MSG_SESSION_ENDED: &str = "session ended";

/// Why a request was not filled. Rejections are normal outcomes.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// Cost plus commission exceeds the cash balance.
    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance { required: f64, available: f64 },

    /// Buy priced under the next candle's low.
    #[error("buy price {price} below next low {low}")]
    BelowLow { price: f64, low: f64 },

    /// Sell priced at or over the next candle's high.
    #[error("sell price {price} at or above next high {high}")]
    AboveHigh { price: f64, high: f64 },

    /// Sell for a symbol not held.
    #[error("no position in {symbol}")]
    NoPosition { symbol: String },

    /// Malformed request fields or an amount that rounds to zero.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Outcome of [`VirtualMarket::handle_request`].
#[derive(Debug, Clone, PartialEq)]
pub enum MarketOutcome {
    /// Buy or sell executed.
    Filled(TradeResult),
    /// Not executed; balance and positions unchanged.
    Rejected(RejectReason),
    /// Zero price or amount; the turn passes with no effect.
    Skipped,
    /// Cancel acknowledged; pending-order state belongs to the policy.
    Cancelled { request_id: String },
    /// Series exhausted; every later request gets the same answer.
    SessionEnded(TradeResult),
    /// `initialize` has not succeeded yet.
    NotInitialized,
}

impl MarketOutcome {
    /// The result record, for filled and terminal outcomes.
    pub fn result(&self) -> Option<&TradeResult> {
        match self {
            MarketOutcome::Filled(result) | MarketOutcome::SessionEnded(result) => Some(result),
            _ => None,
        }
    }

    /// Whether the session has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MarketOutcome::SessionEnded(_))
    }
}

/// Virtual market replaying historical candles.
pub struct VirtualMarket {
    source: Box<dyn CandleSource>,
    fill_model: FillModel,
    data: Vec<Candle>,
    turn: usize,
    balance: f64,
    positions: PositionBook,
    is_initialized: bool,
}

impl VirtualMarket {
    /// Create an uninitialized market over `source`.
    pub fn new(source: Box<dyn CandleSource>, fill_model: FillModelConfig) -> Self {
        Self {
            source,
            fill_model: FillModel::new(fill_model),
            data: Vec::new(),
            turn: 0,
            balance: 0.0,
            positions: PositionBook::new(),
            is_initialized: false,
        }
    }

    /// Load `count` candles ending at `end` and set the starting balance.
    ///
    /// A second call is a no-op. On failure nothing is retained.
    pub fn initialize(
        &mut self,
        end: Option<NaiveDateTime>,
        count: usize,
        budget: f64,
    ) -> Result<()> {
        if self.is_initialized {
            debug!("virtual market already initialized");
            return Ok(());
        }

        let data = self.source.fetch(end, count).map_err(|e| {
            error!(error = %e, "failed to load candles");
            e
        })?;
        if data.is_empty() {
            return Err(Error::initialization("candle source returned no data"));
        }

        self.data = data;
        self.turn = 0;
        self.balance = budget;
        self.is_initialized = true;
        info!(?end, count = self.data.len(), budget, "virtual market initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// Current turn index.
    pub fn turn(&self) -> usize {
        self.turn
    }

    /// Current cash balance.
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// The loaded candle series.
    pub fn candles(&self) -> &[Candle] {
        &self.data
    }

    /// Cash, holdings and the current turn's quote. Never mutates state.
    pub fn get_balance(&self) -> BalanceSnapshot {
        let current = self.data.get(self.turn);
        if current.is_none() {
            warn!(turn = self.turn, "no candle for current turn, quote unavailable");
        }
        for (symbol, position) in self.positions.snapshot() {
            debug!(
                %symbol,
                avg_cost = position.avg_cost,
                quantity = position.quantity,
                "asset item"
            );
        }

        BalanceSnapshot {
            balance: self.balance,
            asset: self.positions.snapshot(),
            quote: current.map(|c| BTreeMap::from([(c.symbol.clone(), c.close)])),
            date_time: current.map(|c| c.date_time),
        }
    }

    /// Handle one request and advance one turn.
    pub fn handle_request(&mut self, request: &Request) -> MarketOutcome {
        if !self.is_initialized {
            error!("virtual market is not initialized");
            return MarketOutcome::NotInitialized;
        }

        let now = self.data[self.turn].date_time;
        let last = self.data.len() - 1;
        if self.turn < last {
            self.turn += 1;
        }
        let next_index = self.turn;

        if next_index >= last {
            return MarketOutcome::SessionEnded(TradeResult {
                request: request.clone(),
                kind: request.kind,
                price: 0.0,
                amount: 0.0,
                state: ResultState::Done,
                msg: MSG_SESSION_ENDED.to_string(),
                balance: self.balance,
                date_time: now,
            });
        }

        if let Err(reason) = validate_request(request) {
            warn!(id = %request.id, %reason, "invalid request");
            return MarketOutcome::Rejected(reason);
        }

        // Cancels carry zero price/amount, so they are matched before the skip rule.
        let outcome = match request.kind {
            RequestType::Cancel => {
                debug!(id = %request.id, "cancel request acknowledged");
                return MarketOutcome::Cancelled {
                    request_id: request.id.clone(),
                };
            }
            _ if request.is_skip() => {
                debug!(id = %request.id, "turn over");
                return MarketOutcome::Skipped;
            }
            RequestType::Buy => self.handle_buy(request, next_index, now),
            RequestType::Sell => self.handle_sell(request, next_index, now),
        };

        outcome.unwrap_or_else(|reason| {
            info!(id = %request.id, %reason, "request rejected");
            MarketOutcome::Rejected(reason)
        })
    }

    fn handle_buy(
        &mut self,
        request: &Request,
        next_index: usize,
        now: NaiveDateTime,
    ) -> std::result::Result<MarketOutcome, RejectReason> {
        let band = &self.data[next_index];
        let total_cost = self.fill_model.buy_cost(request.price, request.amount);
        let old_balance = self.balance;

        if total_cost > self.balance {
            return Err(RejectReason::InsufficientBalance {
                required: total_cost,
                available: self.balance,
            });
        }
        if !self.fill_model.buy_matches(request.price, band) {
            return Err(RejectReason::BelowLow {
                price: request.price,
                low: band.low,
            });
        }

        let symbol = band.symbol.clone();
        self.positions
            .apply_buy(&symbol, request.price, request.amount)
            .ok_or_else(|| {
                RejectReason::InvalidRequest(format!(
                    "amount {} rounds to zero at {QUANTITY_DECIMALS} decimals",
                    request.amount
                ))
            })?;
        self.balance -= total_cost;
        self.log_balance(RequestType::Buy, old_balance, request.notional());

        Ok(MarketOutcome::Filled(self.fill_result(request, request.amount, now)))
    }

    fn handle_sell(
        &mut self,
        request: &Request,
        next_index: usize,
        now: NaiveDateTime,
    ) -> std::result::Result<MarketOutcome, RejectReason> {
        let band = &self.data[next_index];
        let symbol = band.symbol.clone();
        let old_balance = self.balance;

        if !self.positions.contains(&symbol) {
            return Err(RejectReason::NoPosition { symbol });
        }
        if !self.fill_model.sell_matches(request.price, band) {
            return Err(RejectReason::AboveHigh {
                price: request.price,
                high: band.high,
            });
        }

        let fill = self
            .positions
            .apply_sell(&symbol, request.amount)
            .ok_or(RejectReason::NoPosition {
                symbol: symbol.clone(),
            })?;
        if fill.amount < request.amount {
            warn!(
                requested = request.amount,
                held = fill.amount,
                "sell request is bigger than holding"
            );
        }

        let sell_value = fill.amount * request.price;
        self.balance += self.fill_model.sell_proceeds(request.price, fill.amount);
        self.log_balance(RequestType::Sell, old_balance, sell_value);

        Ok(MarketOutcome::Filled(self.fill_result(request, fill.amount, now)))
    }

    fn fill_result(&self, request: &Request, amount: f64, now: NaiveDateTime) -> TradeResult {
        TradeResult {
            request: request.clone(),
            kind: request.kind,
            price: request.price,
            amount,
            state: ResultState::Done,
            msg: MSG_SUCCESS.to_string(),
            balance: self.balance,
            date_time: now,
        }
    }

    fn log_balance(&self, kind: RequestType, old: f64, value: f64) {
        debug!(
            %kind,
            from = old,
            value,
            commission = self.fill_model.commission(value),
            to = self.balance,
            "balance updated"
        );
    }
}

/// Reject non-finite or negative numerics before any bookkeeping.
fn validate_request(request: &Request) -> std::result::Result<(), RejectReason> {
    if request.id.is_empty() {
        return Err(RejectReason::InvalidRequest("missing id".to_string()));
    }
    if !request.price.is_finite() || !request.amount.is_finite() {
        return Err(RejectReason::InvalidRequest(format!(
            "non-finite price {} or amount {}",
            request.price, request.amount
        )));
    }
    if request.price < 0.0 || request.amount < 0.0 {
        return Err(RejectReason::InvalidRequest(format!(
            "negative price {} or amount {}",
            request.price, request.amount
        )));
    }
    Ok(())
}
