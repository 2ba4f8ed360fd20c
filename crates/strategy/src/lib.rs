//! Trading policies for the candle-replay system.
//!
//! A policy consumes ticks and fill results and produces request batches.
//! Pending orders are the policy's own bookkeeping: before re-issuing an
//! order with the same intent it emits a cancel for the pending one.

pub mod buy_and_hold;

pub use buy_and_hold::BuyAndHold;

use replay_core::{Candle, Request, TradeResult};

/// Decision logic driven turn by turn.
pub trait Strategy {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Set the budget and minimum order value. Only the first call has effect.
    fn initialize(&mut self, budget: f64, min_price: f64);

    /// Feed the latest tick.
    fn update_trading_info(&mut self, candle: &Candle);

    /// Feed the result of a previously issued request.
    fn update_result(&mut self, result: &TradeResult);

    /// Requests for this turn, in submission order. `None` when the policy
    /// cannot decide (not initialized, no data yet).
    fn get_request(&mut self) -> Option<Vec<Request>>;
}
