//! Split-buy-and-hold policy.
//!
//! Buys at the last close in five equal tranches of the starting budget and
//! then holds.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use replay_core::{round_to, Candle, Request, RequestType, ResultState, TradeResult};
use tracing::{debug, info, warn};

use crate::Strategy;

/// Number of tranches the budget is split into.
const TRANCHES: f64 = 5.0;

/// Order amounts are floored to this many decimal places.
const AMOUNT_DECIMALS: i32 = 4;

/// Buy-and-hold with split entries.
pub struct BuyAndHold {
    is_initialized: bool,
    is_simulation: bool,
    commission_ratio: f64,
    data: Vec<Candle>,
    budget: f64,
    balance: f64,
    min_price: f64,
    results: Vec<TradeResult>,
    /// Accepted-but-unfilled requests keyed by request id.
    waiting_requests: BTreeMap<String, TradeResult>,
    request_seq: u64,
}

impl BuyAndHold {
    /// Create a policy; `is_simulation` stamps requests with data time.
    pub fn new(is_simulation: bool, commission_ratio: f64) -> Self {
        Self {
            is_initialized: false,
            is_simulation,
            commission_ratio,
            data: Vec::new(),
            budget: 0.0,
            balance: 0.0,
            min_price: 0.0,
            results: Vec::new(),
            waiting_requests: BTreeMap::new(),
            request_seq: 0,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    /// Cash as tracked by the policy from its own fills.
    pub fn balance(&self) -> f64 {
        self.balance
    }

    /// Completed results received so far.
    pub fn results(&self) -> &[TradeResult] {
        &self.results
    }

    /// Ids of requests still waiting for a fill.
    pub fn waiting_request_ids(&self) -> impl Iterator<Item = &str> {
        self.waiting_requests.keys().map(String::as_str)
    }

    fn next_request_id(&mut self, now: &NaiveDateTime) -> String {
        self.request_seq += 1;
        format!("{}.{:03}", now.and_utc().timestamp(), self.request_seq)
    }

    fn now(&self) -> NaiveDateTime {
        match (self.is_simulation, self.data.last()) {
            (true, Some(last)) => last.date_time,
            _ => chrono::Local::now().naive_local(),
        }
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "BnH"
    }

    fn initialize(&mut self, budget: f64, min_price: f64) {
        if self.is_initialized {
            return;
        }
        self.is_initialized = true;
        self.budget = budget;
        self.balance = budget;
        self.min_price = min_price;
        info!(budget, min_price, "buy-and-hold initialized");
    }

    fn update_trading_info(&mut self, candle: &Candle) {
        if !self.is_initialized {
            return;
        }
        self.data.push(candle.clone());
    }

    fn update_result(&mut self, result: &TradeResult) {
        if !self.is_initialized {
            return;
        }

        let request_id = &result.request.id;
        if result.state == ResultState::Requested {
            self.waiting_requests.insert(request_id.clone(), result.clone());
            return;
        }
        self.waiting_requests.remove(request_id);

        let total = result.price * result.amount;
        let fee = total * self.commission_ratio;
        match result.kind {
            RequestType::Buy => self.balance -= (total + fee).round(),
            RequestType::Sell => self.balance += (total - fee).round(),
            RequestType::Cancel => {}
        }

        info!(
            id = %request_id,
            kind = %result.kind,
            msg = %result.msg,
            price = result.price,
            amount = result.amount,
            total,
            balance = self.balance,
            "result received"
        );
        self.results.push(result.clone());
    }

    fn get_request(&mut self) -> Option<Vec<Request>> {
        if !self.is_initialized {
            return None;
        }
        let last_close = self.data.last()?.close;
        let now = self.now();

        let target_budget = (self.budget / TRANCHES).min(self.balance);
        let factor = 10f64.powi(AMOUNT_DECIMALS);
        let amount = ((target_budget / last_close) * factor).floor() / factor;
        let total_value = round_to(last_close * amount, 0);

        if self.min_price > total_value || total_value > self.balance {
            debug!(
                total_value,
                min_price = self.min_price,
                balance = self.balance,
                "order value out of range, skipping turn"
            );
            if self.is_simulation {
                let id = self.next_request_id(&now);
                return Some(vec![Request::skip(id, now)]);
            }
            return None;
        }

        let mut requests = Vec::with_capacity(self.waiting_requests.len() + 1);
        let pending: Vec<String> = self.waiting_requests.keys().cloned().collect();
        for request_id in pending {
            warn!(id = %request_id, "cancel request added");
            requests.push(Request::cancel(request_id, now));
        }

        let id = self.next_request_id(&now);
        info!(id = %id, price = last_close, amount, total_value, "buy request");
        requests.push(Request::new(id, RequestType::Buy, last_close, amount, now));
        Some(requests)
    }
}
