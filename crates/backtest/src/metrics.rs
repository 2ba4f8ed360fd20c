//! Performance metrics.
//!
//! Scores a balance snapshot against the run's baseline and summarizes a
//! finished run from its ledger.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use replay_core::time::opt_date_time_format;
use replay_core::{
    round_to, AssetYield, BalanceSnapshot, Error, RequestType, Result, ScoreRecord,
};
use serde::{Deserialize, Serialize};

use crate::analyzer::LedgerRecords;

/// Percentages are kept to this many decimal places.
const PERCENT_DECIMALS: i32 = 3;

/// Score `current` against `baseline`.
///
/// The baseline total values holdings at cost; the current total values them
/// at the current quote. With `is_baseline` set the cumulative return is 0.
/// A held symbol without a current or baseline quote is an error.
pub fn score(
    baseline: &BalanceSnapshot,
    current: &BalanceSnapshot,
    is_baseline: bool,
) -> Result<ScoreRecord> {
    let current_quote = current
        .quote
        .as_ref()
        .ok_or_else(|| Error::data("snapshot has no quote"))?;
    let baseline_quote = baseline
        .quote
        .as_ref()
        .ok_or_else(|| Error::data("baseline snapshot has no quote"))?;

    let baseline_total = baseline.cost_total();
    let mut current_total = current.balance;
    let mut asset = Vec::with_capacity(current.asset.len());
    let mut price_change_ratio = BTreeMap::new();

    for (symbol, position) in &current.asset {
        let price = *current_quote
            .get(symbol)
            .ok_or_else(|| Error::data(format!("no quote for {symbol}")))?;
        let start_price = *baseline_quote
            .get(symbol)
            .ok_or_else(|| Error::data(format!("no baseline quote for {symbol}")))?;

        current_total += position.quantity * price;

        asset.push(AssetYield {
            symbol: symbol.clone(),
            avg_cost: position.avg_cost,
            price,
            quantity: position.quantity,
            item_yield: percent_change(position.avg_cost, price),
        });
        price_change_ratio.insert(symbol.clone(), percent_change(start_price, price));
    }

    let cumulative_return = if is_baseline {
        0.0
    } else {
        percent_change(baseline_total, current_total)
    };

    Ok(ScoreRecord {
        balance: current.balance,
        cumulative_return,
        price_change_ratio,
        asset,
        date_time: current.date_time,
    })
}

/// (to − from) / from × 100 to three places; 0 when unchanged or `from` is not positive.
fn percent_change(from: f64, to: f64) -> f64 {
    if from <= 0.0 || to == from {
        return 0.0;
    }
    round_to((to - from) / from * 100.0, PERCENT_DECIMALS)
}

/// End-of-run summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub initial_budget: f64,
    /// Cash at the last snapshot.
    pub final_balance: f64,
    /// Cash plus holdings at the last quote.
    pub final_total: f64,
    /// Cumulative return of the last score, percent.
    pub cumulative_return: f64,
    /// Price change of the last score, percent, per symbol.
    pub price_change_ratio: BTreeMap<String, f64>,
    pub buy_fills: u32,
    pub sell_fills: u32,
    /// Maximum drawdown (absolute).
    pub max_drawdown: f64,
    /// Maximum drawdown percentage.
    pub max_drawdown_pct: f64,
    /// Ticks replayed.
    pub turns: usize,
    #[serde(with = "opt_date_time_format")]
    pub first_date_time: Option<NaiveDateTime>,
    #[serde(with = "opt_date_time_format")]
    pub last_date_time: Option<NaiveDateTime>,
}

/// Value curve point.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuePoint {
    pub date_time: Option<NaiveDateTime>,
    pub total: f64,
    pub drawdown: f64,
    pub drawdown_pct: f64,
}

/// Builds a [`RunSummary`] from the ledger.
pub struct SummaryCalculator {
    initial_budget: f64,
}

impl SummaryCalculator {
    /// Calculator measuring returns against `initial_budget`.
    pub fn new(initial_budget: f64) -> Self {
        Self { initial_budget }
    }

    pub fn calculate(&self, records: &LedgerRecords) -> RunSummary {
        let mut summary = RunSummary {
            initial_budget: self.initial_budget,
            final_balance: self.initial_budget,
            final_total: self.initial_budget,
            turns: records.trading_info.len(),
            ..Default::default()
        };

        for result in &records.results {
            match result.record.kind {
                RequestType::Buy => summary.buy_fills += 1,
                RequestType::Sell => summary.sell_fills += 1,
                RequestType::Cancel => {}
            }
        }

        if let Some(last) = records.asset_info.last() {
            summary.final_balance = last.balance;
            summary.final_total = last.marked_total().unwrap_or(last.cost_total());
        }

        if let Some(last) = records.scores.last() {
            summary.cumulative_return = last.record.cumulative_return;
            summary.price_change_ratio = last.record.price_change_ratio.clone();
        }
        summary.first_date_time = records.scores.first().and_then(|s| s.record.date_time);
        summary.last_date_time = records.scores.last().and_then(|s| s.record.date_time);

        for point in self.build_value_curve(&records.asset_info) {
            if point.drawdown > summary.max_drawdown {
                summary.max_drawdown = point.drawdown;
                summary.max_drawdown_pct = point.drawdown_pct;
            }
        }

        summary
    }

    /// Marked value of each snapshot with the running drawdown from peak.
    ///
    /// Snapshots without a usable quote are skipped.
    pub fn build_value_curve(&self, snapshots: &[BalanceSnapshot]) -> Vec<ValuePoint> {
        let mut curve = Vec::with_capacity(snapshots.len());
        let mut peak = f64::MIN;

        for snapshot in snapshots {
            let Some(total) = snapshot.marked_total() else {
                continue;
            };
            peak = peak.max(total);

            let drawdown = peak - total;
            let drawdown_pct = if peak > 0.0 {
                (drawdown / peak) * 100.0
            } else {
                0.0
            };

            curve.push(ValuePoint {
                date_time: snapshot.date_time,
                total,
                drawdown,
                drawdown_pct,
            });
        }

        curve
    }
}
