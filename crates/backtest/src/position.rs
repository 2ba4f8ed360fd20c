//! Position bookkeeping for the virtual market.
//!
//! Holdings are a symbol → (average cost, quantity) map. Every mutation
//! replaces the stored value wholesale.

use std::collections::BTreeMap;

use replay_core::{round_to, AssetPosition};

/// Quantities are kept to this many decimal places.
pub const QUANTITY_DECIMALS: i32 = 6;

/// Quantity actually sold by [`PositionBook::apply_sell`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SellFill {
    /// Sold amount, clamped to holdings.
    pub amount: f64,
    /// Whether the position was removed.
    pub cleared: bool,
}

/// Holdings keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    positions: BTreeMap<String, AssetPosition>,
}

impl PositionBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Position in `symbol`, if held.
    pub fn get(&self, symbol: &str) -> Option<AssetPosition> {
        self.positions.get(symbol).copied()
    }

    /// Whether `symbol` is held.
    pub fn contains(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    /// Whether nothing is held.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Copy of every holding.
    pub fn snapshot(&self) -> BTreeMap<String, AssetPosition> {
        self.positions.clone()
    }

    /// Add a bought amount and recompute the weighted average cost.
    ///
    /// Returns `None`, leaving the book untouched, if the resulting quantity
    /// rounds to zero.
    pub fn apply_buy(&mut self, symbol: &str, price: f64, amount: f64) -> Option<AssetPosition> {
        let old = self.get(symbol).unwrap_or(AssetPosition::new(0.0, 0.0));
        let quantity = round_to(old.quantity + amount, QUANTITY_DECIMALS);
        if quantity <= 0.0 {
            return None;
        }
        let avg_cost = round_to((old.cost_basis() + price * amount) / quantity, 0);
        let updated = AssetPosition::new(avg_cost, quantity);
        self.positions.insert(symbol.to_string(), updated);
        Some(updated)
    }

    /// Remove a sold amount; average cost is unchanged.
    ///
    /// An amount above the holding is clamped to it. A position whose
    /// quantity reaches zero is removed. Returns `None` without a position.
    pub fn apply_sell(&mut self, symbol: &str, amount: f64) -> Option<SellFill> {
        let old = self.get(symbol)?;
        if amount > old.quantity {
            self.positions.remove(symbol);
            return Some(SellFill {
                amount: old.quantity,
                cleared: true,
            });
        }

        let quantity = round_to(old.quantity - amount, QUANTITY_DECIMALS);
        if quantity <= 0.0 {
            self.positions.remove(symbol);
            return Some(SellFill {
                amount,
                cleared: true,
            });
        }
        self.positions
            .insert(symbol.to_string(), AssetPosition::new(old.avg_cost, quantity));
        Some(SellFill {
            amount,
            cleared: false,
        })
    }
}
