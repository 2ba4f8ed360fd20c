//! Replay engine for the candle-replay system.
//!
//! This crate provides:
//! - The turn-based virtual market and its fill model
//! - Position and cash bookkeeping
//! - The run ledger with periodic scoring
//! - Run orchestration, summaries and ledger storage

pub mod analyzer;
pub mod fill_model;
pub mod market;
pub mod metrics;
pub mod position;
pub mod simulator;
pub mod store;

pub use analyzer::{Analyzer, LedgerRecords};
pub use fill_model::FillModel;
pub use market::{MarketOutcome, RejectReason, VirtualMarket};
pub use metrics::{RunSummary, SummaryCalculator};
pub use position::PositionBook;
pub use simulator::Simulator;
pub use store::{open_store, JsonStore, LedgerStore, SqliteStore};
