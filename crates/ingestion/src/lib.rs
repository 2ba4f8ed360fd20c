//! Historical data ingestion for the candle-replay system.
//!
//! This crate handles:
//! - The candle-series source abstraction
//! - Fetching minute candles from the Upbit REST API
//! - Offline replay from saved API responses
//! - Sequential tick delivery during a run

pub mod provider;
pub mod source;
pub mod upbit;

pub use provider::SimulationDataProvider;
pub use source::{CandleSource, JsonFileSource, StaticSource};
pub use upbit::UpbitClient;
