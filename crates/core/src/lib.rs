//! Core types and configuration for the candle-replay system.
//!
//! This crate provides shared types used across all other crates:
//! - Market data and trading records (candles, requests, results, scores)
//! - Configuration structures
//! - Common error types
//! - Date/time helpers

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
