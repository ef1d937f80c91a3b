//! Core domain types and logic.

pub mod candle;
pub mod swing;
pub mod structure;
pub mod zones;
pub mod liquidity;
pub mod volatility;
pub mod alignment;
pub mod signal;
pub mod sizing;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
