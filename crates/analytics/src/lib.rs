//! # Backtest Analytics
//!
//! Pure calculations over a finished backtest: headline performance metrics
//! and renderer-ready chart data. This crate never touches the network.
//!
//! ## Public API
//!
//! - `AnalyticsEngine`: computes `PerformanceMetrics` from a value series and a ledger.
//! - `value_series`: turns position snapshots into `(timestamp, total_value)` pairs.
//! - `assemble` / `ChartData`: merges snapshots, ledger and K-lines for rendering.
//! - `AnalyticsError`: the error type of this crate.

pub mod chart;
pub mod engine;
pub mod error;
pub mod report;

pub use chart::{ChartData, PricePoint, TradePoint, assemble};
pub use engine::{AnalyticsEngine, value_series};
pub use error::AnalyticsError;
pub use report::PerformanceMetrics;
