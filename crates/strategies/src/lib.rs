//! # Strategy Resolution
//!
//! Turns a stored strategy id plus caller overrides into one fully-resolved
//! strategy payload ready for job submission.
//!
//! ## Public API
//!
//! - `StrategyResolver`: fetches the stored definition (user group first, then library).
//! - `merge`: the pure override-merging step, usable without a broker.
//! - `ResolvedStrategyPayload`: the merged strategy with its extracted instruments.
//! - `choose_stock`: compiling bare instrument lists and extracting instruments.

// Declare all the modules that constitute this crate.
pub mod choose_stock;
pub mod error;
pub mod resolver;

// Re-export the key components to create a clean, public-facing API.
pub use error::StrategyError;
pub use resolver::{ResolvedStrategyPayload, StrategyOverrides, StrategyResolver, merge};
