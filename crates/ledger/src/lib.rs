//! # Ledger Reconstruction
//!
//! The broker streams position *state* per tick and never reports trades.
//! This crate infers the trade ledger by diffing the size of every symbol
//! between timestamp-adjacent snapshots.
//!
//! ## Public API
//!
//! - `LedgerEngine`: the stateless reconstructor.
//! - `ReconciliationPolicy`: the tolerance band for cash-based trade amounts.
//! - `Ledger` / `SymbolTrades`: per-symbol buy and sell events.
//! - `order_snapshots` / `snapshots_from_records`: input preparation.

pub mod engine;
pub mod snapshots;

pub use engine::{Ledger, LedgerEngine, ReconciliationPolicy, SymbolTrades};
pub use snapshots::{order_snapshots, snapshots_from_records};
