//! Core business logic for Mavuno.
//!
//! This crate contains the cash-ledger and settlement rules with ZERO web or
//! database dependencies. Persistence is reached only through the async
//! traits in [`store`].
//!
//! # Modules
//!
//! - `ledger` - Append-only cash ledger, summary fold and wallet projection
//! - `wallet` - One-time migration from the legacy aggregate wallet
//! - `collection` - Harvest collection lifecycle, totals and settlement
//! - `payout` - Picker payout batches
//! - `store` - Store ports and the in-memory store

pub mod collection;
pub mod error;
pub mod ledger;
pub mod payout;
pub mod scope;
pub mod store;
pub mod wallet;

pub use error::{CashError, CashResult, ErrorClass};
pub use scope::{Actor, ProjectScope};
