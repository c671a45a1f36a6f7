//! Store implementations for data access.
//!
//! [`SeaStore`] hides the `SeaORM` details behind the store ports of
//! `mavuno-core`: ledger, collections and payouts each live in their own
//! module but share one connection pool.

mod collection;
mod ledger;
mod payout;
mod store;

pub use store::SeaStore;
