//! `SeaORM` entities for the Mavuno schema.
//!
//! Enum-like columns are stored as text and parsed at the repository boundary.

pub mod harvest_collections;
pub mod harvests;
pub mod ledger_entries;
pub mod legacy_wallets;
pub mod payment_batches;
pub mod pickers;
pub mod sales;
pub mod wallet_meta;
pub mod weigh_entries;
