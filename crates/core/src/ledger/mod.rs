//! Project cash ledger.
//!
//! - Immutable cash movement entries (credits and debits)
//! - Order-independent summary fold
//! - Write-through wallet projection
//! - Ledger service guarded by the wallet migration

pub mod entry;
pub mod projection;
pub mod service;
pub mod summary;

#[cfg(test)]
mod summary_props;

pub use entry::{
    AppendOutcome, EntryType, LedgerEntry, LedgerEntryInput, MAX_STORED_VALUE, NewLedgerEntry,
    RESERVED_KEY_PREFIXES, RefType, check_stored_range, is_reserved_key,
};
pub use projection::WalletProjection;
pub use service::LedgerService;
pub use summary::WalletSummary;
