//! Harvest collection lifecycle and settlement.

pub mod cache;
mod offline;
pub mod service;
pub mod settlement;
pub mod totals;
pub mod types;

#[cfg(test)]
mod tests;

pub use cache::CollectionCache;
pub use service::{CollectionService, SettlementOutcome, SyncAction, SyncOutcome, SyncReport, WeighReceipt};
pub use settlement::{
    HarvestLink, HarvestSalePolicy, SettlementCommand, SettlementPlan, SettlementSnapshot,
    buyer_payment_key, plan_settlement, transition_payout_complete,
};
pub use totals::{CollectionTotals, PickerTotals, SaleFigures, round_currency, sale_figures};
pub use types::{
    CollectionSnapshot, CollectionStatus, HarvestCollection, HarvestRecord, HarvestSaleDraft,
    NewCollection, Picker, SaleRecord, WeighEntry,
};
