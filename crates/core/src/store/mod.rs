//! Store ports.
//!
//! Services talk to persistence only through these traits. Operations that
//! must be atomic take a plain command, read a snapshot inside their own
//! transaction, hand it to the pure planner in this crate and apply the
//! resulting plan before committing. If the store cannot run a transaction
//! it fails with [`CashError::StoreUnavailable`](crate::CashError::StoreUnavailable).

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mavuno_shared::types::{CollectionId, HarvestId, PaymentBatchId, PickerId};
use rust_decimal::Decimal;

use crate::collection::{
    CollectionStatus, HarvestCollection, HarvestRecord, HarvestSalePolicy, Picker, SaleRecord,
    SettlementCommand, SettlementPlan, WeighEntry,
};
use crate::error::CashResult;
use crate::ledger::{AppendOutcome, LedgerEntry, NewLedgerEntry};
use crate::payout::{PaymentBatch, PayoutCommand, PayoutFunding, PayoutPlan};
use crate::scope::ProjectScope;
use crate::wallet::{LegacyWallet, MigrationPlan, WalletMeta};

/// Append-only cash ledger and wallet metadata.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Appends an entry. An entry whose idempotency key already exists in the
    /// project writes nothing and reports the existing id.
    async fn append_entry(&self, entry: NewLedgerEntry) -> CashResult<AppendOutcome>;

    /// Lists a project's entries ordered by client timestamp.
    async fn list_entries(&self, scope: ProjectScope) -> CashResult<Vec<LedgerEntry>>;

    /// Returns true if the project has any ledger entry.
    async fn has_entries(&self, scope: ProjectScope) -> CashResult<bool>;

    /// Reads the project's wallet metadata.
    async fn wallet_meta(&self, scope: ProjectScope) -> CashResult<Option<WalletMeta>>;

    /// Reads the project's legacy aggregate wallets.
    async fn legacy_wallets(&self, scope: ProjectScope) -> CashResult<Vec<LegacyWallet>>;

    /// Atomically writes the plan's entries and sets `migrated = true`.
    ///
    /// Returns `false` without writing if the project is already migrated.
    async fn commit_migration(&self, plan: MigrationPlan) -> CashResult<bool>;
}

/// Harvest collections, pickers, weigh entries and the Harvest/Sale domain.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Inserts a new collection.
    async fn insert_collection(&self, collection: HarvestCollection) -> CashResult<()>;

    /// Reads a collection.
    async fn collection(&self, id: CollectionId) -> CashResult<Option<HarvestCollection>>;

    /// Lists a project's closed collections.
    async fn closed_collections(&self, scope: ProjectScope) -> CashResult<Vec<HarvestCollection>>;

    /// Writes price, revenue, profit, status and `buyer_paid_at` without a
    /// transaction. Never touches `harvest_id`.
    async fn write_settlement_fields(&self, collection: &HarvestCollection) -> CashResult<()>;

    /// Writes the collection's aggregate totals.
    async fn update_collection_totals(
        &self,
        id: CollectionId,
        total_harvest_kg: Decimal,
        total_picker_cost: Decimal,
    ) -> CashResult<()>;

    /// Moves the collection from `from` to `to`. Returns `false` if the
    /// status was no longer `from`.
    async fn transition_status(
        &self,
        id: CollectionId,
        from: CollectionStatus,
        to: CollectionStatus,
    ) -> CashResult<bool>;

    /// Inserts a picker. Fails with `DuplicatePickerNumber` if the number is taken.
    async fn insert_picker(&self, picker: Picker) -> CashResult<()>;

    /// Reads a picker.
    async fn picker(&self, id: PickerId) -> CashResult<Option<Picker>>;

    /// Lists a collection's pickers ordered by picker number.
    async fn pickers(&self, collection_id: CollectionId) -> CashResult<Vec<Picker>>;

    /// Writes a picker's totals.
    async fn update_picker_totals(
        &self,
        id: PickerId,
        total_kg: Decimal,
        total_pay: Decimal,
    ) -> CashResult<()>;

    /// Appends a weigh entry.
    async fn insert_weigh_entry(&self, entry: WeighEntry) -> CashResult<()>;

    /// Lists a collection's weigh entries.
    async fn weigh_entries(&self, collection_id: CollectionId) -> CashResult<Vec<WeighEntry>>;

    /// Runs a settlement command in one atomic unit and returns the applied plan.
    async fn settle_atomically(
        &self,
        id: CollectionId,
        command: SettlementCommand,
        policy: &HarvestSalePolicy,
    ) -> CashResult<SettlementPlan>;

    /// Inserts a harvest and its sale without a transaction.
    async fn insert_harvest_sale(&self, harvest: HarvestRecord, sale: SaleRecord) -> CashResult<()>;

    /// Sets `harvest_id` if it is still unset. Returns `false` otherwise.
    async fn set_harvest_id(&self, id: CollectionId, harvest_id: HarvestId) -> CashResult<bool>;

    /// Lists harvest records derived from a collection.
    async fn harvests_for_collection(&self, id: CollectionId) -> CashResult<Vec<HarvestRecord>>;
}

/// Payment batches and picker payout flags.
#[async_trait]
pub trait PayoutStore: Send + Sync {
    /// Reads a payment batch.
    async fn payment_batch(&self, id: PaymentBatchId) -> CashResult<Option<PaymentBatch>>;

    /// Runs a batch payout in one atomic unit and returns the applied plan.
    async fn commit_payout_batch(&self, command: PayoutCommand) -> CashResult<PayoutPlan>;

    /// Marks a single picker paid. Returns `false` if already paid.
    async fn mark_picker_paid(
        &self,
        id: PickerId,
        at: DateTime<Utc>,
        funding: PayoutFunding,
    ) -> CashResult<bool>;
}

/// Everything the services need from a store.
pub trait CashStore: LedgerStore + CollectionStore + PayoutStore {}

impl<T: LedgerStore + CollectionStore + PayoutStore + ?Sized> CashStore for T {}
