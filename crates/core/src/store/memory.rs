//! In-memory store.
//!
//! All state sits behind one mutex, so every method is atomic. The
//! availability switches let tests drive the transient-failure paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mavuno_shared::types::{CollectionId, HarvestId, PaymentBatchId, PickerId};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use super::{CollectionStore, LedgerStore, PayoutStore};
use crate::collection::{
    CollectionStatus, HarvestCollection, HarvestLink, HarvestRecord, HarvestSalePolicy, Picker,
    SaleRecord, SettlementCommand, SettlementPlan, SettlementSnapshot, WeighEntry,
    buyer_payment_key, plan_settlement,
};
use crate::error::{CashError, CashResult};
use crate::ledger::{AppendOutcome, LedgerEntry, NewLedgerEntry, WalletSummary};
use crate::payout::{
    PaymentBatch, PayoutCommand, PayoutFunding, PayoutPlan, PayoutSnapshot, plan_payout,
};
use crate::scope::ProjectScope;
use crate::wallet::{LegacyWallet, MigrationPlan, WalletMeta};

#[derive(Default)]
struct State {
    entries: Vec<LedgerEntry>,
    metas: HashMap<ProjectScope, WalletMeta>,
    legacy: Vec<LegacyWallet>,
    collections: HashMap<CollectionId, HarvestCollection>,
    pickers: HashMap<PickerId, Picker>,
    weigh_entries: Vec<WeighEntry>,
    batches: HashMap<PaymentBatchId, PaymentBatch>,
    harvests: Vec<HarvestRecord>,
    sales: Vec<SaleRecord>,
}

impl State {
    fn keyed(&self, entry: &NewLedgerEntry) -> Option<&LedgerEntry> {
        let key = entry.input.idempotency_key.as_deref()?;
        self.entries
            .iter()
            .find(|e| e.scope() == entry.scope && e.idempotency_key.as_deref() == Some(key))
    }

    fn append(&mut self, entry: NewLedgerEntry) -> AppendOutcome {
        if let Some(existing) = self.keyed(&entry) {
            return AppendOutcome::Duplicate(existing.id);
        }
        let id = entry.id;
        self.entries.push(entry.into_recorded(Utc::now()));
        AppendOutcome::Appended(id)
    }

    /// Fails if a system entry's key already records another movement.
    fn check_replay(&self, entry: &NewLedgerEntry) -> CashResult<()> {
        match self.keyed(entry) {
            Some(existing) => entry.check_replay_of(existing),
            None => Ok(()),
        }
    }

    fn has_key(&self, scope: ProjectScope, key: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.scope() == scope && e.idempotency_key.as_deref() == Some(key))
    }

    fn balance(&self, scope: ProjectScope) -> Decimal {
        WalletSummary::fold(self.entries.iter().filter(|e| e.scope() == scope)).balance
    }

    fn pickers_of(&self, collection_id: CollectionId) -> Vec<Picker> {
        let mut pickers: Vec<Picker> = self
            .pickers
            .values()
            .filter(|p| p.collection_id == collection_id)
            .cloned()
            .collect();
        pickers.sort_by_key(|p| p.picker_number);
        pickers
    }

    fn weigh_entries_of(&self, collection_id: CollectionId) -> Vec<WeighEntry> {
        self.weigh_entries
            .iter()
            .filter(|e| e.collection_id == collection_id)
            .cloned()
            .collect()
    }

    fn collection(&self, id: CollectionId) -> CashResult<&HarvestCollection> {
        self.collections
            .get(&id)
            .ok_or(CashError::CollectionNotFound(id))
    }

    fn retire_harvest(&mut self, id: HarvestId) {
        self.harvests.retain(|h| h.id != id);
        self.sales.retain(|s| s.harvest_id != id);
    }
}

/// Store backed by process memory.
pub struct MemoryStore {
    state: Mutex<State>,
    available: AtomicBool,
    transactions: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty, available store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            available: AtomicBool::new(true),
            transactions: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    /// Makes every operation fail with `StoreUnavailable` while `false`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Makes atomic multi-record operations fail with `StoreUnavailable`
    /// while `false`. Plain reads and writes keep working.
    pub fn set_transactions_available(&self, available: bool) {
        self.transactions.store(available, Ordering::SeqCst);
    }

    /// Number of successful mutating operations.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Adds a legacy aggregate wallet.
    pub async fn seed_legacy_wallet(&self, wallet: LegacyWallet) {
        self.state.lock().await.legacy.push(wallet);
    }

    /// Adds a ledger entry directly, bypassing the migration guard.
    pub async fn seed_entry(&self, entry: NewLedgerEntry) {
        self.state.lock().await.append(entry);
    }

    /// Adds a harvest/sale pair directly.
    pub async fn seed_harvest_sale(&self, harvest: HarvestRecord, sale: SaleRecord) {
        let mut state = self.state.lock().await;
        state.harvests.push(harvest);
        state.sales.push(sale);
    }

    /// All entries of a project in insertion order.
    pub async fn entries_for(&self, scope: ProjectScope) -> Vec<LedgerEntry> {
        self.state
            .lock()
            .await
            .entries
            .iter()
            .filter(|e| e.scope() == scope)
            .cloned()
            .collect()
    }

    /// All sale records derived from a collection.
    pub async fn sales_for(&self, collection_id: CollectionId) -> Vec<SaleRecord> {
        self.state
            .lock()
            .await
            .sales
            .iter()
            .filter(|s| s.source_collection_id == collection_id)
            .cloned()
            .collect()
    }

    fn check_available(&self) -> CashResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CashError::StoreUnavailable("store is offline".to_string()))
        }
    }

    fn check_transactions(&self) -> CashResult<()> {
        self.check_available()?;
        if self.transactions.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CashError::StoreUnavailable(
                "transactions are unavailable".to_string(),
            ))
        }
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append_entry(&self, entry: NewLedgerEntry) -> CashResult<AppendOutcome> {
        self.check_available()?;
        let outcome = self.state.lock().await.append(entry);
        if !outcome.is_duplicate() {
            self.wrote();
        }
        Ok(outcome)
    }

    async fn list_entries(&self, scope: ProjectScope) -> CashResult<Vec<LedgerEntry>> {
        self.check_available()?;
        let mut entries = self.entries_for(scope).await;
        entries.sort_by_key(|e| e.client_recorded_at);
        Ok(entries)
    }

    async fn has_entries(&self, scope: ProjectScope) -> CashResult<bool> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .await
            .entries
            .iter()
            .any(|e| e.scope() == scope))
    }

    async fn wallet_meta(&self, scope: ProjectScope) -> CashResult<Option<WalletMeta>> {
        self.check_available()?;
        Ok(self.state.lock().await.metas.get(&scope).cloned())
    }

    async fn legacy_wallets(&self, scope: ProjectScope) -> CashResult<Vec<LegacyWallet>> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .await
            .legacy
            .iter()
            .filter(|w| w.company_id == scope.company_id && w.project_id == scope.project_id)
            .cloned()
            .collect())
    }

    async fn commit_migration(&self, plan: MigrationPlan) -> CashResult<bool> {
        self.check_transactions()?;
        let mut state = self.state.lock().await;
        let scope = plan.meta.scope();
        if state.metas.get(&scope).is_some_and(|m| m.migrated) {
            return Ok(false);
        }
        for entry in &plan.entries {
            state.check_replay(entry)?;
        }
        for entry in plan.entries {
            state.append(entry);
        }
        state.metas.insert(scope, plan.meta);
        self.wrote();
        Ok(true)
    }
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn insert_collection(&self, collection: HarvestCollection) -> CashResult<()> {
        self.check_available()?;
        self.state
            .lock()
            .await
            .collections
            .insert(collection.id, collection);
        self.wrote();
        Ok(())
    }

    async fn collection(&self, id: CollectionId) -> CashResult<Option<HarvestCollection>> {
        self.check_available()?;
        Ok(self.state.lock().await.collections.get(&id).cloned())
    }

    async fn closed_collections(&self, scope: ProjectScope) -> CashResult<Vec<HarvestCollection>> {
        self.check_available()?;
        let mut closed: Vec<HarvestCollection> = self
            .state
            .lock()
            .await
            .collections
            .values()
            .filter(|c| c.scope() == scope && c.status.is_closed())
            .cloned()
            .collect();
        closed.sort_by_key(|c| c.created_at);
        Ok(closed)
    }

    async fn write_settlement_fields(&self, collection: &HarvestCollection) -> CashResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let stored = state
            .collections
            .get_mut(&collection.id)
            .ok_or(CashError::CollectionNotFound(collection.id))?;
        stored.price_per_kg_buyer = collection.price_per_kg_buyer;
        stored.total_revenue = collection.total_revenue;
        stored.profit = collection.profit;
        stored.status = collection.status;
        stored.buyer_paid_at = collection.buyer_paid_at;
        self.wrote();
        Ok(())
    }

    async fn update_collection_totals(
        &self,
        id: CollectionId,
        total_harvest_kg: Decimal,
        total_picker_cost: Decimal,
    ) -> CashResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let stored = state
            .collections
            .get_mut(&id)
            .ok_or(CashError::CollectionNotFound(id))?;
        stored.total_harvest_kg = total_harvest_kg;
        stored.total_picker_cost = total_picker_cost;
        self.wrote();
        Ok(())
    }

    async fn transition_status(
        &self,
        id: CollectionId,
        from: CollectionStatus,
        to: CollectionStatus,
    ) -> CashResult<bool> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let stored = state
            .collections
            .get_mut(&id)
            .ok_or(CashError::CollectionNotFound(id))?;
        if stored.status != from {
            return Ok(false);
        }
        stored.status = to;
        self.wrote();
        Ok(true)
    }

    async fn insert_picker(&self, picker: Picker) -> CashResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let taken = state.pickers.values().any(|p| {
            p.collection_id == picker.collection_id && p.picker_number == picker.picker_number
        });
        if taken {
            return Err(CashError::DuplicatePickerNumber {
                collection_id: picker.collection_id,
                picker_number: picker.picker_number,
            });
        }
        state.pickers.insert(picker.id, picker);
        self.wrote();
        Ok(())
    }

    async fn picker(&self, id: PickerId) -> CashResult<Option<Picker>> {
        self.check_available()?;
        Ok(self.state.lock().await.pickers.get(&id).cloned())
    }

    async fn pickers(&self, collection_id: CollectionId) -> CashResult<Vec<Picker>> {
        self.check_available()?;
        Ok(self.state.lock().await.pickers_of(collection_id))
    }

    async fn update_picker_totals(
        &self,
        id: PickerId,
        total_kg: Decimal,
        total_pay: Decimal,
    ) -> CashResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let picker = state
            .pickers
            .get_mut(&id)
            .ok_or(CashError::PickerNotFound(id))?;
        picker.total_kg = total_kg;
        picker.total_pay = total_pay;
        self.wrote();
        Ok(())
    }

    async fn insert_weigh_entry(&self, entry: WeighEntry) -> CashResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let picker = state
            .pickers
            .get(&entry.picker_id)
            .ok_or(CashError::PickerNotFound(entry.picker_id))?;
        if picker.is_paid {
            return Err(CashError::PickerAlreadyPaid(picker.id));
        }
        state.weigh_entries.push(entry);
        self.wrote();
        Ok(())
    }

    async fn weigh_entries(&self, collection_id: CollectionId) -> CashResult<Vec<WeighEntry>> {
        self.check_available()?;
        Ok(self.state.lock().await.weigh_entries_of(collection_id))
    }

    async fn settle_atomically(
        &self,
        id: CollectionId,
        command: SettlementCommand,
        policy: &HarvestSalePolicy,
    ) -> CashResult<SettlementPlan> {
        self.check_transactions()?;
        let mut state = self.state.lock().await;

        let collection = state.collection(id)?.clone();
        let snapshot = SettlementSnapshot {
            credit_recorded: state.has_key(collection.scope(), &buyer_payment_key(&collection)),
            pickers: state.pickers_of(id),
            linked_harvests: state
                .harvests
                .iter()
                .filter(|h| h.source_collection_id == id)
                .cloned()
                .collect(),
            collection,
        };
        let plan = plan_settlement(&snapshot, &command, policy)?;
        if plan.is_noop() {
            return Ok(plan);
        }
        if let Some(credit) = &plan.ledger_credit {
            state.check_replay(credit)?;
        }

        if let HarvestLink::Create(draft) = &plan.harvest_link {
            state.harvests.push(draft.harvest.clone());
            state.sales.push(draft.sale.clone());
        }
        for harvest_id in &plan.retire_harvests {
            state.retire_harvest(*harvest_id);
        }
        if let Some(credit) = &plan.ledger_credit {
            state.append(credit.clone());
        }
        if plan.collection_changed {
            state.collections.insert(id, plan.collection.clone());
        }
        self.wrote();
        Ok(plan)
    }

    async fn insert_harvest_sale(&self, harvest: HarvestRecord, sale: SaleRecord) -> CashResult<()> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        state.harvests.push(harvest);
        state.sales.push(sale);
        self.wrote();
        Ok(())
    }

    async fn set_harvest_id(&self, id: CollectionId, harvest_id: HarvestId) -> CashResult<bool> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let stored = state
            .collections
            .get_mut(&id)
            .ok_or(CashError::CollectionNotFound(id))?;
        if stored.harvest_id.is_some() {
            return Ok(false);
        }
        stored.harvest_id = Some(harvest_id);
        self.wrote();
        Ok(true)
    }

    async fn harvests_for_collection(&self, id: CollectionId) -> CashResult<Vec<HarvestRecord>> {
        self.check_available()?;
        Ok(self
            .state
            .lock()
            .await
            .harvests
            .iter()
            .filter(|h| h.source_collection_id == id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PayoutStore for MemoryStore {
    async fn payment_batch(&self, id: PaymentBatchId) -> CashResult<Option<PaymentBatch>> {
        self.check_available()?;
        Ok(self.state.lock().await.batches.get(&id).cloned())
    }

    async fn commit_payout_batch(&self, command: PayoutCommand) -> CashResult<PayoutPlan> {
        self.check_transactions()?;
        let mut state = self.state.lock().await;

        let collection = state.collection(command.collection_id)?.clone();
        let mut pickers = Vec::with_capacity(command.picker_ids.len());
        let mut missing = Vec::new();
        for picker_id in &command.picker_ids {
            match state.pickers.get(picker_id) {
                Some(p) if p.collection_id == collection.id => pickers.push(p.clone()),
                _ => missing.push(*picker_id),
            }
        }
        let snapshot = PayoutSnapshot {
            balance: state.balance(collection.scope()),
            existing_batch: state.batches.get(&command.batch_id).cloned(),
            weigh_entries: state.weigh_entries_of(collection.id),
            collection,
            pickers,
            missing,
        };

        let plan = plan_payout(&snapshot, &command)?;
        if let PayoutPlan::Commit { batch, debit, totals } = &plan {
            state.check_replay(debit)?;
            for picker_id in &batch.picker_ids {
                let derived = totals.picker(*picker_id).copied();
                if let Some(picker) = state.pickers.get_mut(picker_id) {
                    if let Some(t) = derived {
                        picker.total_kg = t.total_kg;
                        picker.total_pay = t.total_pay;
                    }
                    picker.is_paid = true;
                    picker.paid_at = Some(batch.paid_at);
                    picker.payment_batch_id = Some(batch.id);
                    picker.payout_funding = Some(PayoutFunding::LedgerTracked);
                }
            }
            if let Some(stored) = state.collections.get_mut(&batch.collection_id) {
                stored.total_harvest_kg = totals.total_harvest_kg;
                stored.total_picker_cost = totals.total_picker_cost;
            }
            state.batches.insert(batch.id, batch.clone());
            state.append(debit.clone());
            self.wrote();
        }
        Ok(plan)
    }

    async fn mark_picker_paid(
        &self,
        id: PickerId,
        at: DateTime<Utc>,
        funding: PayoutFunding,
    ) -> CashResult<bool> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let picker = state
            .pickers
            .get_mut(&id)
            .ok_or(CashError::PickerNotFound(id))?;
        if picker.is_paid {
            return Ok(false);
        }
        picker.is_paid = true;
        picker.paid_at = Some(at);
        picker.payout_funding = Some(funding);
        self.wrote();
        Ok(true)
    }
}
