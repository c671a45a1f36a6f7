//! Collection settlement service.
//!
//! Drives a harvest collection from weighing through sale to close. Totals
//! are always re-derived from the weigh-entry table. Settlement runs as one
//! atomic store unit; when the store cannot run transactions the service
//! falls back to the degraded path in [`super::offline`].

use chrono::Utc;
use mavuno_shared::types::{CollectionId, CompanyId, HarvestId, PickerId, WeighEntryId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache::CollectionCache;
use super::settlement::{
    HarvestLink, HarvestSalePolicy, SettlementCommand, SettlementPlan, transition_payout_complete,
};
use super::totals::CollectionTotals;
use super::types::{
    CollectionSnapshot, CollectionStatus, HarvestCollection, NewCollection, Picker, WeighEntry,
};
use crate::error::{CashError, CashResult};
use crate::ledger::{LedgerService, check_stored_range};
use crate::scope::{Actor, ProjectScope};
use crate::store::CashStore;

/// Result of `set_buyer_price_and_maybe_close`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    /// The collection after the operation.
    pub collection: HarvestCollection,
    /// Harvest created by this call, if any.
    pub created_harvest: Option<HarvestId>,
    /// Whether the buyer-payment credit was written.
    pub credited: bool,
    /// True when the degraded (non-atomic) path was used.
    pub degraded: bool,
}

impl SettlementOutcome {
    fn from_plan(plan: SettlementPlan) -> Self {
        Self {
            created_harvest: plan.created_harvest(),
            credited: plan.ledger_credit.is_some(),
            collection: plan.collection,
            degraded: false,
        }
    }
}

/// What a reconciliation sweep did to one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "harvest_id", rename_all = "snake_case")]
pub enum SyncAction {
    /// The collection is not closed.
    NotClosed,
    /// The crop does not participate in the Harvest/Sale domain.
    NotApplicable,
    /// Already linked; nothing created.
    Unchanged,
    /// A missing pair was created.
    Created(HarvestId),
    /// An orphaned harvest was linked.
    Adopted(HarvestId),
}

/// Result of syncing one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// The collection.
    pub collection_id: CollectionId,
    /// What happened to its harvest link.
    pub action: SyncAction,
    /// Duplicate harvests removed.
    pub retired: usize,
    /// Whether a missing buyer-payment credit was recorded.
    #[serde(default)]
    pub credited: bool,
}

/// Result of syncing every closed collection of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Collections swept successfully.
    pub synced: Vec<SyncOutcome>,
    /// Collections whose sweep failed; retried on the next run.
    pub failed: Vec<CollectionId>,
}

/// Result of recording a weigh entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeighReceipt {
    /// The stored entry.
    pub entry: WeighEntry,
    /// Re-derived totals of the collection.
    pub totals: CollectionTotals,
}

/// Collection operations for one store.
pub struct CollectionService<S: ?Sized> {
    pub(super) store: Arc<S>,
    pub(super) ledger: LedgerService<S>,
    pub(super) cache: CollectionCache,
    pub(super) policy: HarvestSalePolicy,
}

impl<S: ?Sized> Clone for CollectionService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ledger: self.ledger.clone(),
            cache: self.cache.clone(),
            policy: self.policy.clone(),
        }
    }
}

impl<S: CashStore + ?Sized> CollectionService<S> {
    /// Creates a collection service.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        ledger: LedgerService<S>,
        cache: CollectionCache,
        policy: HarvestSalePolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            cache,
            policy,
        }
    }

    /// Opens a new collection in `collecting` state.
    ///
    /// # Errors
    ///
    /// Returns validation errors for missing scope, blank fields or a
    /// non-positive picker rate, and propagates store errors.
    pub async fn open_collection(
        &self,
        scope: ProjectScope,
        actor: &Actor,
        input: NewCollection,
    ) -> CashResult<HarvestCollection> {
        scope.validate()?;
        if input.crop_type.trim().is_empty() {
            return Err(CashError::EmptyField("crop_type"));
        }
        if input.name.trim().is_empty() {
            return Err(CashError::EmptyField("name"));
        }
        if input.price_per_kg_picker <= Decimal::ZERO {
            return Err(CashError::NonPositivePrice(input.price_per_kg_picker));
        }
        check_stored_range(input.price_per_kg_picker, "price_per_kg_picker")?;

        let collection = HarvestCollection {
            id: CollectionId::new(),
            company_id: scope.company_id,
            project_id: scope.project_id,
            crop_type: input.crop_type.trim().to_lowercase(),
            name: input.name.trim().to_string(),
            harvest_date: input.harvest_date,
            price_per_kg_picker: input.price_per_kg_picker,
            total_harvest_kg: Decimal::ZERO,
            total_picker_cost: Decimal::ZERO,
            price_per_kg_buyer: None,
            total_revenue: None,
            profit: None,
            status: CollectionStatus::Collecting,
            harvest_id: None,
            buyer_paid_at: None,
            created_by: actor.uid,
            created_at: Utc::now(),
        };
        self.store.insert_collection(collection.clone()).await?;
        self.cache.put_collection(&collection);
        self.cache.put_pickers(collection.id, &[]);

        info!(collection_id = %collection.id, scope = %scope, crop = %collection.crop_type, "Collection opened");
        Ok(collection)
    }

    /// Reads a collection of the caller's company.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` if absent or owned by another company.
    pub async fn collection(&self, company_id: CompanyId, id: CollectionId) -> CashResult<HarvestCollection> {
        self.find_collection(company_id, id).await
    }

    /// Reads a collection with its pickers.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` if absent or owned by another company.
    pub async fn detail(&self, company_id: CompanyId, id: CollectionId) -> CashResult<CollectionSnapshot> {
        let collection = self.find_collection(company_id, id).await?;
        let pickers = self.load_pickers(id).await?;
        Ok(CollectionSnapshot {
            collection,
            pickers,
        })
    }

    /// Registers a picker on a collecting collection.
    ///
    /// # Errors
    ///
    /// - `CollectionNotCollecting` once the collection has moved on
    /// - `DuplicatePickerNumber` if the number is taken
    /// - `EmptyField` for a blank name
    pub async fn register_picker(
        &self,
        company_id: CompanyId,
        collection_id: CollectionId,
        picker_number: u32,
        picker_name: &str,
    ) -> CashResult<Picker> {
        if picker_name.trim().is_empty() {
            return Err(CashError::EmptyField("picker_name"));
        }
        let collection = self.find_collection(company_id, collection_id).await?;
        ensure_collecting(&collection)?;

        let picker = Picker {
            id: PickerId::new(),
            company_id,
            collection_id,
            picker_number,
            picker_name: picker_name.trim().to_string(),
            total_kg: Decimal::ZERO,
            total_pay: Decimal::ZERO,
            is_paid: false,
            paid_at: None,
            payment_batch_id: None,
            payout_funding: None,
        };
        self.store.insert_picker(picker.clone()).await?;
        self.load_pickers(collection_id).await?;

        debug!(collection_id = %collection_id, picker_number, "Picker registered");
        Ok(picker)
    }

    /// Appends a weigh entry and re-derives the picker's and collection's totals.
    ///
    /// # Errors
    ///
    /// - `NonPositiveWeight` for weights `<= 0`
    /// - `AmountOutOfRange` if the weight or the resulting totals cannot be stored
    /// - `PickerNotFound` for pickers of another company
    /// - `PickerAlreadyPaid` once the picker has been paid
    /// - `CollectionNotCollecting` once the collection has moved on
    pub async fn record_weigh_entry(
        &self,
        company_id: CompanyId,
        picker_id: PickerId,
        weight_kg: Decimal,
        trip_number: u32,
    ) -> CashResult<WeighReceipt> {
        if weight_kg <= Decimal::ZERO {
            return Err(CashError::NonPositiveWeight(weight_kg));
        }
        check_stored_range(weight_kg, "weight_kg")?;
        let picker = self.find_picker(company_id, picker_id).await?;
        if picker.is_paid {
            return Err(CashError::PickerAlreadyPaid(picker_id));
        }
        let collection = self.find_collection(company_id, picker.collection_id).await?;
        ensure_collecting(&collection)?;

        let entry = WeighEntry {
            id: WeighEntryId::new(),
            company_id,
            picker_id,
            collection_id: collection.id,
            weight_kg,
            trip_number,
            recorded_at: Utc::now(),
        };
        let pickers = self.store.pickers(collection.id).await?;
        let mut entries = self.store.weigh_entries(collection.id).await?;
        entries.push(entry.clone());
        let totals = CollectionTotals::derive(collection.price_per_kg_picker, &pickers, &entries)?;

        self.store.insert_weigh_entry(entry.clone()).await?;
        self.apply_totals(collection, pickers, &totals).await?;

        Ok(WeighReceipt { entry, totals })
    }

    /// Re-derives every picker's and the collection's totals from the
    /// weigh-entry table.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` and store errors.
    pub async fn recalculate_totals(
        &self,
        company_id: CompanyId,
        collection_id: CollectionId,
    ) -> CashResult<CollectionTotals> {
        let collection = self.find_collection(company_id, collection_id).await?;
        let totals = self.refresh_totals(collection).await?;
        info!(
            collection_id = %collection_id,
            total_harvest_kg = %totals.total_harvest_kg,
            total_picker_cost = %totals.total_picker_cost,
            "Collection totals recalculated"
        );
        Ok(totals)
    }

    /// Sets the buyer price and, when the buyer has paid, closes the collection.
    ///
    /// Closing checks that every picker is paid, records the buyer-payment
    /// credit and creates the Harvest/Sale pair exactly once, all in one
    /// atomic unit. Closing an already closed collection re-applies the
    /// Harvest/Sale guard and records the credit if it is still missing.
    ///
    /// # Errors
    ///
    /// - `NonPositivePrice` for a price `<= 0`
    /// - `AmountOutOfRange` for a price or revenue the store cannot hold
    /// - `UnpaidPickers` when closing with unpaid pickers (nothing is written)
    /// - `InvalidTransition` when pricing a closed collection without closing
    /// - `CollectionNotFound` and non-transient store errors
    pub async fn set_buyer_price_and_maybe_close(
        &self,
        company_id: CompanyId,
        collection_id: CollectionId,
        price_per_kg_buyer: Decimal,
        mark_buyer_paid: bool,
        actor: &Actor,
    ) -> CashResult<SettlementOutcome> {
        if price_per_kg_buyer <= Decimal::ZERO {
            return Err(CashError::NonPositivePrice(price_per_kg_buyer));
        }
        check_stored_range(price_per_kg_buyer, "price_per_kg_buyer")?;
        let collection = match self.find_collection(company_id, collection_id).await {
            Ok(collection) => collection,
            Err(e) if e.is_transient() => self
                .cache
                .collection(collection_id)
                .filter(|c| c.company_id == company_id)
                .ok_or(e)?,
            Err(e) => return Err(e),
        };
        let scope = collection.scope();

        match self.ledger.ensure_migrated(scope, actor).await {
            Ok(_) => {}
            Err(e) if e.is_transient() => {
                warn!(collection_id = %collection_id, error = %e, "Migration guard unavailable, settling without ledger credit");
                return self
                    .settle_degraded(collection, price_per_kg_buyer, mark_buyer_paid, actor, false)
                    .await;
            }
            Err(e) => return Err(e),
        }

        let command = SettlementCommand::SetBuyerPrice {
            price_per_kg_buyer,
            mark_buyer_paid,
            actor: actor.clone(),
            at: Utc::now(),
        };
        match self
            .store
            .settle_atomically(collection_id, command, &self.policy)
            .await
        {
            Ok(plan) => {
                self.cache.put_collection(&plan.collection);
                if plan.ledger_credit.is_some() {
                    self.ledger.projection().invalidate(&scope);
                }
                info!(
                    collection_id = %collection_id,
                    status = %plan.collection.status,
                    revenue = ?plan.collection.total_revenue,
                    harvest_id = ?plan.collection.harvest_id,
                    "Collection settled"
                );
                Ok(SettlementOutcome::from_plan(plan))
            }
            Err(e) if e.is_transient() => {
                warn!(collection_id = %collection_id, error = %e, "Atomic settlement unavailable, using degraded path");
                self.settle_degraded(collection, price_per_kg_buyer, mark_buyer_paid, actor, true)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Re-applies the `harvest_id` guard to a closed collection.
    ///
    /// Creates the missing pair, adopts an orphaned harvest and removes
    /// duplicates. A buyer-payment credit missing after a degraded close is
    /// recorded. Open collections are left untouched.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` and store errors.
    pub async fn sync_closed_collection_to_harvest_sale(
        &self,
        company_id: CompanyId,
        collection_id: CollectionId,
        actor: &Actor,
    ) -> CashResult<SyncOutcome> {
        let collection = self.find_collection(company_id, collection_id).await?;
        self.ledger.ensure_migrated(collection.scope(), actor).await?;
        self.sync_one(&collection, actor).await
    }

    /// Runs the reconciliation sweep over every closed collection of a project.
    ///
    /// Failures are logged and reported; the sweep continues with the next
    /// collection.
    ///
    /// # Errors
    ///
    /// Returns an error only if the project's closed collections cannot be listed.
    pub async fn sync_all(&self, scope: ProjectScope, actor: &Actor) -> CashResult<SyncReport> {
        scope.validate()?;
        self.ledger.ensure_migrated(scope, actor).await?;
        let closed = self.store.closed_collections(scope).await?;

        let mut report = SyncReport::default();
        for collection in &closed {
            match self.sync_one(collection, actor).await {
                Ok(outcome) => report.synced.push(outcome),
                Err(e) => {
                    warn!(collection_id = %collection.id, error = %e, "Harvest/Sale sync failed");
                    report.failed.push(collection.id);
                }
            }
        }
        info!(scope = %scope, synced = report.synced.len(), failed = report.failed.len(), "Harvest/Sale sweep finished");
        Ok(report)
    }

    /// Marks a collection `payout_complete` once every picker is paid.
    ///
    /// # Errors
    ///
    /// - `NoPickers` / `UnpaidPickers` while pickers are missing or unpaid
    /// - `InvalidTransition` on a closed collection
    pub async fn mark_payout_complete(
        &self,
        company_id: CompanyId,
        collection_id: CollectionId,
    ) -> CashResult<HarvestCollection> {
        let mut collection = self.find_collection(company_id, collection_id).await?;
        let pickers = self.load_pickers(collection_id).await?;

        let Some(to) = transition_payout_complete(&collection, &pickers)? else {
            return Ok(collection);
        };
        if !self
            .store
            .transition_status(collection_id, collection.status, to)
            .await?
        {
            let current = self.find_collection(company_id, collection_id).await?;
            if current.status == to {
                return Ok(current);
            }
            return Err(CashError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        collection.status = to;
        self.cache.put_collection(&collection);
        info!(collection_id = %collection_id, "Collection payout complete");
        Ok(collection)
    }

    pub(crate) async fn find_collection(
        &self,
        company_id: CompanyId,
        id: CollectionId,
    ) -> CashResult<HarvestCollection> {
        let collection = self
            .store
            .collection(id)
            .await?
            .filter(|c| c.company_id == company_id)
            .ok_or(CashError::CollectionNotFound(id))?;
        self.cache.put_collection(&collection);
        Ok(collection)
    }

    pub(crate) async fn find_picker(&self, company_id: CompanyId, id: PickerId) -> CashResult<Picker> {
        self.store
            .picker(id)
            .await?
            .filter(|p| p.company_id == company_id)
            .ok_or(CashError::PickerNotFound(id))
    }

    pub(crate) async fn load_pickers(&self, collection_id: CollectionId) -> CashResult<Vec<Picker>> {
        let pickers = self.store.pickers(collection_id).await?;
        self.cache.put_pickers(collection_id, &pickers);
        Ok(pickers)
    }

    async fn refresh_totals(&self, collection: HarvestCollection) -> CashResult<CollectionTotals> {
        let pickers = self.store.pickers(collection.id).await?;
        let entries = self.store.weigh_entries(collection.id).await?;
        let totals = CollectionTotals::derive(collection.price_per_kg_picker, &pickers, &entries)?;
        self.apply_totals(collection, pickers, &totals).await?;
        Ok(totals)
    }

    async fn apply_totals(
        &self,
        mut collection: HarvestCollection,
        mut pickers: Vec<Picker>,
        totals: &CollectionTotals,
    ) -> CashResult<()> {
        for picker in &mut pickers {
            let Some(t) = totals.picker(picker.id) else {
                continue;
            };
            if picker.total_kg != t.total_kg || picker.total_pay != t.total_pay {
                self.store
                    .update_picker_totals(picker.id, t.total_kg, t.total_pay)
                    .await?;
                picker.total_kg = t.total_kg;
                picker.total_pay = t.total_pay;
            }
        }
        self.store
            .update_collection_totals(collection.id, totals.total_harvest_kg, totals.total_picker_cost)
            .await?;

        collection.total_harvest_kg = totals.total_harvest_kg;
        collection.total_picker_cost = totals.total_picker_cost;
        self.cache.put_collection(&collection);
        self.cache.put_pickers(collection.id, &pickers);
        Ok(())
    }

    async fn sync_one(&self, collection: &HarvestCollection, actor: &Actor) -> CashResult<SyncOutcome> {
        if !collection.status.is_closed() {
            return Ok(SyncOutcome {
                collection_id: collection.id,
                action: SyncAction::NotClosed,
                retired: 0,
                credited: false,
            });
        }
        let command = SettlementCommand::SyncHarvestSale {
            actor: actor.clone(),
            at: Utc::now(),
        };
        let plan = self
            .store
            .settle_atomically(collection.id, command, &self.policy)
            .await?;
        self.cache.put_collection(&plan.collection);

        let action = match &plan.harvest_link {
            HarvestLink::Create(draft) => SyncAction::Created(draft.harvest.id),
            HarvestLink::Adopt(id) => SyncAction::Adopted(*id),
            HarvestLink::NotApplicable => SyncAction::NotApplicable,
            HarvestLink::Unchanged if plan.collection.status.is_closed() => SyncAction::Unchanged,
            HarvestLink::Unchanged => SyncAction::NotClosed,
        };
        let credited = plan.ledger_credit.is_some();
        if credited {
            self.ledger.projection().invalidate(&collection.scope());
            info!(collection_id = %collection.id, revenue = ?plan.collection.total_revenue, "Missing buyer-payment credit recorded");
        }
        if !matches!(action, SyncAction::Unchanged | SyncAction::NotClosed) || !plan.retire_harvests.is_empty() {
            info!(collection_id = %collection.id, action = ?action, retired = plan.retire_harvests.len(), "Harvest/Sale link repaired");
        }
        Ok(SyncOutcome {
            collection_id: collection.id,
            action,
            retired: plan.retire_harvests.len(),
            credited,
        })
    }
}

fn ensure_collecting(collection: &HarvestCollection) -> CashResult<()> {
    if collection.status == CollectionStatus::Collecting {
        Ok(())
    } else {
        Err(CashError::CollectionNotCollecting {
            collection_id: collection.id,
            status: collection.status,
        })
    }
}
