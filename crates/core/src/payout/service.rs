//! Picker payout batcher.

use chrono::Utc;
use mavuno_shared::types::{CollectionId, CompanyId, PaymentBatchId, PickerId};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{
    CashPaidOutcome, PayoutCommand, PayoutFunding, PayoutPlan, PayoutReceipt, PayoutReconciliation,
};
use crate::collection::CollectionService;
use crate::error::{CashError, CashResult};
use crate::ledger::LedgerService;
use crate::scope::Actor;
use crate::store::CashStore;

/// Pays pickers, either in ledger-tracked batches or individually in cash.
pub struct PayoutBatcher<S: ?Sized> {
    store: Arc<S>,
    ledger: LedgerService<S>,
    collections: CollectionService<S>,
}

impl<S: ?Sized> Clone for PayoutBatcher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ledger: self.ledger.clone(),
            collections: self.collections.clone(),
        }
    }
}

impl<S: CashStore + ?Sized> PayoutBatcher<S> {
    /// Creates a payout batcher.
    #[must_use]
    pub fn new(store: Arc<S>, ledger: LedgerService<S>, collections: CollectionService<S>) -> Self {
        Self {
            store,
            ledger,
            collections,
        }
    }

    /// Pays the listed unpaid pickers as one batch with one wallet debit.
    ///
    /// The batch id is the debit's idempotency key: calling again with the
    /// same id returns the committed batch and writes nothing.
    ///
    /// # Errors
    ///
    /// - `NonPositiveAmount` if `total_amount <= 0`
    /// - `NoEligiblePickers` if no listed picker is unpaid
    /// - `PickerNotFound` if a listed picker is not in the collection
    /// - `PayoutAmountMismatch` if the total differs from the pickers' pay
    /// - `InsufficientFunds` if the wallet balance is below the total
    /// - `BatchCollectionMismatch` if the batch id was used for another collection
    /// - `IdempotencyConflict` if the debit's key already records another movement
    pub async fn mark_pickers_paid_in_batch(
        &self,
        company_id: CompanyId,
        collection_id: CollectionId,
        batch_id: PaymentBatchId,
        picker_ids: Vec<PickerId>,
        total_amount: Decimal,
        actor: &Actor,
    ) -> CashResult<PayoutReceipt> {
        if total_amount <= Decimal::ZERO {
            return Err(CashError::NonPositiveAmount(total_amount));
        }
        if picker_ids.is_empty() {
            return Err(CashError::NoEligiblePickers);
        }

        let collection = self
            .collections
            .find_collection(company_id, collection_id)
            .await?;
        let scope = collection.scope();
        self.ledger.ensure_migrated(scope, actor).await?;

        if let Some(batch) = self.store.payment_batch(batch_id).await? {
            if batch.company_id != company_id {
                return Err(CashError::CollectionNotFound(batch.collection_id));
            }
            if batch.collection_id != collection_id {
                return Err(CashError::BatchCollectionMismatch {
                    batch_id,
                    collection_id: batch.collection_id,
                });
            }
            debug!(batch_id = %batch_id, "Payment batch replayed");
            return Ok(PayoutReceipt {
                batch,
                replayed: true,
            });
        }

        let summary = self.ledger.fresh_summary(scope, actor).await?;
        if !summary.covers(total_amount) {
            return Err(CashError::InsufficientFunds {
                available: summary.balance,
                requested: total_amount,
            });
        }

        let command = PayoutCommand {
            batch_id,
            collection_id,
            picker_ids,
            total_amount,
            actor: actor.clone(),
            at: Utc::now(),
        };
        let plan = self.store.commit_payout_batch(command).await?;
        self.ledger.projection().invalidate(&scope);
        if let Err(e) = self.collections.load_pickers(collection_id).await {
            debug!(collection_id = %collection_id, error = %e, "Picker cache not refreshed after payout");
        }

        let replayed = matches!(plan, PayoutPlan::Replay(_));
        let batch = match plan {
            PayoutPlan::Replay(batch) | PayoutPlan::Commit { batch, .. } => batch,
        };
        if !replayed {
            info!(
                batch_id = %batch.id,
                collection_id = %collection_id,
                pickers = batch.picker_ids.len(),
                total = %batch.total_amount,
                "Picker payout batch committed"
            );
        }
        Ok(PayoutReceipt { batch, replayed })
    }

    /// Marks a single picker paid in cash, outside the wallet.
    ///
    /// No batch and no ledger debit are written; the payout is recorded as
    /// externally funded. Already-paid pickers are left unchanged.
    ///
    /// # Errors
    ///
    /// `PickerNotFound` for pickers of another company, and store errors.
    pub async fn mark_picker_cash_paid(
        &self,
        company_id: CompanyId,
        picker_id: PickerId,
    ) -> CashResult<CashPaidOutcome> {
        let picker = self.collections.find_picker(company_id, picker_id).await?;
        if picker.is_paid {
            return Ok(CashPaidOutcome::AlreadyPaid);
        }

        let marked = self
            .store
            .mark_picker_paid(picker_id, Utc::now(), PayoutFunding::ExternallyFunded)
            .await?;
        if let Err(e) = self.collections.load_pickers(picker.collection_id).await {
            debug!(collection_id = %picker.collection_id, error = %e, "Picker cache not refreshed after cash payout");
        }

        if marked {
            warn!(
                picker_id = %picker_id,
                amount = %picker.total_pay,
                "Picker paid in cash without a wallet debit"
            );
            Ok(CashPaidOutcome::Marked)
        } else {
            Ok(CashPaidOutcome::AlreadyPaid)
        }
    }

    /// Splits a collection's picker pay by how it was funded.
    ///
    /// # Errors
    ///
    /// `CollectionNotFound` and store errors.
    pub async fn reconciliation(
        &self,
        company_id: CompanyId,
        collection_id: CollectionId,
    ) -> CashResult<PayoutReconciliation> {
        self.collections
            .find_collection(company_id, collection_id)
            .await?;
        let pickers = self.collections.load_pickers(collection_id).await?;
        Ok(PayoutReconciliation::from_pickers(&pickers))
    }
}
