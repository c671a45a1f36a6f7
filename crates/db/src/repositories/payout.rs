//! Payment batch persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mavuno_core::payout::{
    PaymentBatch, PayoutCommand, PayoutFunding, PayoutPlan, PayoutSnapshot, plan_payout,
};
use mavuno_core::store::PayoutStore;
use mavuno_core::{CashError, CashResult};
use mavuno_shared::types::{CollectionId, CompanyId, PaymentBatchId, PickerId};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, DbErr, EntityTrait, QueryFilter,
    QuerySelect, Set, TransactionTrait,
};
use tracing::info;

use super::collection::{load_weigh_entries, lock_collection};
use super::ledger::{append_system_in, locked_balance};
use super::store::{SeaStore, from_db_time, store_err, to_db_time};
use crate::entities::{harvest_collections, payment_batches, pickers};

impl payment_batches::Model {
    fn into_domain(self) -> CashResult<PaymentBatch> {
        let picker_ids: Vec<PickerId> = serde_json::from_value(self.picker_ids)
            .map_err(|e| CashError::Store(format!("invalid batch picker ids: {e}")))?;
        Ok(PaymentBatch {
            id: PaymentBatchId::from_uuid(self.id),
            company_id: CompanyId::from_uuid(self.company_id),
            collection_id: CollectionId::from_uuid(self.collection_id),
            picker_ids,
            total_amount: self.total_amount,
            paid_at: from_db_time(self.paid_at),
        })
    }
}

async fn find_batch<C: sea_orm::ConnectionTrait>(
    conn: &C,
    id: PaymentBatchId,
) -> CashResult<Option<PaymentBatch>> {
    payment_batches::Entity::find_by_id(id.into_inner())
        .one(conn)
        .await
        .map_err(store_err)?
        .map(payment_batches::Model::into_domain)
        .transpose()
}

async fn apply_payout(txn: &DatabaseTransaction, plan: &PayoutPlan) -> CashResult<()> {
    let PayoutPlan::Commit {
        batch,
        debit,
        totals,
    } = plan
    else {
        return Ok(());
    };
    let ids: Vec<_> = batch.picker_ids.iter().map(|id| id.into_inner()).collect();
    let picker_ids = serde_json::to_value(&batch.picker_ids)
        .map_err(|e| CashError::Store(format!("invalid batch picker ids: {e}")))?;

    append_system_in(txn, debit.clone()).await?;

    let write = async {
        for picker_id in &batch.picker_ids {
            let Some(t) = totals.picker(*picker_id) else {
                continue;
            };
            pickers::Entity::update_many()
                .col_expr(pickers::Column::TotalKg, Expr::value(t.total_kg))
                .col_expr(pickers::Column::TotalPay, Expr::value(t.total_pay))
                .filter(pickers::Column::Id.eq(picker_id.into_inner()))
                .exec(txn)
                .await?;
        }
        harvest_collections::Entity::update_many()
            .col_expr(
                harvest_collections::Column::TotalHarvestKg,
                Expr::value(totals.total_harvest_kg),
            )
            .col_expr(
                harvest_collections::Column::TotalPickerCost,
                Expr::value(totals.total_picker_cost),
            )
            .filter(harvest_collections::Column::Id.eq(batch.collection_id.into_inner()))
            .exec(txn)
            .await?;

        pickers::Entity::update_many()
            .col_expr(pickers::Column::IsPaid, Expr::value(true))
            .col_expr(pickers::Column::PaidAt, Expr::value(to_db_time(batch.paid_at)))
            .col_expr(
                pickers::Column::PaymentBatchId,
                Expr::value(batch.id.into_inner()),
            )
            .col_expr(
                pickers::Column::PayoutFunding,
                Expr::value(PayoutFunding::LedgerTracked.as_str()),
            )
            .filter(pickers::Column::Id.is_in(ids))
            .filter(pickers::Column::IsPaid.eq(false))
            .exec(txn)
            .await?;

        payment_batches::ActiveModel {
            id: Set(batch.id.into_inner()),
            company_id: Set(batch.company_id.into_inner()),
            collection_id: Set(batch.collection_id.into_inner()),
            picker_ids: Set(picker_ids),
            total_amount: Set(batch.total_amount),
            paid_at: Set(to_db_time(batch.paid_at)),
        }
        .insert(txn)
        .await?;
        Ok::<(), DbErr>(())
    };
    write.await.map_err(store_err)
}

#[async_trait]
impl PayoutStore for SeaStore {
    async fn payment_batch(&self, id: PaymentBatchId) -> CashResult<Option<PaymentBatch>> {
        find_batch(&self.db, id).await
    }

    async fn commit_payout_batch(&self, command: PayoutCommand) -> CashResult<PayoutPlan> {
        let txn = self.db.begin().await.map_err(store_err)?;

        // Lock order: collection row, the project's wallet row, picker rows.
        let collection = lock_collection(&txn, command.collection_id).await?;
        let balance = locked_balance(&txn, collection.scope()).await?;
        let existing_batch = find_batch(&txn, command.batch_id).await?;

        let ids: Vec<_> = command.picker_ids.iter().map(|id| id.into_inner()).collect();
        let found: Vec<_> = pickers::Entity::find()
            .filter(pickers::Column::Id.is_in(ids))
            .filter(pickers::Column::CollectionId.eq(collection.id.into_inner()))
            .lock_exclusive()
            .all(&txn)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(pickers::Model::into_domain)
            .collect::<CashResult<_>>()?;

        let mut listed = Vec::with_capacity(command.picker_ids.len());
        let mut missing = Vec::new();
        for picker_id in &command.picker_ids {
            match found.iter().find(|p| p.id == *picker_id) {
                Some(picker) => listed.push(picker.clone()),
                None => missing.push(*picker_id),
            }
        }

        // Picker rows are locked, so no weigh entry for them can land before commit.
        let weigh_entries = load_weigh_entries(&txn, collection.id).await?;

        let snapshot = PayoutSnapshot {
            collection,
            existing_batch,
            pickers: listed,
            missing,
            weigh_entries,
            balance,
        };
        let plan = plan_payout(&snapshot, &command)?;
        if matches!(plan, PayoutPlan::Replay(_)) {
            txn.rollback().await.map_err(store_err)?;
            return Ok(plan);
        }

        apply_payout(&txn, &plan).await?;
        txn.commit().await.map_err(store_err)?;

        info!(
            batch_id = %plan.batch().id,
            pickers = plan.batch().picker_ids.len(),
            "Payment batch stored"
        );
        Ok(plan)
    }

    async fn mark_picker_paid(
        &self,
        id: PickerId,
        at: DateTime<Utc>,
        funding: PayoutFunding,
    ) -> CashResult<bool> {
        let collection_id = pickers::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_err)?
            .ok_or(CashError::PickerNotFound(id))?
            .collection_id;

        let txn = self.db.begin().await.map_err(store_err)?;
        // Lock order: collection row, then the picker row.
        lock_collection(&txn, CollectionId::from_uuid(collection_id)).await?;
        let picker = pickers::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(store_err)?
            .ok_or(CashError::PickerNotFound(id))?;
        if picker.is_paid {
            txn.rollback().await.map_err(store_err)?;
            return Ok(false);
        }

        pickers::Entity::update_many()
            .col_expr(pickers::Column::IsPaid, Expr::value(true))
            .col_expr(pickers::Column::PaidAt, Expr::value(to_db_time(at)))
            .col_expr(pickers::Column::PayoutFunding, Expr::value(funding.as_str()))
            .filter(pickers::Column::Id.eq(id.into_inner()))
            .exec(&txn)
            .await
            .map_err(store_err)?;
        txn.commit().await.map_err(store_err)?;
        Ok(true)
    }
}
