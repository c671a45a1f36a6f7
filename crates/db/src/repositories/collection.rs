//! Harvest collection, picker and Harvest/Sale persistence.

use async_trait::async_trait;
use mavuno_core::collection::{
    CollectionStatus, HarvestCollection, HarvestLink, HarvestRecord, HarvestSalePolicy, Picker,
    SaleRecord, SettlementCommand, SettlementPlan, SettlementSnapshot, WeighEntry,
    buyer_payment_key, plan_settlement,
};
use mavuno_core::payout::PayoutFunding;
use mavuno_core::scope::ProjectScope;
use mavuno_core::store::CollectionStore;
use mavuno_core::{CashError, CashResult};
use mavuno_shared::types::{
    CollectionId, CompanyId, HarvestId, PaymentBatchId, PickerId, ProjectId, SaleId, UserId,
    WeighEntryId,
};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, UpdateMany,
};
use tracing::{debug, info};

use super::ledger::{append_system_in, has_key};
use super::store::{
    SeaStore, from_db_int, from_db_time, is_unique_violation, parse_column, store_err,
    to_db_int, to_db_time,
};
use crate::entities::{harvest_collections, harvests, pickers, sales, weigh_entries};

impl harvest_collections::Model {
    pub(crate) fn into_domain(self) -> CashResult<HarvestCollection> {
        Ok(HarvestCollection {
            id: CollectionId::from_uuid(self.id),
            company_id: CompanyId::from_uuid(self.company_id),
            project_id: ProjectId::from_uuid(self.project_id),
            crop_type: self.crop_type,
            name: self.name,
            harvest_date: self.harvest_date,
            price_per_kg_picker: self.price_per_kg_picker,
            total_harvest_kg: self.total_harvest_kg,
            total_picker_cost: self.total_picker_cost,
            price_per_kg_buyer: self.price_per_kg_buyer,
            total_revenue: self.total_revenue,
            profit: self.profit,
            status: parse_column(&self.status, "status", CollectionStatus::parse)?,
            harvest_id: self.harvest_id.map(HarvestId::from_uuid),
            buyer_paid_at: self.buyer_paid_at.map(from_db_time),
            created_by: UserId::from_uuid(self.created_by),
            created_at: from_db_time(self.created_at),
        })
    }
}

impl pickers::Model {
    pub(crate) fn into_domain(self) -> CashResult<Picker> {
        let payout_funding = self
            .payout_funding
            .as_deref()
            .map(|f| parse_column(f, "payout_funding", PayoutFunding::parse))
            .transpose()?;
        Ok(Picker {
            id: PickerId::from_uuid(self.id),
            company_id: CompanyId::from_uuid(self.company_id),
            collection_id: CollectionId::from_uuid(self.collection_id),
            picker_number: from_db_int(self.picker_number, "picker_number")?,
            picker_name: self.picker_name,
            total_kg: self.total_kg,
            total_pay: self.total_pay,
            is_paid: self.is_paid,
            paid_at: self.paid_at.map(from_db_time),
            payment_batch_id: self.payment_batch_id.map(PaymentBatchId::from_uuid),
            payout_funding,
        })
    }
}

impl weigh_entries::Model {
    fn into_domain(self) -> CashResult<WeighEntry> {
        Ok(WeighEntry {
            id: WeighEntryId::from_uuid(self.id),
            company_id: CompanyId::from_uuid(self.company_id),
            picker_id: PickerId::from_uuid(self.picker_id),
            collection_id: CollectionId::from_uuid(self.collection_id),
            weight_kg: self.weight_kg,
            trip_number: from_db_int(self.trip_number, "trip_number")?,
            recorded_at: from_db_time(self.recorded_at),
        })
    }
}

impl From<harvests::Model> for HarvestRecord {
    fn from(model: harvests::Model) -> Self {
        Self {
            id: HarvestId::from_uuid(model.id),
            company_id: CompanyId::from_uuid(model.company_id),
            project_id: ProjectId::from_uuid(model.project_id),
            crop_type: model.crop_type,
            harvest_date: model.harvest_date,
            quantity_kg: model.quantity_kg,
            source_collection_id: CollectionId::from_uuid(model.source_collection_id),
            created_by: UserId::from_uuid(model.created_by),
            created_at: from_db_time(model.created_at),
        }
    }
}

impl From<sales::Model> for SaleRecord {
    fn from(model: sales::Model) -> Self {
        Self {
            id: SaleId::from_uuid(model.id),
            harvest_id: HarvestId::from_uuid(model.harvest_id),
            company_id: CompanyId::from_uuid(model.company_id),
            project_id: ProjectId::from_uuid(model.project_id),
            quantity_kg: model.quantity_kg,
            price_per_kg: model.price_per_kg,
            total_amount: model.total_amount,
            sale_date: model.sale_date,
            source_collection_id: CollectionId::from_uuid(model.source_collection_id),
        }
    }
}

fn collection_model(c: HarvestCollection) -> harvest_collections::ActiveModel {
    harvest_collections::ActiveModel {
        id: Set(c.id.into_inner()),
        company_id: Set(c.company_id.into_inner()),
        project_id: Set(c.project_id.into_inner()),
        crop_type: Set(c.crop_type),
        name: Set(c.name),
        harvest_date: Set(c.harvest_date),
        price_per_kg_picker: Set(c.price_per_kg_picker),
        total_harvest_kg: Set(c.total_harvest_kg),
        total_picker_cost: Set(c.total_picker_cost),
        price_per_kg_buyer: Set(c.price_per_kg_buyer),
        total_revenue: Set(c.total_revenue),
        profit: Set(c.profit),
        status: Set(c.status.as_str().to_string()),
        harvest_id: Set(c.harvest_id.map(HarvestId::into_inner)),
        buyer_paid_at: Set(c.buyer_paid_at.map(to_db_time)),
        created_by: Set(c.created_by.into_inner()),
        created_at: Set(to_db_time(c.created_at)),
    }
}

fn picker_model(p: Picker) -> CashResult<pickers::ActiveModel> {
    Ok(pickers::ActiveModel {
        id: Set(p.id.into_inner()),
        company_id: Set(p.company_id.into_inner()),
        collection_id: Set(p.collection_id.into_inner()),
        picker_number: Set(to_db_int(p.picker_number, "picker_number")?),
        picker_name: Set(p.picker_name),
        total_kg: Set(p.total_kg),
        total_pay: Set(p.total_pay),
        is_paid: Set(p.is_paid),
        paid_at: Set(p.paid_at.map(to_db_time)),
        payment_batch_id: Set(p.payment_batch_id.map(PaymentBatchId::into_inner)),
        payout_funding: Set(p.payout_funding.map(|f| f.as_str().to_string())),
    })
}

fn harvest_model(h: HarvestRecord) -> harvests::ActiveModel {
    harvests::ActiveModel {
        id: Set(h.id.into_inner()),
        company_id: Set(h.company_id.into_inner()),
        project_id: Set(h.project_id.into_inner()),
        crop_type: Set(h.crop_type),
        harvest_date: Set(h.harvest_date),
        quantity_kg: Set(h.quantity_kg),
        source_collection_id: Set(h.source_collection_id.into_inner()),
        created_by: Set(h.created_by.into_inner()),
        created_at: Set(to_db_time(h.created_at)),
    }
}

fn sale_model(s: SaleRecord) -> sales::ActiveModel {
    sales::ActiveModel {
        id: Set(s.id.into_inner()),
        harvest_id: Set(s.harvest_id.into_inner()),
        company_id: Set(s.company_id.into_inner()),
        project_id: Set(s.project_id.into_inner()),
        quantity_kg: Set(s.quantity_kg),
        price_per_kg: Set(s.price_per_kg),
        total_amount: Set(s.total_amount),
        sale_date: Set(s.sale_date),
        source_collection_id: Set(s.source_collection_id.into_inner()),
    }
}

/// Update of the settlement columns. Leaves `harvest_id` alone.
fn settlement_update(c: &HarvestCollection) -> UpdateMany<harvest_collections::Entity> {
    harvest_collections::Entity::update_many()
        .col_expr(
            harvest_collections::Column::PricePerKgBuyer,
            Expr::value(c.price_per_kg_buyer),
        )
        .col_expr(
            harvest_collections::Column::TotalRevenue,
            Expr::value(c.total_revenue),
        )
        .col_expr(harvest_collections::Column::Profit, Expr::value(c.profit))
        .col_expr(
            harvest_collections::Column::Status,
            Expr::value(c.status.as_str()),
        )
        .col_expr(
            harvest_collections::Column::BuyerPaidAt,
            Expr::value(c.buyer_paid_at.map(to_db_time)),
        )
        .filter(harvest_collections::Column::Id.eq(c.id.into_inner()))
}

async fn insert_pair<C: ConnectionTrait>(
    conn: &C,
    harvest: HarvestRecord,
    sale: SaleRecord,
) -> Result<(), DbErr> {
    harvest_model(harvest).insert(conn).await?;
    sale_model(sale).insert(conn).await?;
    Ok(())
}

async fn load_pickers<C: ConnectionTrait>(
    conn: &C,
    collection_id: CollectionId,
) -> CashResult<Vec<Picker>> {
    pickers::Entity::find()
        .filter(pickers::Column::CollectionId.eq(collection_id.into_inner()))
        .order_by_asc(pickers::Column::PickerNumber)
        .all(conn)
        .await
        .map_err(store_err)?
        .into_iter()
        .map(pickers::Model::into_domain)
        .collect()
}

async fn load_harvests<C: ConnectionTrait>(
    conn: &C,
    collection_id: CollectionId,
) -> CashResult<Vec<HarvestRecord>> {
    let rows = harvests::Entity::find()
        .filter(harvests::Column::SourceCollectionId.eq(collection_id.into_inner()))
        .order_by_asc(harvests::Column::CreatedAt)
        .order_by_asc(harvests::Column::Id)
        .all(conn)
        .await
        .map_err(store_err)?;
    Ok(rows.into_iter().map(HarvestRecord::from).collect())
}

/// Reads a collection inside `txn` and locks its row until commit.
/// Loads a collection's weigh entries in recording order.
pub(crate) async fn load_weigh_entries<C: ConnectionTrait>(
    conn: &C,
    collection_id: CollectionId,
) -> CashResult<Vec<WeighEntry>> {
    weigh_entries::Entity::find()
        .filter(weigh_entries::Column::CollectionId.eq(collection_id.into_inner()))
        .order_by_asc(weigh_entries::Column::RecordedAt)
        .all(conn)
        .await
        .map_err(store_err)?
        .into_iter()
        .map(weigh_entries::Model::into_domain)
        .collect()
}

pub(crate) async fn lock_collection(
    txn: &DatabaseTransaction,
    id: CollectionId,
) -> CashResult<HarvestCollection> {
    harvest_collections::Entity::find_by_id(id.into_inner())
        .lock_exclusive()
        .one(txn)
        .await
        .map_err(store_err)?
        .ok_or(CashError::CollectionNotFound(id))?
        .into_domain()
}

impl SeaStore {
    async fn collection_exists(&self, id: CollectionId) -> CashResult<bool> {
        let found = harvest_collections::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_err)?;
        Ok(found.is_some())
    }

    async fn apply_settlement(
        txn: &DatabaseTransaction,
        plan: &SettlementPlan,
    ) -> CashResult<()> {
        if let Some(credit) = &plan.ledger_credit {
            append_system_in(txn, credit.clone()).await?;
        }
        let write = async {
            if let HarvestLink::Create(draft) = &plan.harvest_link {
                insert_pair(txn, draft.harvest.clone(), draft.sale.clone()).await?;
            }
            for harvest_id in &plan.retire_harvests {
                sales::Entity::delete_many()
                    .filter(sales::Column::HarvestId.eq(harvest_id.into_inner()))
                    .exec(txn)
                    .await?;
                harvests::Entity::delete_by_id(harvest_id.into_inner())
                    .exec(txn)
                    .await?;
            }
            if plan.collection_changed {
                settlement_update(&plan.collection)
                    .col_expr(
                        harvest_collections::Column::HarvestId,
                        Expr::value(plan.collection.harvest_id.map(HarvestId::into_inner)),
                    )
                    .exec(txn)
                    .await?;
            }
            Ok::<(), DbErr>(())
        };
        write.await.map_err(store_err)
    }
}

#[async_trait]
impl CollectionStore for SeaStore {
    async fn insert_collection(&self, collection: HarvestCollection) -> CashResult<()> {
        collection_model(collection)
            .insert(&self.db)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn collection(&self, id: CollectionId) -> CashResult<Option<HarvestCollection>> {
        harvest_collections::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_err)?
            .map(harvest_collections::Model::into_domain)
            .transpose()
    }

    async fn closed_collections(&self, scope: ProjectScope) -> CashResult<Vec<HarvestCollection>> {
        harvest_collections::Entity::find()
            .filter(harvest_collections::Column::CompanyId.eq(scope.company_id.into_inner()))
            .filter(harvest_collections::Column::ProjectId.eq(scope.project_id.into_inner()))
            .filter(harvest_collections::Column::Status.eq(CollectionStatus::Closed.as_str()))
            .order_by_asc(harvest_collections::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(store_err)?
            .into_iter()
            .map(harvest_collections::Model::into_domain)
            .collect()
    }

    async fn write_settlement_fields(&self, collection: &HarvestCollection) -> CashResult<()> {
        let result = settlement_update(collection)
            .exec(&self.db)
            .await
            .map_err(store_err)?;
        if result.rows_affected == 0 {
            return Err(CashError::CollectionNotFound(collection.id));
        }
        Ok(())
    }

    async fn update_collection_totals(
        &self,
        id: CollectionId,
        total_harvest_kg: Decimal,
        total_picker_cost: Decimal,
    ) -> CashResult<()> {
        let result = harvest_collections::Entity::update_many()
            .col_expr(
                harvest_collections::Column::TotalHarvestKg,
                Expr::value(total_harvest_kg),
            )
            .col_expr(
                harvest_collections::Column::TotalPickerCost,
                Expr::value(total_picker_cost),
            )
            .filter(harvest_collections::Column::Id.eq(id.into_inner()))
            .exec(&self.db)
            .await
            .map_err(store_err)?;
        if result.rows_affected == 0 {
            return Err(CashError::CollectionNotFound(id));
        }
        Ok(())
    }

    async fn transition_status(
        &self,
        id: CollectionId,
        from: CollectionStatus,
        to: CollectionStatus,
    ) -> CashResult<bool> {
        let result = harvest_collections::Entity::update_many()
            .col_expr(harvest_collections::Column::Status, Expr::value(to.as_str()))
            .filter(harvest_collections::Column::Id.eq(id.into_inner()))
            .filter(harvest_collections::Column::Status.eq(from.as_str()))
            .exec(&self.db)
            .await
            .map_err(store_err)?;
        if result.rows_affected == 1 {
            return Ok(true);
        }
        if self.collection_exists(id).await? {
            Ok(false)
        } else {
            Err(CashError::CollectionNotFound(id))
        }
    }

    async fn insert_picker(&self, picker: Picker) -> CashResult<()> {
        let collection_id = picker.collection_id;
        let picker_number = picker.picker_number;
        match picker_model(picker)?.insert(&self.db).await {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(CashError::DuplicatePickerNumber {
                collection_id,
                picker_number,
            }),
            Err(err) => Err(store_err(err)),
        }
    }

    async fn picker(&self, id: PickerId) -> CashResult<Option<Picker>> {
        pickers::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(store_err)?
            .map(pickers::Model::into_domain)
            .transpose()
    }

    async fn pickers(&self, collection_id: CollectionId) -> CashResult<Vec<Picker>> {
        load_pickers(&self.db, collection_id).await
    }

    async fn update_picker_totals(
        &self,
        id: PickerId,
        total_kg: Decimal,
        total_pay: Decimal,
    ) -> CashResult<()> {
        let result = pickers::Entity::update_many()
            .col_expr(pickers::Column::TotalKg, Expr::value(total_kg))
            .col_expr(pickers::Column::TotalPay, Expr::value(total_pay))
            .filter(pickers::Column::Id.eq(id.into_inner()))
            .exec(&self.db)
            .await
            .map_err(store_err)?;
        if result.rows_affected == 0 {
            return Err(CashError::PickerNotFound(id));
        }
        Ok(())
    }

    async fn insert_weigh_entry(&self, entry: WeighEntry) -> CashResult<()> {
        let txn = self.db.begin().await.map_err(store_err)?;
        let picker = pickers::Entity::find_by_id(entry.picker_id.into_inner())
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(store_err)?
            .ok_or(CashError::PickerNotFound(entry.picker_id))?;
        if picker.is_paid {
            txn.rollback().await.map_err(store_err)?;
            return Err(CashError::PickerAlreadyPaid(entry.picker_id));
        }

        weigh_entries::ActiveModel {
            id: Set(entry.id.into_inner()),
            company_id: Set(entry.company_id.into_inner()),
            picker_id: Set(entry.picker_id.into_inner()),
            collection_id: Set(entry.collection_id.into_inner()),
            weight_kg: Set(entry.weight_kg),
            trip_number: Set(to_db_int(entry.trip_number, "trip_number")?),
            recorded_at: Set(to_db_time(entry.recorded_at)),
        }
        .insert(&txn)
        .await
        .map_err(store_err)?;
        txn.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn weigh_entries(&self, collection_id: CollectionId) -> CashResult<Vec<WeighEntry>> {
        load_weigh_entries(&self.db, collection_id).await
    }

    async fn settle_atomically(
        &self,
        id: CollectionId,
        command: SettlementCommand,
        policy: &HarvestSalePolicy,
    ) -> CashResult<SettlementPlan> {
        let txn = self.db.begin().await.map_err(store_err)?;

        let collection = lock_collection(&txn, id).await?;
        let credit_recorded =
            has_key(&txn, collection.scope(), &buyer_payment_key(&collection)).await?;
        let snapshot = SettlementSnapshot {
            collection,
            pickers: load_pickers(&txn, id).await?,
            linked_harvests: load_harvests(&txn, id).await?,
            credit_recorded,
        };
        let plan = plan_settlement(&snapshot, &command, policy)?;
        if plan.is_noop() {
            txn.rollback().await.map_err(store_err)?;
            debug!(collection_id = %id, "Settlement had nothing to write");
            return Ok(plan);
        }

        Self::apply_settlement(&txn, &plan).await?;
        txn.commit().await.map_err(store_err)?;

        info!(
            collection_id = %id,
            status = %plan.collection.status,
            retired = plan.retire_harvests.len(),
            credited = plan.ledger_credit.is_some(),
            "Settlement committed"
        );
        Ok(plan)
    }

    async fn insert_harvest_sale(&self, harvest: HarvestRecord, sale: SaleRecord) -> CashResult<()> {
        insert_pair(&self.db, harvest, sale)
            .await
            .map_err(store_err)
    }

    async fn set_harvest_id(&self, id: CollectionId, harvest_id: HarvestId) -> CashResult<bool> {
        let result = harvest_collections::Entity::update_many()
            .col_expr(
                harvest_collections::Column::HarvestId,
                Expr::value(harvest_id.into_inner()),
            )
            .filter(harvest_collections::Column::Id.eq(id.into_inner()))
            .filter(harvest_collections::Column::HarvestId.is_null())
            .exec(&self.db)
            .await
            .map_err(store_err)?;
        if result.rows_affected == 1 {
            return Ok(true);
        }
        if self.collection_exists(id).await? {
            Ok(false)
        } else {
            Err(CashError::CollectionNotFound(id))
        }
    }

    async fn harvests_for_collection(&self, id: CollectionId) -> CashResult<Vec<HarvestRecord>> {
        load_harvests(&self.db, id).await
    }
}
