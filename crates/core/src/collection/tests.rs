//! Collection service tests against the in-memory store.

use chrono::{NaiveDate, Utc};
use mavuno_shared::types::{CompanyId, ProjectId, UserId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use super::cache::CollectionCache;
use super::service::{CollectionService, SyncAction};
use super::settlement::HarvestSalePolicy;
use super::types::{CollectionStatus, HarvestCollection, HarvestSaleDraft, NewCollection, Picker};
use crate::error::CashError;
use crate::ledger::{EntryType, LedgerService, RefType, WalletProjection};
use crate::payout::PayoutFunding;
use crate::scope::{Actor, ProjectScope};
use crate::store::{CollectionStore, MemoryStore, PayoutStore};

struct Fixture {
    store: Arc<MemoryStore>,
    ledger: LedgerService<MemoryStore>,
    service: CollectionService<MemoryStore>,
    scope: ProjectScope,
    actor: Actor,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let ledger = LedgerService::new(Arc::clone(&store), WalletProjection::new());
    let service = CollectionService::new(
        Arc::clone(&store),
        ledger.clone(),
        CollectionCache::new(),
        HarvestSalePolicy::new(["french_beans", "tomatoes"]),
    );
    Fixture {
        store,
        ledger,
        service,
        scope: ProjectScope::new(CompanyId::new(), ProjectId::new()),
        actor: Actor::new(UserId::new(), "Farm Manager"),
    }
}

impl Fixture {
    async fn open(&self, crop: &str, rate: Decimal) -> HarvestCollection {
        self.service
            .open_collection(
                self.scope,
                &self.actor,
                NewCollection {
                    crop_type: crop.to_string(),
                    name: "Block C".to_string(),
                    harvest_date: NaiveDate::from_ymd_opt(2026, 10, 14).unwrap(),
                    price_per_kg_picker: rate,
                },
            )
            .await
            .unwrap()
    }

    async fn picker(&self, collection: &HarvestCollection, number: u32) -> Picker {
        self.service
            .register_picker(self.scope.company_id, collection.id, number, &format!("Picker {number}"))
            .await
            .unwrap()
    }

    async fn weigh(&self, picker: &Picker, kg: Decimal, trip: u32) {
        self.service
            .record_weigh_entry(self.scope.company_id, picker.id, kg, trip)
            .await
            .unwrap();
    }

    async fn pay_in_cash(&self, picker: &Picker) {
        self.store
            .mark_picker_paid(picker.id, Utc::now(), PayoutFunding::ExternallyFunded)
            .await
            .unwrap();
    }

    /// A french-beans collection with one paid picker, 100 kg at 120/kg.
    async fn ready_to_close(&self) -> HarvestCollection {
        let collection = self.open("french_beans", dec!(120)).await;
        let picker = self.picker(&collection, 1).await;
        self.weigh(&picker, dec!(60), 1).await;
        self.weigh(&picker, dec!(40), 2).await;
        self.pay_in_cash(&picker).await;
        collection
    }
}

#[tokio::test]
async fn test_weigh_entries_update_totals() {
    let f = fixture();
    let collection = f.open("french_beans", dec!(140)).await;
    let picker = f.picker(&collection, 1).await;

    f.weigh(&picker, dec!(5), 1).await;
    let receipt = f
        .service
        .record_weigh_entry(f.scope.company_id, picker.id, dec!(3), 2)
        .await
        .unwrap();

    let totals = receipt.totals.picker(picker.id).unwrap();
    assert_eq!(totals.total_kg, dec!(8));
    assert_eq!(totals.total_pay, dec!(1120));

    let detail = f.service.detail(f.scope.company_id, collection.id).await.unwrap();
    assert_eq!(detail.collection.total_harvest_kg, dec!(8));
    assert_eq!(detail.collection.total_picker_cost, dec!(1120));
    assert_eq!(detail.pickers[0].total_pay, dec!(1120));
}

#[tokio::test]
async fn test_non_positive_weight_rejected() {
    let f = fixture();
    let collection = f.open("french_beans", dec!(140)).await;
    let picker = f.picker(&collection, 1).await;

    let result = f
        .service
        .record_weigh_entry(f.scope.company_id, picker.id, dec!(0), 1)
        .await;

    assert!(matches!(result, Err(CashError::NonPositiveWeight(_))));
}

#[tokio::test]
async fn test_duplicate_picker_number_rejected() {
    let f = fixture();
    let collection = f.open("french_beans", dec!(140)).await;
    f.picker(&collection, 4).await;

    let result = f
        .service
        .register_picker(f.scope.company_id, collection.id, 4, "Someone Else")
        .await;

    assert!(matches!(
        result,
        Err(CashError::DuplicatePickerNumber { picker_number: 4, .. })
    ));
}

#[tokio::test]
async fn test_weighing_stops_once_sold() {
    let f = fixture();
    let collection = f.open("french_beans", dec!(140)).await;
    let picker = f.picker(&collection, 1).await;
    f.weigh(&picker, dec!(10), 1).await;
    f.service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(200), false, &f.actor)
        .await
        .unwrap();

    let result = f
        .service
        .record_weigh_entry(f.scope.company_id, picker.id, dec!(1), 2)
        .await;

    assert!(matches!(
        result,
        Err(CashError::CollectionNotCollecting {
            status: CollectionStatus::Sold,
            ..
        })
    ));
}

#[tokio::test]
async fn test_price_without_payment_marks_sold() {
    let f = fixture();
    let collection = f.ready_to_close().await;

    let outcome = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), false, &f.actor)
        .await
        .unwrap();

    assert_eq!(outcome.collection.status, CollectionStatus::Sold);
    assert_eq!(outcome.collection.total_revenue, Some(dec!(18000)));
    assert_eq!(outcome.collection.profit, Some(dec!(6000)));
    assert!(!outcome.credited);
    assert!(outcome.created_harvest.is_none());
}

#[tokio::test]
async fn test_close_with_unpaid_picker_writes_nothing() {
    let f = fixture();
    let collection = f.open("french_beans", dec!(120)).await;
    let paid = f.picker(&collection, 1).await;
    let unpaid = f.picker(&collection, 2).await;
    f.weigh(&paid, dec!(10), 1).await;
    f.weigh(&unpaid, dec!(10), 1).await;
    f.pay_in_cash(&paid).await;
    f.ledger.summary(f.scope, &f.actor).await.unwrap();
    let writes_before = f.store.write_count();

    let result = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), true, &f.actor)
        .await;

    assert!(matches!(result, Err(CashError::UnpaidPickers { unpaid: 1, .. })));
    assert_eq!(f.store.write_count(), writes_before);
    let stored = f.service.collection(f.scope.company_id, collection.id).await.unwrap();
    assert_eq!(stored.status, CollectionStatus::Collecting);
    assert!(stored.total_revenue.is_none());
}

#[tokio::test]
async fn test_close_creates_one_harvest_sale_and_credit() {
    let f = fixture();
    let collection = f.ready_to_close().await;

    let outcome = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), true, &f.actor)
        .await
        .unwrap();

    assert!(!outcome.degraded);
    assert!(outcome.credited);
    assert_eq!(outcome.collection.status, CollectionStatus::Closed);
    let harvest_id = outcome.created_harvest.unwrap();
    assert_eq!(outcome.collection.harvest_id, Some(harvest_id));

    let harvests = f.store.harvests_for_collection(collection.id).await.unwrap();
    assert_eq!(harvests.len(), 1);
    assert_eq!(harvests[0].quantity_kg, dec!(100));
    let sales = f.store.sales_for(collection.id).await;
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].harvest_id, harvest_id);
    assert_eq!(sales[0].total_amount, dec!(18000));

    let entries = f.ledger.entries(f.scope, &f.actor).await.unwrap();
    let credit = entries
        .iter()
        .find(|e| e.ref_type == RefType::Collection)
        .unwrap();
    assert_eq!(credit.entry_type, EntryType::Credit);
    assert_eq!(credit.amount, dec!(18000));
    assert_eq!(f.ledger.summary(f.scope, &f.actor).await.unwrap().balance, dec!(18000));
}

#[tokio::test]
async fn test_second_close_creates_nothing() {
    let f = fixture();
    let collection = f.ready_to_close().await;
    let first = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), true, &f.actor)
        .await
        .unwrap();

    let second = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), true, &f.actor)
        .await
        .unwrap();

    assert!(second.created_harvest.is_none());
    assert!(!second.credited);
    assert_eq!(second.collection.harvest_id, first.collection.harvest_id);
    assert_eq!(f.store.harvests_for_collection(collection.id).await.unwrap().len(), 1);
    assert_eq!(f.store.sales_for(collection.id).await.len(), 1);
    assert_eq!(f.store.entries_for(f.scope).await.len(), 1);
}

#[tokio::test]
async fn test_pricing_closed_collection_is_invalid() {
    let f = fixture();
    let collection = f.ready_to_close().await;
    f.service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), true, &f.actor)
        .await
        .unwrap();

    let result = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(200), false, &f.actor)
        .await;

    assert!(matches!(result, Err(CashError::InvalidTransition { .. })));
}

#[tokio::test]
async fn test_non_participating_crop_closes_without_harvest() {
    let f = fixture();
    let collection = f.open("avocado", dec!(20)).await;
    let picker = f.picker(&collection, 1).await;
    f.weigh(&picker, dec!(50), 1).await;
    f.pay_in_cash(&picker).await;

    let outcome = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(60), true, &f.actor)
        .await
        .unwrap();

    assert_eq!(outcome.collection.status, CollectionStatus::Closed);
    assert!(outcome.collection.harvest_id.is_none());
    assert!(f.store.harvests_for_collection(collection.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_offline_close_then_sync_leaves_one_pair() {
    let f = fixture();
    let collection = f.ready_to_close().await;
    // Migrate while transactions still work so the offline credit is allowed.
    f.ledger.summary(f.scope, &f.actor).await.unwrap();
    f.store.set_transactions_available(false);

    let outcome = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), true, &f.actor)
        .await
        .unwrap();

    assert!(outcome.degraded);
    assert!(outcome.credited);
    let linked = outcome.created_harvest.unwrap();
    let stored = f.store.collection(collection.id).await.unwrap().unwrap();
    assert_eq!(stored.status, CollectionStatus::Closed);
    assert_eq!(stored.total_revenue, Some(dec!(18000)));
    assert_eq!(stored.harvest_id, Some(linked));

    // A second device closed the same collection offline before it saw the link.
    let mut stale = stored.clone();
    stale.harvest_id = None;
    let duplicate = HarvestSaleDraft::from_collection(&stale, UserId::new(), Utc::now());
    f.store
        .seed_harvest_sale(duplicate.harvest, duplicate.sale)
        .await;
    assert_eq!(f.store.harvests_for_collection(collection.id).await.unwrap().len(), 2);

    f.store.set_transactions_available(true);
    let report = f.service.sync_all(f.scope, &f.actor).await.unwrap();

    assert!(report.failed.is_empty());
    assert_eq!(report.synced.len(), 1);
    assert_eq!(report.synced[0].action, SyncAction::Unchanged);
    assert_eq!(report.synced[0].retired, 1);
    let harvests = f.store.harvests_for_collection(collection.id).await.unwrap();
    assert_eq!(harvests.len(), 1);
    assert_eq!(harvests[0].id, linked);
    assert_eq!(f.store.sales_for(collection.id).await.len(), 1);
}

#[tokio::test]
async fn test_sync_adopts_harvest_whose_link_was_lost() {
    let f = fixture();
    let collection = f.ready_to_close().await;
    f.service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), false, &f.actor)
        .await
        .unwrap();

    // Offline close wrote the fields and the harvest, but the link write was lost.
    let mut closed = f.store.collection(collection.id).await.unwrap().unwrap();
    closed.status = CollectionStatus::Closed;
    closed.buyer_paid_at = Some(Utc::now());
    f.store.write_settlement_fields(&closed).await.unwrap();
    let orphan = HarvestSaleDraft::from_collection(&closed, UserId::new(), Utc::now());
    let orphan_id = orphan.harvest.id;
    f.store.seed_harvest_sale(orphan.harvest, orphan.sale).await;

    let outcome = f
        .service
        .sync_closed_collection_to_harvest_sale(f.scope.company_id, collection.id, &f.actor)
        .await
        .unwrap();

    assert_eq!(outcome.action, SyncAction::Adopted(orphan_id));
    assert_eq!(outcome.retired, 0);
    let linked = f.store.collection(collection.id).await.unwrap().unwrap();
    assert_eq!(linked.harvest_id, Some(orphan_id));
    assert_eq!(f.store.harvests_for_collection(collection.id).await.unwrap().len(), 1);
    assert_eq!(f.store.sales_for(collection.id).await.len(), 1);
}

#[tokio::test]
async fn test_offline_close_without_migration_skips_credit() {
    let f = fixture();
    let collection = f.ready_to_close().await;
    f.store.set_transactions_available(false);

    let outcome = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), true, &f.actor)
        .await
        .unwrap();

    assert!(outcome.degraded);
    assert!(!outcome.credited);
    assert_eq!(outcome.collection.status, CollectionStatus::Closed);
    assert!(f.store.entries_for(f.scope).await.is_empty());
}

#[tokio::test]
async fn test_offline_close_still_requires_paid_pickers() {
    let f = fixture();
    let collection = f.open("french_beans", dec!(120)).await;
    let picker = f.picker(&collection, 1).await;
    f.weigh(&picker, dec!(10), 1).await;
    f.store.set_transactions_available(false);

    let result = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), true, &f.actor)
        .await;

    assert!(matches!(result, Err(CashError::UnpaidPickers { .. })));
    let stored = f.store.collection(collection.id).await.unwrap().unwrap();
    assert_eq!(stored.status, CollectionStatus::Collecting);
}

#[tokio::test]
async fn test_other_company_cannot_see_collection() {
    let f = fixture();
    let collection = f.open("french_beans", dec!(120)).await;

    let result = f.service.collection(CompanyId::new(), collection.id).await;

    assert!(matches!(result, Err(CashError::CollectionNotFound(id)) if id == collection.id));
}

#[tokio::test]
async fn test_recalculate_repairs_cached_rollups() {
    let f = fixture();
    let collection = f.open("tomatoes", dec!(50)).await;
    let picker = f.picker(&collection, 1).await;
    f.weigh(&picker, dec!(12), 1).await;
    f.store
        .update_picker_totals(picker.id, dec!(999), dec!(1))
        .await
        .unwrap();
    f.store
        .update_collection_totals(collection.id, dec!(0), dec!(0))
        .await
        .unwrap();

    let totals = f
        .service
        .recalculate_totals(f.scope.company_id, collection.id)
        .await
        .unwrap();

    assert_eq!(totals.total_harvest_kg, dec!(12));
    assert_eq!(totals.total_picker_cost, dec!(600));
    let repaired = f.store.picker(picker.id).await.unwrap().unwrap();
    assert_eq!(repaired.total_kg, dec!(12));
    assert_eq!(repaired.total_pay, dec!(600));
}

#[tokio::test]
async fn test_payout_complete_lifecycle() {
    let f = fixture();
    let collection = f.open("french_beans", dec!(120)).await;

    let empty = f
        .service
        .mark_payout_complete(f.scope.company_id, collection.id)
        .await;
    assert!(matches!(empty, Err(CashError::NoPickers(_))));

    let picker = f.picker(&collection, 1).await;
    f.weigh(&picker, dec!(5), 1).await;
    let unpaid = f
        .service
        .mark_payout_complete(f.scope.company_id, collection.id)
        .await;
    assert!(matches!(unpaid, Err(CashError::UnpaidPickers { .. })));

    f.pay_in_cash(&picker).await;
    let done = f
        .service
        .mark_payout_complete(f.scope.company_id, collection.id)
        .await
        .unwrap();
    assert_eq!(done.status, CollectionStatus::PayoutComplete);

    let again = f
        .service
        .mark_payout_complete(f.scope.company_id, collection.id)
        .await
        .unwrap();
    assert_eq!(again.status, CollectionStatus::PayoutComplete);

    // payout_complete does not gate settlement
    let closed = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(150), true, &f.actor)
        .await
        .unwrap();
    assert_eq!(closed.collection.status, CollectionStatus::Closed);
}

#[tokio::test]
async fn test_open_collection_validates_input() {
    let f = fixture();

    let result = f
        .service
        .open_collection(
            f.scope,
            &f.actor,
            NewCollection {
                crop_type: "french_beans".to_string(),
                name: "  ".to_string(),
                harvest_date: NaiveDate::from_ymd_opt(2026, 10, 14).unwrap(),
                price_per_kg_picker: dec!(100),
            },
        )
        .await;
    assert!(matches!(result, Err(CashError::EmptyField("name"))));

    let result = f
        .service
        .open_collection(
            f.scope,
            &f.actor,
            NewCollection {
                crop_type: "french_beans".to_string(),
                name: "Block D".to_string(),
                harvest_date: NaiveDate::from_ymd_opt(2026, 10, 14).unwrap(),
                price_per_kg_picker: dec!(0),
            },
        )
        .await;
    assert!(matches!(result, Err(CashError::NonPositivePrice(_))));
}

#[tokio::test]
async fn test_sweep_records_credit_skipped_by_offline_close() {
    let f = fixture();
    let collection = f.ready_to_close().await;
    f.store.set_transactions_available(false);
    let offline = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), true, &f.actor)
        .await
        .unwrap();
    assert!(!offline.credited);
    f.store.set_transactions_available(true);

    let report = f.service.sync_all(f.scope, &f.actor).await.unwrap();

    assert!(report.failed.is_empty());
    assert!(report.synced[0].credited);
    assert_eq!(f.ledger.summary(f.scope, &f.actor).await.unwrap().received, dec!(18000));

    let again = f.service.sync_all(f.scope, &f.actor).await.unwrap();
    assert!(!again.synced[0].credited);
    let credits: Vec<_> = f
        .store
        .entries_for(f.scope)
        .await
        .into_iter()
        .filter(|e| e.ref_type == RefType::Collection)
        .collect();
    assert_eq!(credits.len(), 1);
    assert_eq!(credits[0].amount, dec!(18000));
}

#[tokio::test]
async fn test_online_reclose_records_missing_credit() {
    let f = fixture();
    let collection = f.ready_to_close().await;
    f.store.set_transactions_available(false);
    f.service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), true, &f.actor)
        .await
        .unwrap();
    f.store.set_transactions_available(true);

    let retry = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), true, &f.actor)
        .await
        .unwrap();
    let repeat = f
        .service
        .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, dec!(180), true, &f.actor)
        .await
        .unwrap();

    assert!(!retry.degraded);
    assert!(retry.credited);
    assert!(!repeat.credited);
    let summary = f.ledger.fresh_summary(f.scope, &f.actor).await.unwrap();
    assert_eq!(summary.received, dec!(18000));
    assert_eq!(summary.balance, dec!(18000));
}

#[tokio::test]
async fn test_unstorable_price_is_rejected_without_writes() {
    let f = fixture();
    let collection = f.ready_to_close().await;
    f.ledger.summary(f.scope, &f.actor).await.unwrap();
    let writes_before = f.store.write_count();

    for price in [dec!(70000000000000000000000000000), dec!(1000000000000000)] {
        let result = f
            .service
            .set_buyer_price_and_maybe_close(f.scope.company_id, collection.id, price, false, &f.actor)
            .await;
        assert!(matches!(result, Err(CashError::AmountOutOfRange("price_per_kg_buyer"))));
    }
    // In range on its own, but 100 kg at this price overflows the revenue column.
    let result = f
        .service
        .set_buyer_price_and_maybe_close(
            f.scope.company_id,
            collection.id,
            dec!(100000000000000),
            false,
            &f.actor,
        )
        .await;
    assert!(matches!(result, Err(CashError::AmountOutOfRange("total_revenue"))));

    assert_eq!(f.store.write_count(), writes_before);
    let stored = f.store.collection(collection.id).await.unwrap().unwrap();
    assert_eq!(stored.status, CollectionStatus::Collecting);
    assert!(stored.total_revenue.is_none());
}

#[tokio::test]
async fn test_unstorable_weight_is_rejected_without_writes() {
    let f = fixture();
    let collection = f.open("french_beans", dec!(1)).await;
    let picker = f.picker(&collection, 1).await;
    f.weigh(&picker, dec!(900000000000000), 1).await;

    let too_heavy = f
        .service
        .record_weigh_entry(f.scope.company_id, picker.id, dec!(1000000000000000), 2)
        .await;
    let sum_too_heavy = f
        .service
        .record_weigh_entry(f.scope.company_id, picker.id, dec!(200000000000000), 2)
        .await;

    assert!(matches!(too_heavy, Err(CashError::AmountOutOfRange("weight_kg"))));
    assert!(matches!(sum_too_heavy, Err(CashError::AmountOutOfRange("total_kg"))));
    assert_eq!(f.store.weigh_entries(collection.id).await.unwrap().len(), 1);
}
