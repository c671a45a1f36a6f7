//! Ledger and wallet-metadata persistence.

use async_trait::async_trait;
use chrono::Utc;
use mavuno_core::ledger::{
    AppendOutcome, EntryType, LedgerEntry, NewLedgerEntry, RefType, WalletSummary,
};
use mavuno_core::scope::{Actor, ProjectScope};
use mavuno_core::store::LedgerStore;
use mavuno_core::wallet::{LegacyWallet, MigrationPlan, MigrationStats, WalletMeta};
use mavuno_core::{CashError, CashResult};
use mavuno_shared::types::{CompanyId, LedgerEntryId, ProjectId, UserId};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::{Map, Value};
use tracing::debug;

use super::store::{SeaStore, from_db_time, is_unique_violation, parse_column, store_err, to_db_time};
use crate::entities::{ledger_entries, legacy_wallets, wallet_meta};

impl ledger_entries::Model {
    fn into_domain(self) -> CashResult<LedgerEntry> {
        Ok(LedgerEntry {
            id: LedgerEntryId::from_uuid(self.id),
            company_id: CompanyId::from_uuid(self.company_id),
            project_id: ProjectId::from_uuid(self.project_id),
            entry_type: parse_column(&self.entry_type, "entry_type", EntryType::parse)?,
            amount: self.amount,
            reason: self.reason,
            ref_type: parse_column(&self.ref_type, "ref_type", RefType::parse)?,
            ref_id: self.ref_id,
            recorded_at: from_db_time(self.recorded_at),
            client_recorded_at: from_db_time(self.client_recorded_at),
            actor: Actor::new(UserId::from_uuid(self.actor_uid), self.actor_name),
            idempotency_key: self.idempotency_key,
            meta: match self.meta {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        })
    }
}

fn entry_model(entry: NewLedgerEntry) -> ledger_entries::ActiveModel {
    ledger_entries::ActiveModel {
        id: Set(entry.id.into_inner()),
        company_id: Set(entry.scope.company_id.into_inner()),
        project_id: Set(entry.scope.project_id.into_inner()),
        entry_type: Set(entry.input.entry_type.as_str().to_string()),
        amount: Set(entry.input.amount),
        reason: Set(entry.input.reason),
        ref_type: Set(entry.input.ref_type.as_str().to_string()),
        ref_id: Set(entry.input.ref_id),
        recorded_at: Set(to_db_time(Utc::now())),
        client_recorded_at: Set(to_db_time(entry.client_recorded_at)),
        actor_uid: Set(entry.actor.uid.into_inner()),
        actor_name: Set(entry.actor.name),
        idempotency_key: Set(entry.input.idempotency_key),
        meta: Set(Value::Object(entry.input.meta)),
    }
}

async fn find_by_key<C: ConnectionTrait>(
    conn: &C,
    scope: ProjectScope,
    key: &str,
) -> Result<Option<ledger_entries::Model>, DbErr> {
    ledger_entries::Entity::find()
        .filter(ledger_entries::Column::CompanyId.eq(scope.company_id.into_inner()))
        .filter(ledger_entries::Column::ProjectId.eq(scope.project_id.into_inner()))
        .filter(ledger_entries::Column::IdempotencyKey.eq(key))
        .one(conn)
        .await
}

/// Returns true if the project already has an entry under `key`.
pub(crate) async fn has_key<C: ConnectionTrait>(
    conn: &C,
    scope: ProjectScope,
    key: &str,
) -> CashResult<bool> {
    Ok(find_by_key(conn, scope, key).await.map_err(store_err)?.is_some())
}

enum Stored {
    Inserted(LedgerEntryId),
    Existing(ledger_entries::Model),
}

/// Inserts an entry, or returns the row already holding its key.
///
/// The insert runs in a savepoint so a key collision from a concurrent writer
/// leaves the outer transaction usable.
async fn insert_or_find(txn: &DatabaseTransaction, entry: NewLedgerEntry) -> Result<Stored, DbErr> {
    let scope = entry.scope;
    let key = entry.input.idempotency_key.clone();
    if let Some(key) = &key {
        if let Some(existing) = find_by_key(txn, scope, key).await? {
            return Ok(Stored::Existing(existing));
        }
    }

    let id = entry.id;
    let savepoint = txn.begin().await?;
    match entry_model(entry).insert(&savepoint).await {
        Ok(_) => {
            savepoint.commit().await?;
            Ok(Stored::Inserted(id))
        }
        Err(err) if is_unique_violation(&err) => {
            savepoint.rollback().await?;
            let existing = match &key {
                Some(key) => find_by_key(txn, scope, key).await?,
                None => None,
            };
            existing.map(Stored::Existing).ok_or(err)
        }
        Err(err) => Err(err),
    }
}

/// Appends a client entry inside an open transaction.
pub(crate) async fn append_in(
    txn: &DatabaseTransaction,
    entry: NewLedgerEntry,
) -> Result<AppendOutcome, DbErr> {
    Ok(match insert_or_find(txn, entry).await? {
        Stored::Inserted(id) => AppendOutcome::Appended(id),
        Stored::Existing(model) => AppendOutcome::Duplicate(LedgerEntryId::from_uuid(model.id)),
    })
}

/// Appends a system entry inside an open transaction.
///
/// A row already holding the key must record the same movement; anything
/// else fails the unit so the caller's transaction rolls back.
pub(crate) async fn append_system_in(
    txn: &DatabaseTransaction,
    entry: NewLedgerEntry,
) -> CashResult<AppendOutcome> {
    let expected = entry.clone();
    match insert_or_find(txn, entry).await.map_err(store_err)? {
        Stored::Inserted(id) => Ok(AppendOutcome::Appended(id)),
        Stored::Existing(model) => {
            let existing = model.into_domain()?;
            expected.check_replay_of(&existing)?;
            Ok(AppendOutcome::Duplicate(existing.id))
        }
    }
}

/// Loads a project's entries in client-timestamp order.
pub(crate) async fn load_entries<C: ConnectionTrait>(
    conn: &C,
    scope: ProjectScope,
) -> CashResult<Vec<LedgerEntry>> {
    ledger_entries::Entity::find()
        .filter(ledger_entries::Column::CompanyId.eq(scope.company_id.into_inner()))
        .filter(ledger_entries::Column::ProjectId.eq(scope.project_id.into_inner()))
        .order_by_asc(ledger_entries::Column::ClientRecordedAt)
        .order_by_asc(ledger_entries::Column::Id)
        .all(conn)
        .await
        .map_err(store_err)?
        .into_iter()
        .map(ledger_entries::Model::into_domain)
        .collect()
}

/// Reads the wallet balance inside `txn`, locking the project's wallet row.
pub(crate) async fn locked_balance(
    txn: &DatabaseTransaction,
    scope: ProjectScope,
) -> CashResult<Decimal> {
    wallet_meta::Entity::find_by_id((
        scope.company_id.into_inner(),
        scope.project_id.into_inner(),
    ))
    .lock_exclusive()
    .one(txn)
    .await
    .map_err(store_err)?;

    let entries = load_entries(txn, scope).await?;
    Ok(WalletSummary::fold(&entries).balance)
}

impl wallet_meta::Model {
    fn into_domain(self) -> CashResult<WalletMeta> {
        let stats = self
            .stats
            .map(serde_json::from_value::<MigrationStats>)
            .transpose()
            .map_err(|e| CashError::Store(format!("invalid wallet stats: {e}")))?;
        Ok(WalletMeta {
            company_id: CompanyId::from_uuid(self.company_id),
            project_id: ProjectId::from_uuid(self.project_id),
            migrated: self.migrated,
            migrated_at: self.migrated_at.map(from_db_time),
            stats,
        })
    }
}

fn meta_model(meta: &WalletMeta) -> CashResult<wallet_meta::ActiveModel> {
    let stats = meta
        .stats
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| CashError::Store(format!("invalid wallet stats: {e}")))?;
    Ok(wallet_meta::ActiveModel {
        company_id: Set(meta.company_id.into_inner()),
        project_id: Set(meta.project_id.into_inner()),
        migrated: Set(meta.migrated),
        migrated_at: Set(meta.migrated_at.map(to_db_time)),
        stats: Set(stats),
    })
}

impl From<legacy_wallets::Model> for LegacyWallet {
    fn from(model: legacy_wallets::Model) -> Self {
        Self {
            company_id: CompanyId::from_uuid(model.company_id),
            project_id: ProjectId::from_uuid(model.project_id),
            cash_received: model.cash_received,
            cash_paid_out: model.cash_paid_out,
            updated_at: from_db_time(model.updated_at),
        }
    }
}

#[async_trait]
impl LedgerStore for SeaStore {
    async fn append_entry(&self, entry: NewLedgerEntry) -> CashResult<AppendOutcome> {
        let txn = self.db.begin().await.map_err(store_err)?;
        let outcome = append_in(&txn, entry).await.map_err(store_err)?;
        txn.commit().await.map_err(store_err)?;
        Ok(outcome)
    }

    async fn list_entries(&self, scope: ProjectScope) -> CashResult<Vec<LedgerEntry>> {
        load_entries(&self.db, scope).await
    }

    async fn has_entries(&self, scope: ProjectScope) -> CashResult<bool> {
        let first = ledger_entries::Entity::find()
            .filter(ledger_entries::Column::CompanyId.eq(scope.company_id.into_inner()))
            .filter(ledger_entries::Column::ProjectId.eq(scope.project_id.into_inner()))
            .limit(1)
            .one(&self.db)
            .await
            .map_err(store_err)?;
        Ok(first.is_some())
    }

    async fn wallet_meta(&self, scope: ProjectScope) -> CashResult<Option<WalletMeta>> {
        wallet_meta::Entity::find_by_id((
            scope.company_id.into_inner(),
            scope.project_id.into_inner(),
        ))
        .one(&self.db)
        .await
        .map_err(store_err)?
        .map(wallet_meta::Model::into_domain)
        .transpose()
    }

    async fn legacy_wallets(&self, scope: ProjectScope) -> CashResult<Vec<LegacyWallet>> {
        let wallets = legacy_wallets::Entity::find()
            .filter(legacy_wallets::Column::CompanyId.eq(scope.company_id.into_inner()))
            .filter(legacy_wallets::Column::ProjectId.eq(scope.project_id.into_inner()))
            .all(&self.db)
            .await
            .map_err(store_err)?;
        Ok(wallets.into_iter().map(LegacyWallet::from).collect())
    }

    async fn commit_migration(&self, plan: MigrationPlan) -> CashResult<bool> {
        let scope = plan.meta.scope();
        let txn = self.db.begin().await.map_err(store_err)?;

        let existing = wallet_meta::Entity::find_by_id((
            scope.company_id.into_inner(),
            scope.project_id.into_inner(),
        ))
        .lock_exclusive()
        .one(&txn)
        .await
        .map_err(store_err)?;

        match existing {
            Some(meta) if meta.migrated => {
                txn.rollback().await.map_err(store_err)?;
                debug!(scope = %scope, "Wallet already migrated");
                return Ok(false);
            }
            Some(_) => {
                meta_model(&plan.meta)?
                    .update(&txn)
                    .await
                    .map_err(store_err)?;
            }
            None => match meta_model(&plan.meta)?.insert(&txn).await {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    // Another writer inserted the row first and holds the win.
                    txn.rollback().await.map_err(store_err)?;
                    return Ok(false);
                }
                Err(err) => return Err(store_err(err)),
            },
        }

        let entries = plan.entries.len();
        for entry in plan.entries {
            append_system_in(&txn, entry).await?;
        }
        txn.commit().await.map_err(store_err)?;

        debug!(scope = %scope, entries, "Migration entries stored");
        Ok(true)
    }
}
