//! Ledger service.
//!
//! Appends cash movements and serves wallet summaries through the
//! write-through projection. Every operation runs the migration guard first.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use super::entry::{AppendOutcome, LedgerEntry, LedgerEntryInput, NewLedgerEntry, is_reserved_key};
use super::projection::WalletProjection;
use super::summary::WalletSummary;
use crate::error::{CashError, CashResult};
use crate::scope::{Actor, ProjectScope};
use crate::store::LedgerStore;
use crate::wallet::{MigrationCoordinator, MigrationOutcome};

/// Ledger operations for one store.
pub struct LedgerService<S: ?Sized> {
    store: Arc<S>,
    migration: MigrationCoordinator<S>,
    projection: WalletProjection,
}

impl<S: ?Sized> Clone for LedgerService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            migration: self.migration.clone(),
            projection: self.projection.clone(),
        }
    }
}

impl<S: LedgerStore + ?Sized> LedgerService<S> {
    /// Creates a ledger service.
    #[must_use]
    pub fn new(store: Arc<S>, projection: WalletProjection) -> Self {
        Self {
            migration: MigrationCoordinator::new(Arc::clone(&store)),
            store,
            projection,
        }
    }

    /// The wallet projection.
    #[must_use]
    pub fn projection(&self) -> &WalletProjection {
        &self.projection
    }

    /// Runs the migration guard for a project.
    ///
    /// # Errors
    ///
    /// Propagates validation and store errors.
    pub async fn ensure_migrated(
        &self,
        scope: ProjectScope,
        actor: &Actor,
    ) -> CashResult<MigrationOutcome> {
        let outcome = self.migration.ensure_migrated(scope, actor).await?;
        if let MigrationOutcome::Migrated(stats) = &outcome {
            if stats.entries_created > 0 {
                self.projection.invalidate(&scope);
            }
        }
        Ok(outcome)
    }

    /// Appends a cash movement.
    ///
    /// The entry is applied to the projection before the durable write is
    /// awaited. A rejected write, or a key that turns out to exist already,
    /// invalidates the project's projection.
    ///
    /// # Errors
    ///
    /// - `NonPositiveAmount` / `MissingScope` for invalid input
    /// - `ReservedIdempotencyKey` for keys in the system namespace
    /// - store errors from the migration guard or the write
    pub async fn append(
        &self,
        scope: ProjectScope,
        actor: &Actor,
        input: LedgerEntryInput,
    ) -> CashResult<AppendOutcome> {
        if let Some(key) = input.idempotency_key.as_deref().filter(|k| is_reserved_key(k)) {
            return Err(CashError::ReservedIdempotencyKey(key.to_string()));
        }
        let entry = NewLedgerEntry::build(scope, actor.clone(), input, Utc::now())?;
        self.ensure_migrated(scope, actor).await?;

        self.projection
            .apply_optimistic(&entry.clone().into_recorded(entry.client_recorded_at));

        match self.store.append_entry(entry).await {
            Ok(outcome) => {
                if outcome.is_duplicate() {
                    debug!(scope = %scope, entry_id = %outcome.id(), "Duplicate idempotency key, nothing written");
                    self.projection.invalidate(&scope);
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "Ledger append rejected, dropping projection");
                self.projection.invalidate(&scope);
                Err(e)
            }
        }
    }

    /// Lists a project's entries ordered by client timestamp.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn entries(&self, scope: ProjectScope, actor: &Actor) -> CashResult<Vec<LedgerEntry>> {
        self.ensure_migrated(scope, actor).await?;
        let mut entries = match self.projection.get(&scope) {
            Some(cached) => cached.as_ref().clone(),
            None => self.load(scope).await?,
        };
        entries.sort_by(|a, b| {
            a.client_recorded_at
                .cmp(&b.client_recorded_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(entries)
    }

    /// Returns the project's summary, served from the projection when cached.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn summary(&self, scope: ProjectScope, actor: &Actor) -> CashResult<WalletSummary> {
        self.ensure_migrated(scope, actor).await?;
        if let Some(summary) = self.projection.summary(&scope) {
            return Ok(summary);
        }
        let entries = self.load(scope).await?;
        Ok(WalletSummary::fold(&entries))
    }

    /// Returns the project's summary read straight from the store.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn fresh_summary(&self, scope: ProjectScope, actor: &Actor) -> CashResult<WalletSummary> {
        self.ensure_migrated(scope, actor).await?;
        let entries = self.load(scope).await?;
        Ok(WalletSummary::fold(&entries))
    }

    async fn load(&self, scope: ProjectScope) -> CashResult<Vec<LedgerEntry>> {
        let entries = self.store.list_entries(scope).await?;
        self.projection.put(scope, entries.clone());
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::RefType;
    use crate::store::MemoryStore;
    use crate::wallet::LegacyWallet;
    use mavuno_shared::types::{CompanyId, ProjectId, UserId};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<MemoryStore>, LedgerService<MemoryStore>, ProjectScope, Actor) {
        let store = Arc::new(MemoryStore::new());
        let service = LedgerService::new(Arc::clone(&store), WalletProjection::new());
        let scope = ProjectScope::new(CompanyId::new(), ProjectId::new());
        (store, service, scope, Actor::new(UserId::new(), "Otieno"))
    }

    #[tokio::test]
    async fn test_credit_then_debit_nets_zero() {
        let (_, service, scope, actor) = setup();

        service
            .append(scope, &actor, LedgerEntryInput::credit(dec!(2500), "sale"))
            .await
            .unwrap();
        service
            .append(scope, &actor, LedgerEntryInput::debit(dec!(2500), "pickers"))
            .await
            .unwrap();

        let summary = service.summary(scope, &actor).await.unwrap();
        assert_eq!(summary.received, dec!(2500));
        assert_eq!(summary.paid_out, dec!(2500));
        assert_eq!(summary.balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_duplicate_key_writes_once() {
        let (store, service, scope, actor) = setup();
        let input = LedgerEntryInput::credit(dec!(100), "sale").with_idempotency_key("receipt-17");

        let first = service.append(scope, &actor, input.clone()).await.unwrap();
        let second = service.append(scope, &actor, input).await.unwrap();

        assert!(!first.is_duplicate());
        assert_eq!(second, AppendOutcome::Duplicate(first.id()));
        assert_eq!(store.entries_for(scope).await.len(), 1);
        assert_eq!(service.summary(scope, &actor).await.unwrap().received, dec!(100));
    }

    #[tokio::test]
    async fn test_system_key_prefixes_are_refused() {
        let (store, service, scope, actor) = setup();

        for key in ["batch:3f2a", "collection:9c1d:buyer-payment", "migration:x:credit"] {
            let input = LedgerEntryInput::credit(dec!(1), "float").with_idempotency_key(key);
            let result = service.append(scope, &actor, input).await;
            assert!(matches!(result, Err(CashError::ReservedIdempotencyKey(k)) if k == key));
        }
        assert!(store.entries_for(scope).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_amount_writes_nothing() {
        let (store, service, scope, actor) = setup();

        let result = service
            .append(scope, &actor, LedgerEntryInput::debit(dec!(0), "nothing"))
            .await;

        assert!(matches!(result, Err(CashError::NonPositiveAmount(_))));
        assert!(store.entries_for(scope).await.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_write_drops_projection() {
        let (store, service, scope, actor) = setup();
        service
            .append(scope, &actor, LedgerEntryInput::credit(dec!(300), "sale"))
            .await
            .unwrap();
        assert_eq!(service.summary(scope, &actor).await.unwrap().balance, dec!(300));

        store.set_available(false);
        let result = service
            .append(scope, &actor, LedgerEntryInput::credit(dec!(50), "sale"))
            .await;
        assert!(matches!(result, Err(CashError::StoreUnavailable(_))));
        store.set_available(true);

        assert!(service.projection().get(&scope).is_none());
        assert_eq!(service.summary(scope, &actor).await.unwrap().balance, dec!(300));
    }

    #[tokio::test]
    async fn test_first_use_migrates_legacy_wallet() {
        let (store, service, scope, actor) = setup();
        store
            .seed_legacy_wallet(LegacyWallet {
                company_id: scope.company_id,
                project_id: scope.project_id,
                cash_received: dec!(40000),
                cash_paid_out: dec!(15000),
                updated_at: Utc::now(),
            })
            .await;

        let summary = service.summary(scope, &actor).await.unwrap();

        assert_eq!(summary.received, dec!(40000));
        assert_eq!(summary.paid_out, dec!(15000));
        assert_eq!(summary.balance, dec!(25000));
        let entries = service.entries(scope, &actor).await.unwrap();
        assert!(entries.iter().all(|e| e.ref_type == RefType::Adjustment));
    }

    #[tokio::test]
    async fn test_fresh_summary_sees_writes_from_other_services() {
        let (store, service, scope, actor) = setup();
        service.summary(scope, &actor).await.unwrap();

        let other = LedgerService::new(Arc::clone(&store), WalletProjection::new());
        other
            .append(scope, &actor, LedgerEntryInput::credit(dec!(75), "sale"))
            .await
            .unwrap();

        assert_eq!(service.fresh_summary(scope, &actor).await.unwrap().balance, dec!(75));
    }
}
