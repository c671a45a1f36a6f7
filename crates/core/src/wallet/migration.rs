//! One-time migration from the legacy aggregate wallet to the ledger.

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{LegacyWallet, MigrationStats, WalletMeta};
use crate::error::CashResult;
use crate::ledger::entry::{LedgerEntryInput, NewLedgerEntry, RefType};
use crate::scope::{Actor, ProjectScope};
use crate::store::LedgerStore;

/// Maximum number of migrated scopes remembered in-process.
const MIGRATED_CACHE_CAPACITY: u64 = 10_000;

/// Result of [`MigrationCoordinator::ensure_migrated`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "stats", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// The flag was already set; nothing was done.
    AlreadyMigrated,
    /// Ledger entries already existed; only the flag was set.
    AdoptedExistingLedger,
    /// Legacy totals were converted into synthetic entries.
    Migrated(MigrationStats),
    /// Another caller committed first; this call wrote nothing.
    LostRace,
}

/// What a migration commit writes in one atomic unit.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationPlan {
    /// The meta record with `migrated = true`.
    pub meta: WalletMeta,
    /// Synthetic adjustment entries (at most one credit and one debit).
    pub entries: Vec<NewLedgerEntry>,
}

impl MigrationPlan {
    /// The outcome to report if this plan commits.
    #[must_use]
    pub fn outcome(&self) -> MigrationOutcome {
        match &self.meta.stats {
            Some(stats) if stats.adopted_existing_ledger => MigrationOutcome::AdoptedExistingLedger,
            Some(stats) => MigrationOutcome::Migrated(stats.clone()),
            None => MigrationOutcome::AdoptedExistingLedger,
        }
    }
}

/// Idempotency key of a synthetic migration entry.
#[must_use]
pub fn migration_key(scope: &ProjectScope, side: &str) -> String {
    format!("migration:{}:{side}", scope.project_id)
}

/// Plans the migration of a project that is not yet flagged as migrated.
///
/// # Errors
///
/// Returns `MissingScope` if the scope is incomplete.
pub fn plan_migration(
    scope: ProjectScope,
    actor: &Actor,
    has_entries: bool,
    legacy: &[LegacyWallet],
    now: DateTime<Utc>,
) -> CashResult<MigrationPlan> {
    scope.validate()?;

    if has_entries {
        let stats = MigrationStats {
            adopted_existing_ledger: true,
            ..MigrationStats::default()
        };
        return Ok(MigrationPlan {
            meta: WalletMeta::migrated(scope, stats, now),
            entries: Vec::new(),
        });
    }

    let received: Decimal = legacy.iter().map(|w| w.cash_received).sum();
    let paid_out: Decimal = legacy.iter().map(|w| w.cash_paid_out).sum();

    let mut entries = Vec::with_capacity(2);
    if received > Decimal::ZERO {
        let input = LedgerEntryInput::credit(received, "Opening balance migrated from legacy wallet")
            .with_ref_type(RefType::Adjustment)
            .with_idempotency_key(migration_key(&scope, "credit"))
            .with_meta("legacyWallets", legacy.len());
        entries.push(NewLedgerEntry::build(scope, actor.clone(), input, now)?);
    }
    if paid_out > Decimal::ZERO {
        let input = LedgerEntryInput::debit(paid_out, "Payouts migrated from legacy wallet")
            .with_ref_type(RefType::Adjustment)
            .with_idempotency_key(migration_key(&scope, "debit"))
            .with_meta("legacyWallets", legacy.len());
        entries.push(NewLedgerEntry::build(scope, actor.clone(), input, now)?);
    }

    let stats = MigrationStats {
        legacy_wallets: legacy.len(),
        legacy_received: received,
        legacy_paid_out: paid_out,
        entries_created: entries.len(),
        adopted_existing_ledger: false,
    };

    Ok(MigrationPlan {
        meta: WalletMeta::migrated(scope, stats, now),
        entries,
    })
}

/// Lazily migrates projects on first use.
///
/// The migrated flag is monotonic, so scopes seen as migrated are remembered
/// and later calls skip the store round trip.
pub struct MigrationCoordinator<S: ?Sized> {
    store: Arc<S>,
    migrated: Cache<ProjectScope, ()>,
}

impl<S: ?Sized> Clone for MigrationCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            migrated: self.migrated.clone(),
        }
    }
}

impl<S: LedgerStore + ?Sized> MigrationCoordinator<S> {
    /// Creates a coordinator over the given store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            migrated: Cache::new(MIGRATED_CACHE_CAPACITY),
        }
    }

    /// Ensures the project's legacy wallet has been folded into the ledger.
    ///
    /// Safe to call concurrently and repeatedly: the meta write is the only
    /// guard, and a caller that loses the race writes nothing.
    ///
    /// # Errors
    ///
    /// Returns `MissingScope` for incomplete scopes and propagates store errors.
    pub async fn ensure_migrated(
        &self,
        scope: ProjectScope,
        actor: &Actor,
    ) -> CashResult<MigrationOutcome> {
        scope.validate()?;

        if self.migrated.contains_key(&scope) {
            return Ok(MigrationOutcome::AlreadyMigrated);
        }

        if let Some(meta) = self.store.wallet_meta(scope).await? {
            if meta.migrated {
                self.migrated.insert(scope, ());
                return Ok(MigrationOutcome::AlreadyMigrated);
            }
        }

        let has_entries = self.store.has_entries(scope).await?;
        let legacy = if has_entries {
            Vec::new()
        } else {
            self.store.legacy_wallets(scope).await?
        };

        let plan = plan_migration(scope, actor, has_entries, &legacy, Utc::now())?;
        let outcome = plan.outcome();

        let committed = self.store.commit_migration(plan).await?;
        self.migrated.insert(scope, ());

        if committed {
            info!(scope = %scope, outcome = ?outcome, "Wallet migrated to ledger");
            Ok(outcome)
        } else {
            debug!(scope = %scope, "Wallet migration already committed by another caller");
            Ok(MigrationOutcome::LostRace)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::EntryType;
    use crate::store::MemoryStore;
    use mavuno_shared::types::{CompanyId, ProjectId, UserId};
    use rust_decimal_macros::dec;

    fn scope() -> ProjectScope {
        ProjectScope::new(CompanyId::new(), ProjectId::new())
    }

    fn actor() -> Actor {
        Actor::new(UserId::new(), "Njeri")
    }

    fn legacy(scope: ProjectScope, received: Decimal, paid_out: Decimal) -> LegacyWallet {
        LegacyWallet {
            company_id: scope.company_id,
            project_id: scope.project_id,
            cash_received: received,
            cash_paid_out: paid_out,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_plan_sums_legacy_wallets() {
        let scope = scope();
        let wallets = [
            legacy(scope, dec!(10000), dec!(4000)),
            legacy(scope, dec!(2500), dec!(0)),
        ];

        let plan = plan_migration(scope, &actor(), false, &wallets, Utc::now()).unwrap();

        assert_eq!(plan.entries.len(), 2);
        assert_eq!(plan.entries[0].input.entry_type, EntryType::Credit);
        assert_eq!(plan.entries[0].input.amount, dec!(12500));
        assert_eq!(plan.entries[1].input.entry_type, EntryType::Debit);
        assert_eq!(plan.entries[1].input.amount, dec!(4000));
        assert!(plan.entries.iter().all(|e| e.input.ref_type == RefType::Adjustment));
        assert_eq!(
            plan.outcome(),
            MigrationOutcome::Migrated(MigrationStats {
                legacy_wallets: 2,
                legacy_received: dec!(12500),
                legacy_paid_out: dec!(4000),
                entries_created: 2,
                adopted_existing_ledger: false,
            })
        );
    }

    #[test]
    fn test_plan_skips_zero_sides() {
        let scope = scope();
        let wallets = [legacy(scope, dec!(0), dec!(300))];

        let plan = plan_migration(scope, &actor(), false, &wallets, Utc::now()).unwrap();

        assert_eq!(plan.entries.len(), 1);
        assert_eq!(plan.entries[0].input.entry_type, EntryType::Debit);
    }

    #[test]
    fn test_plan_without_legacy_creates_nothing() {
        let plan = plan_migration(scope(), &actor(), false, &[], Utc::now()).unwrap();
        assert!(plan.entries.is_empty());
        assert!(plan.meta.migrated);
    }

    #[test]
    fn test_plan_adopts_existing_ledger() {
        let scope = scope();
        let wallets = [legacy(scope, dec!(100), dec!(0))];

        let plan = plan_migration(scope, &actor(), true, &wallets, Utc::now()).unwrap();

        assert!(plan.entries.is_empty());
        assert_eq!(plan.outcome(), MigrationOutcome::AdoptedExistingLedger);
    }

    #[tokio::test]
    async fn test_ensure_migrated_twice_creates_one_pair() {
        let store = Arc::new(MemoryStore::new());
        let scope = scope();
        store
            .seed_legacy_wallet(legacy(scope, dec!(5000), dec!(1200)))
            .await;
        let coordinator = MigrationCoordinator::new(Arc::clone(&store));

        let first = coordinator.ensure_migrated(scope, &actor()).await.unwrap();
        assert!(matches!(first, MigrationOutcome::Migrated(_)));

        // A fresh coordinator has no in-process memory and must consult the flag.
        let second = MigrationCoordinator::new(Arc::clone(&store))
            .ensure_migrated(scope, &actor())
            .await
            .unwrap();
        assert_eq!(second, MigrationOutcome::AlreadyMigrated);

        let entries = store.entries_for(scope).await;
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_migrate_once() {
        let store = Arc::new(MemoryStore::new());
        let scope = scope();
        store
            .seed_legacy_wallet(legacy(scope, dec!(800), dec!(0)))
            .await;

        let a = MigrationCoordinator::new(Arc::clone(&store));
        let b = MigrationCoordinator::new(Arc::clone(&store));
        let actor = actor();
        let (ra, rb) = tokio::join!(
            a.ensure_migrated(scope, &actor),
            b.ensure_migrated(scope, &actor)
        );

        let outcomes = [ra.unwrap(), rb.unwrap()];
        let migrated = outcomes
            .iter()
            .filter(|o| matches!(o, MigrationOutcome::Migrated(_)))
            .count();
        assert_eq!(migrated, 1);
        assert_eq!(store.entries_for(scope).await.len(), 1);
    }

    #[tokio::test]
    async fn test_existing_ledger_is_adopted() {
        let store = Arc::new(MemoryStore::new());
        let scope = scope();
        store
            .seed_legacy_wallet(legacy(scope, dec!(999), dec!(0)))
            .await;
        store
            .seed_entry(NewLedgerEntry::build(
                scope,
                actor(),
                LedgerEntryInput::credit(dec!(50), "early entry"),
                Utc::now(),
            )
            .unwrap())
            .await;

        let outcome = MigrationCoordinator::new(Arc::clone(&store))
            .ensure_migrated(scope, &actor())
            .await
            .unwrap();

        assert_eq!(outcome, MigrationOutcome::AdoptedExistingLedger);
        assert_eq!(store.entries_for(scope).await.len(), 1);
    }
}
