//! Wallet metadata and legacy aggregate types.

use chrono::{DateTime, Utc};
use mavuno_shared::types::{CompanyId, ProjectId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::scope::ProjectScope;

/// Per-project wallet metadata. `migrated` flips false to true exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletMeta {
    /// Owning company.
    pub company_id: CompanyId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Whether the legacy aggregate has been folded into the ledger.
    pub migrated: bool,
    /// When the migration committed.
    pub migrated_at: Option<DateTime<Utc>>,
    /// What the migration did.
    pub stats: Option<MigrationStats>,
}

impl WalletMeta {
    /// Builds the migrated meta record for a scope.
    #[must_use]
    pub fn migrated(scope: ProjectScope, stats: MigrationStats, at: DateTime<Utc>) -> Self {
        Self {
            company_id: scope.company_id,
            project_id: scope.project_id,
            migrated: true,
            migrated_at: Some(at),
            stats: Some(stats),
        }
    }

    /// Returns the scope of this meta record.
    #[must_use]
    pub fn scope(&self) -> ProjectScope {
        ProjectScope::new(self.company_id, self.project_id)
    }
}

/// Figures recorded when a project's legacy wallet is migrated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStats {
    /// Number of legacy wallet records read.
    pub legacy_wallets: usize,
    /// Sum of legacy cash received.
    pub legacy_received: Decimal,
    /// Sum of legacy cash paid out.
    pub legacy_paid_out: Decimal,
    /// Synthetic entries appended (0 to 2).
    pub entries_created: usize,
    /// True when an existing ledger was adopted instead of synthesizing entries.
    pub adopted_existing_ledger: bool,
}

/// Legacy mutable aggregate wallet. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyWallet {
    /// Owning company.
    pub company_id: CompanyId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Aggregate cash received.
    pub cash_received: Decimal,
    /// Aggregate cash paid out.
    pub cash_paid_out: Decimal,
    /// Last update of the aggregate.
    pub updated_at: DateTime<Utc>,
}
