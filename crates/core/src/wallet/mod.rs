//! Legacy wallet migration.
//!
//! Projects that predate the ledger carry a mutable aggregate wallet. The
//! first ledger operation on such a project folds the aggregate into at most
//! one synthetic credit and one synthetic debit, then sets a monotonic flag.

pub mod migration;
pub mod types;

pub use migration::{MigrationCoordinator, MigrationOutcome, MigrationPlan, plan_migration};
pub use types::{LegacyWallet, MigrationStats, WalletMeta};
