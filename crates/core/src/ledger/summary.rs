//! Order-independent wallet summary.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::entry::{EntryType, LedgerEntry};

/// Running cash position of a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSummary {
    /// Sum of all credits.
    pub received: Decimal,
    /// Sum of all debits.
    pub paid_out: Decimal,
    /// `received - paid_out`.
    pub balance: Decimal,
    /// Number of entries folded.
    pub entry_count: usize,
}

impl WalletSummary {
    /// Folds a set of entries into a summary.
    ///
    /// Only addition is involved, so the result is the same for every
    /// permutation of `entries`. Timestamps are ignored.
    #[must_use]
    pub fn fold<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Self {
        entries.into_iter().fold(Self::default(), |acc, e| acc.apply(e))
    }

    /// Adds a single entry.
    #[must_use]
    pub fn apply(mut self, entry: &LedgerEntry) -> Self {
        match entry.entry_type {
            EntryType::Credit => {
                self.received += entry.amount;
                self.balance += entry.amount;
            }
            EntryType::Debit => {
                self.paid_out += entry.amount;
                self.balance -= entry.amount;
            }
        }
        self.entry_count += 1;
        self
    }

    /// Returns true when a debit of `amount` fits in the balance.
    #[must_use]
    pub fn covers(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}
