//! Picker payout domain types.

use chrono::{DateTime, Utc};
use mavuno_shared::types::{CollectionId, CompanyId, PaymentBatchId, PickerId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::collection::{CollectionTotals, HarvestCollection, Picker, WeighEntry};
use crate::ledger::NewLedgerEntry;
use crate::scope::Actor;

/// How a picker's payout was funded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutFunding {
    /// Paid through a batch that debited the project wallet.
    LedgerTracked,
    /// Paid in cash outside the wallet; no ledger debit exists.
    ExternallyFunded,
}

impl PayoutFunding {
    /// Returns the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LedgerTracked => "ledger_tracked",
            Self::ExternallyFunded => "externally_funded",
        }
    }

    /// Parses a funding kind from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ledger_tracked" => Some(Self::LedgerTracked),
            "externally_funded" => Some(Self::ExternallyFunded),
            _ => None,
        }
    }
}

impl fmt::Display for PayoutFunding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A group of picker payouts recorded as one wallet debit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentBatch {
    /// Caller-supplied id; doubles as the debit's idempotency key.
    pub id: PaymentBatchId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Collection the pickers belong to.
    pub collection_id: CollectionId,
    /// Pickers paid in this batch.
    pub picker_ids: Vec<PickerId>,
    /// Sum paid.
    pub total_amount: Decimal,
    /// When the batch was committed.
    pub paid_at: DateTime<Utc>,
}

impl PaymentBatch {
    /// The idempotency key of the batch's debit entry.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        format!("batch:{}", self.id)
    }
}

/// Request to pay a set of pickers in one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutCommand {
    /// Caller-supplied batch id.
    pub batch_id: PaymentBatchId,
    /// Collection the pickers belong to.
    pub collection_id: CollectionId,
    /// Pickers to pay.
    pub picker_ids: Vec<PickerId>,
    /// Amount the caller expects to pay out.
    pub total_amount: Decimal,
    /// Who records the payout.
    pub actor: Actor,
    /// Write time.
    pub at: DateTime<Utc>,
}

/// State read inside the payout unit.
#[derive(Debug, Clone)]
pub struct PayoutSnapshot {
    /// The collection.
    pub collection: HarvestCollection,
    /// A batch already committed under the same id.
    pub existing_batch: Option<PaymentBatch>,
    /// Listed pickers that belong to the collection.
    pub pickers: Vec<Picker>,
    /// Listed ids that are not pickers of the collection.
    pub missing: Vec<PickerId>,
    /// Every weigh entry of the collection, read after the pickers.
    pub weigh_entries: Vec<WeighEntry>,
    /// Wallet balance read in the same unit.
    pub balance: Decimal,
}

/// What a payout unit writes.
#[derive(Debug, Clone, PartialEq)]
pub enum PayoutPlan {
    /// The batch already exists; write nothing.
    Replay(PaymentBatch),
    /// Write the batch, flip the pickers, append the debit.
    Commit {
        /// The batch to insert.
        batch: PaymentBatch,
        /// The wallet debit.
        debit: NewLedgerEntry,
        /// Totals re-derived from the weigh entries; the batch's pickers
        /// and the collection are written with these.
        totals: CollectionTotals,
    },
}

impl PayoutPlan {
    /// The batch written or found.
    #[must_use]
    pub fn batch(&self) -> &PaymentBatch {
        match self {
            Self::Replay(batch) | Self::Commit { batch, .. } => batch,
        }
    }
}

/// Result of a batch payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    /// The batch.
    pub batch: PaymentBatch,
    /// True when the call replayed an existing batch.
    pub replayed: bool,
}

/// Result of a single cash payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashPaidOutcome {
    /// The picker was marked paid.
    Marked,
    /// The picker was already paid; nothing changed.
    AlreadyPaid,
}

/// Picker pay split by how it was funded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReconciliation {
    /// Pay covered by wallet debits.
    pub ledger_tracked: Decimal,
    /// Pay handed out in cash without a debit.
    pub externally_funded: Decimal,
    /// Pay still owed.
    pub unpaid: Decimal,
    /// Number of pickers paid through batches.
    pub ledger_tracked_pickers: usize,
    /// Number of pickers paid in cash.
    pub externally_funded_pickers: usize,
    /// Number of pickers still owed.
    pub unpaid_pickers: usize,
}

impl PayoutReconciliation {
    /// Splits the pickers' pay by funding.
    ///
    /// Paid pickers without a recorded funding count as ledger-tracked when
    /// they carry a batch id and as externally funded otherwise.
    #[must_use]
    pub fn from_pickers(pickers: &[Picker]) -> Self {
        let mut rec = Self::default();
        for picker in pickers {
            if !picker.is_paid {
                rec.unpaid += picker.total_pay;
                rec.unpaid_pickers += 1;
                continue;
            }
            let funding = picker.payout_funding.unwrap_or(if picker.payment_batch_id.is_some() {
                PayoutFunding::LedgerTracked
            } else {
                PayoutFunding::ExternallyFunded
            });
            match funding {
                PayoutFunding::LedgerTracked => {
                    rec.ledger_tracked += picker.total_pay;
                    rec.ledger_tracked_pickers += 1;
                }
                PayoutFunding::ExternallyFunded => {
                    rec.externally_funded += picker.total_pay;
                    rec.externally_funded_pickers += 1;
                }
            }
        }
        rec
    }
}
