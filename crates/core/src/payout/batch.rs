//! Batch payout planning.
//!
//! Runs inside the store's atomic unit against state read in that unit.
//! Pay is re-derived from the weigh entries read in the unit, never taken
//! from the pickers' cached totals.

use rust_decimal::Decimal;

use super::types::{PaymentBatch, PayoutCommand, PayoutPlan, PayoutSnapshot};
use crate::collection::{CollectionTotals, Picker};
use crate::error::{CashError, CashResult};
use crate::ledger::{LedgerEntryInput, NewLedgerEntry, RefType};

/// Pickers in `pickers` that still need paying.
#[must_use]
pub fn eligible_pickers(pickers: &[Picker]) -> Vec<&Picker> {
    pickers.iter().filter(|p| !p.is_paid).collect()
}

/// Decides what a batch payout writes.
///
/// # Errors
///
/// - `NonPositiveAmount` if the requested total is not positive
/// - `PickerNotFound` if a listed picker is not part of the collection
/// - `NoEligiblePickers` if every listed picker is already paid
/// - `PayoutAmountMismatch` if the total differs from the eligible pickers'
///   pay as re-derived from their weigh entries
/// - `AmountOutOfRange` if the re-derived totals cannot be stored
/// - `InsufficientFunds` if the balance does not cover the total
/// - `BatchCollectionMismatch` if the batch id was committed for another collection
pub fn plan_payout(snapshot: &PayoutSnapshot, command: &PayoutCommand) -> CashResult<PayoutPlan> {
    if let Some(existing) = &snapshot.existing_batch {
        if existing.collection_id != snapshot.collection.id {
            return Err(CashError::BatchCollectionMismatch {
                batch_id: existing.id,
                collection_id: existing.collection_id,
            });
        }
        return Ok(PayoutPlan::Replay(existing.clone()));
    }

    if command.total_amount <= Decimal::ZERO {
        return Err(CashError::NonPositiveAmount(command.total_amount));
    }
    if let Some(missing) = snapshot.missing.first() {
        return Err(CashError::PickerNotFound(*missing));
    }

    let eligible = eligible_pickers(&snapshot.pickers);
    if eligible.is_empty() {
        return Err(CashError::NoEligiblePickers);
    }

    let totals = CollectionTotals::derive(
        snapshot.collection.price_per_kg_picker,
        &snapshot.pickers,
        &snapshot.weigh_entries,
    )?;
    let expected: Decimal = eligible
        .iter()
        .map(|p| totals.picker(p.id).map_or(Decimal::ZERO, |t| t.total_pay))
        .sum();
    if expected != command.total_amount {
        return Err(CashError::PayoutAmountMismatch {
            expected,
            requested: command.total_amount,
        });
    }

    if snapshot.balance < command.total_amount {
        return Err(CashError::InsufficientFunds {
            available: snapshot.balance,
            requested: command.total_amount,
        });
    }

    let collection = &snapshot.collection;
    let batch = PaymentBatch {
        id: command.batch_id,
        company_id: collection.company_id,
        collection_id: collection.id,
        picker_ids: eligible.iter().map(|p| p.id).collect(),
        total_amount: command.total_amount,
        paid_at: command.at,
    };

    let input = LedgerEntryInput::debit(
        command.total_amount,
        format!("Picker payout: {}", collection.name),
    )
    .with_ref(RefType::Picker, batch.id.to_string())
    .with_idempotency_key(batch.idempotency_key())
    .with_meta("collectionId", collection.id.to_string())
    .with_meta("pickerCount", batch.picker_ids.len());

    let debit = NewLedgerEntry::build(collection.scope(), command.actor.clone(), input, command.at)?;

    Ok(PayoutPlan::Commit {
        batch,
        debit,
        totals,
    })
}
