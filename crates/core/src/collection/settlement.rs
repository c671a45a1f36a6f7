//! Collection settlement planning.
//!
//! [`plan_settlement`] is evaluated by the store inside its atomic unit
//! against a snapshot read in that same unit, so the picker-paid check and
//! the `harvest_id` guard see consistent state. The store applies the
//! returned plan and commits.

use chrono::{DateTime, Utc};
use mavuno_shared::types::HarvestId;
use rust_decimal::Decimal;
use std::collections::BTreeSet;

use super::totals::sale_figures;
use super::types::{CollectionStatus, HarvestCollection, HarvestRecord, HarvestSaleDraft, Picker};
use crate::error::{CashError, CashResult};
use crate::ledger::{LedgerEntryInput, NewLedgerEntry, RefType};
use crate::scope::Actor;

/// Which crop types produce Harvest/Sale records when a collection closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSalePolicy {
    crop_types: BTreeSet<String>,
}

impl HarvestSalePolicy {
    /// Creates a policy from crop type names (case-insensitive).
    #[must_use]
    pub fn new<I, T>(crop_types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            crop_types: crop_types
                .into_iter()
                .map(|c| c.as_ref().trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Returns true if closed collections of this crop produce records.
    #[must_use]
    pub fn participates(&self, crop_type: &str) -> bool {
        self.crop_types.contains(&crop_type.trim().to_lowercase())
    }
}

/// Idempotency key of the buyer-payment credit for a collection.
#[must_use]
pub fn buyer_payment_key(collection: &HarvestCollection) -> String {
    format!("collection:{}:buyer-payment", collection.id)
}

/// A settlement request.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementCommand {
    /// Set the buyer price, and close the collection if the buyer paid.
    SetBuyerPrice {
        /// Buyer price per kilogram.
        price_per_kg_buyer: Decimal,
        /// Close the collection and record the buyer's payment.
        mark_buyer_paid: bool,
        /// Who records the settlement.
        actor: Actor,
        /// Write time.
        at: DateTime<Utc>,
    },
    /// Re-apply the `harvest_id` guard on a closed collection and record a
    /// missing buyer-payment credit.
    SyncHarvestSale {
        /// Who runs the sweep.
        actor: Actor,
        /// Write time.
        at: DateTime<Utc>,
    },
}

impl SettlementCommand {
    fn actor(&self) -> &Actor {
        match self {
            Self::SetBuyerPrice { actor, .. } | Self::SyncHarvestSale { actor, .. } => actor,
        }
    }

    fn at(&self) -> DateTime<Utc> {
        match self {
            Self::SetBuyerPrice { at, .. } | Self::SyncHarvestSale { at, .. } => *at,
        }
    }
}

/// State read inside the settlement unit.
#[derive(Debug, Clone)]
pub struct SettlementSnapshot {
    /// The collection.
    pub collection: HarvestCollection,
    /// Its pickers.
    pub pickers: Vec<Picker>,
    /// Harvest records whose source is this collection.
    pub linked_harvests: Vec<HarvestRecord>,
    /// Whether the collection's buyer-payment credit is already in the ledger.
    pub credit_recorded: bool,
}

/// What to do about the collection's Harvest/Sale pair.
#[derive(Debug, Clone, PartialEq)]
pub enum HarvestLink {
    /// Nothing to do.
    Unchanged,
    /// Create a new pair and link it.
    Create(Box<HarvestSaleDraft>),
    /// Link a harvest that already exists for the collection.
    Adopt(HarvestId),
    /// The crop does not participate in the Harvest/Sale domain.
    NotApplicable,
}

/// What a settlement unit writes.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementPlan {
    /// The collection after the operation.
    pub collection: HarvestCollection,
    /// Whether `collection` differs from what was read.
    pub collection_changed: bool,
    /// Harvest/Sale action.
    pub harvest_link: HarvestLink,
    /// Duplicate harvests (and their sales) to delete.
    pub retire_harvests: Vec<HarvestId>,
    /// Buyer-payment credit to append.
    pub ledger_credit: Option<NewLedgerEntry>,
}

impl SettlementPlan {
    /// Returns true if the plan writes nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.collection_changed
            && matches!(self.harvest_link, HarvestLink::Unchanged | HarvestLink::NotApplicable)
            && self.retire_harvests.is_empty()
            && self.ledger_credit.is_none()
    }

    /// The harvest created by this plan, if any.
    #[must_use]
    pub fn created_harvest(&self) -> Option<HarvestId> {
        match &self.harvest_link {
            HarvestLink::Create(draft) => Some(draft.harvest.id),
            _ => None,
        }
    }

    fn unchanged(collection: HarvestCollection) -> Self {
        Self {
            collection,
            collection_changed: false,
            harvest_link: HarvestLink::Unchanged,
            retire_harvests: Vec::new(),
            ledger_credit: None,
        }
    }
}

/// Decides what a settlement unit writes.
///
/// # Errors
///
/// - `NonPositivePrice` for a buyer price `<= 0`
/// - `InvalidTransition` when pricing a closed collection without closing it
/// - `UnpaidPickers` when closing while any picker is unpaid
/// - `AmountOutOfRange` when revenue or profit cannot be stored
pub fn plan_settlement(
    snapshot: &SettlementSnapshot,
    command: &SettlementCommand,
    policy: &HarvestSalePolicy,
) -> CashResult<SettlementPlan> {
    let current = &snapshot.collection;

    match command {
        SettlementCommand::SyncHarvestSale { .. } => {
            if !current.status.is_closed() {
                return Ok(SettlementPlan::unchanged(current.clone()));
            }
            let plan = SettlementPlan {
                ledger_credit: outstanding_credit(current, snapshot, command)?,
                ..SettlementPlan::unchanged(current.clone())
            };
            Ok(apply_harvest_guard(plan, snapshot, command, policy))
        }
        SettlementCommand::SetBuyerPrice {
            price_per_kg_buyer,
            mark_buyer_paid,
            at,
            ..
        } => {
            if *price_per_kg_buyer <= Decimal::ZERO {
                return Err(CashError::NonPositivePrice(*price_per_kg_buyer));
            }

            if current.status.is_closed() {
                if !*mark_buyer_paid {
                    return Err(CashError::InvalidTransition {
                        from: CollectionStatus::Closed,
                        to: CollectionStatus::Sold,
                    });
                }
                // Already closed: repair the credit and the harvest link only.
                let plan = SettlementPlan {
                    ledger_credit: outstanding_credit(current, snapshot, command)?,
                    ..SettlementPlan::unchanged(current.clone())
                };
                return Ok(apply_harvest_guard(plan, snapshot, command, policy));
            }

            let figures = sale_figures(
                current.total_harvest_kg,
                *price_per_kg_buyer,
                current.total_picker_cost,
            )?;
            let mut next = current.clone();
            next.price_per_kg_buyer = Some(*price_per_kg_buyer);
            next.total_revenue = Some(figures.total_revenue);
            next.profit = Some(figures.profit);

            if !*mark_buyer_paid {
                next.status = CollectionStatus::Sold;
                let collection_changed = next != *current;
                return Ok(SettlementPlan {
                    collection_changed,
                    ..SettlementPlan::unchanged(next)
                });
            }

            let unpaid = snapshot.pickers.iter().filter(|p| !p.is_paid).count();
            if unpaid > 0 {
                return Err(CashError::UnpaidPickers {
                    collection_id: current.id,
                    unpaid,
                });
            }

            next.status = CollectionStatus::Closed;
            next.buyer_paid_at = Some(*at);

            let ledger_credit = outstanding_credit(&next, snapshot, command)?;
            let plan = SettlementPlan {
                collection_changed: true,
                ledger_credit,
                ..SettlementPlan::unchanged(next)
            };
            Ok(apply_harvest_guard(plan, snapshot, command, policy))
        }
    }
}

/// Links exactly one Harvest/Sale pair to a closed collection.
fn apply_harvest_guard(
    mut plan: SettlementPlan,
    snapshot: &SettlementSnapshot,
    command: &SettlementCommand,
    policy: &HarvestSalePolicy,
) -> SettlementPlan {
    if !policy.participates(&plan.collection.crop_type) {
        plan.harvest_link = HarvestLink::NotApplicable;
        return plan;
    }

    let keep = match plan.collection.harvest_id {
        Some(id) => id,
        None => {
            let earliest = snapshot
                .linked_harvests
                .iter()
                .min_by_key(|h| (h.created_at, h.id));
            match earliest {
                Some(harvest) => {
                    plan.collection.harvest_id = Some(harvest.id);
                    plan.collection_changed = true;
                    plan.harvest_link = HarvestLink::Adopt(harvest.id);
                    harvest.id
                }
                None => {
                    let draft = HarvestSaleDraft::from_collection(
                        &plan.collection,
                        command.actor().uid,
                        command.at(),
                    );
                    let id = draft.harvest.id;
                    plan.collection.harvest_id = Some(id);
                    plan.collection_changed = true;
                    plan.harvest_link = HarvestLink::Create(Box::new(draft));
                    id
                }
            }
        }
    };

    plan.retire_harvests = snapshot
        .linked_harvests
        .iter()
        .map(|h| h.id)
        .filter(|id| *id != keep)
        .collect();
    plan
}

fn outstanding_credit(
    collection: &HarvestCollection,
    snapshot: &SettlementSnapshot,
    command: &SettlementCommand,
) -> CashResult<Option<NewLedgerEntry>> {
    if snapshot.credit_recorded {
        return Ok(None);
    }
    let revenue = collection.total_revenue.unwrap_or_default();
    if revenue <= Decimal::ZERO {
        return Ok(None);
    }
    let input = LedgerEntryInput::credit(revenue, format!("Buyer payment: {}", collection.name))
        .with_ref(RefType::Collection, collection.id.to_string())
        .with_idempotency_key(buyer_payment_key(collection))
        .with_meta("cropType", collection.crop_type.clone());
    NewLedgerEntry::build(collection.scope(), command.actor().clone(), input, command.at()).map(Some)
}

/// Applies the informational `payout_complete` transition.
///
/// Returns `Ok(None)` when the collection is already `payout_complete`.
///
/// # Errors
///
/// - `InvalidTransition` on a closed collection
/// - `NoPickers` without pickers
/// - `UnpaidPickers` while any picker is unpaid
pub fn transition_payout_complete(
    collection: &HarvestCollection,
    pickers: &[Picker],
) -> CashResult<Option<CollectionStatus>> {
    match collection.status {
        CollectionStatus::PayoutComplete => return Ok(None),
        CollectionStatus::Closed => {
            return Err(CashError::InvalidTransition {
                from: CollectionStatus::Closed,
                to: CollectionStatus::PayoutComplete,
            });
        }
        CollectionStatus::Collecting | CollectionStatus::Sold => {}
    }
    if pickers.is_empty() {
        return Err(CashError::NoPickers(collection.id));
    }
    let unpaid = pickers.iter().filter(|p| !p.is_paid).count();
    if unpaid > 0 {
        return Err(CashError::UnpaidPickers {
            collection_id: collection.id,
            unpaid,
        });
    }
    Ok(Some(CollectionStatus::PayoutComplete))
}
