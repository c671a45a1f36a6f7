//! Degraded settlement when the store cannot run transactions.
//!
//! Computes the same fields as the atomic path from last-known state and
//! writes them with plain writes. The Harvest/Sale pair is attempted only
//! when no `harvest_id` is known locally; the reconciliation sweep repairs
//! any gap or duplicate this leaves behind.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::service::{CollectionService, SettlementOutcome};
use super::settlement::{HarvestLink, SettlementCommand, SettlementSnapshot, plan_settlement};
use super::types::HarvestCollection;
use crate::error::CashResult;
use crate::scope::Actor;
use crate::store::CashStore;

impl<S: CashStore + ?Sized> CollectionService<S> {
    /// Settles a collection with non-atomic writes.
    ///
    /// The collection-field write must succeed. The Harvest/Sale and ledger
    /// writes are best-effort: failures are logged and ignored. With
    /// `credit_allowed == false` no ledger credit is attempted.
    pub(crate) async fn settle_degraded(
        &self,
        last_known: HarvestCollection,
        price_per_kg_buyer: Decimal,
        mark_buyer_paid: bool,
        actor: &Actor,
        credit_allowed: bool,
    ) -> CashResult<SettlementOutcome> {
        let collection = self.cache.collection(last_known.id).unwrap_or(last_known);
        let collection_id = collection.id;

        let pickers = match self.store.pickers(collection_id).await {
            Ok(pickers) => {
                self.cache.put_pickers(collection_id, &pickers);
                pickers
            }
            Err(e) => match self.cache.pickers(collection_id) {
                Some(cached) => cached,
                None => return Err(e),
            },
        };

        let known_harvest = collection.harvest_id;
        let snapshot = SettlementSnapshot {
            collection,
            pickers,
            linked_harvests: Vec::new(),
            credit_recorded: false,
        };
        let command = SettlementCommand::SetBuyerPrice {
            price_per_kg_buyer,
            mark_buyer_paid,
            actor: actor.clone(),
            at: Utc::now(),
        };
        let plan = plan_settlement(&snapshot, &command, &self.policy)?;

        let mut settled = plan.collection.clone();
        settled.harvest_id = known_harvest;
        if plan.collection_changed {
            self.store.write_settlement_fields(&settled).await?;
        }

        let mut created_harvest = None;
        if let HarvestLink::Create(draft) = &plan.harvest_link {
            let harvest_id = draft.harvest.id;
            match self
                .store
                .insert_harvest_sale(draft.harvest.clone(), draft.sale.clone())
                .await
            {
                Ok(()) => match self.store.set_harvest_id(collection_id, harvest_id).await {
                    Ok(true) => {
                        settled.harvest_id = Some(harvest_id);
                        created_harvest = Some(harvest_id);
                    }
                    Ok(false) => {
                        warn!(collection_id = %collection_id, harvest_id = %harvest_id, "Collection already linked, harvest left for the sync sweep");
                    }
                    Err(e) => {
                        warn!(collection_id = %collection_id, harvest_id = %harvest_id, error = %e, "Failed to link harvest, left for the sync sweep");
                    }
                },
                Err(e) => {
                    warn!(collection_id = %collection_id, error = %e, "Failed to create Harvest/Sale, left for the sync sweep");
                }
            }
        }

        let mut credited = false;
        if let Some(credit) = plan.ledger_credit.clone() {
            if credit_allowed {
                let scope = credit.scope;
                match self.store.append_entry(credit).await {
                    Ok(outcome) => {
                        credited = !outcome.is_duplicate();
                        self.ledger.projection().invalidate(&scope);
                    }
                    Err(e) => {
                        warn!(collection_id = %collection_id, error = %e, "Buyer-payment credit not recorded");
                    }
                }
            } else {
                warn!(collection_id = %collection_id, "Buyer-payment credit skipped, wallet migration not confirmed");
            }
        }

        self.cache.put_collection(&settled);
        info!(
            collection_id = %collection_id,
            status = %settled.status,
            harvest_id = ?settled.harvest_id,
            credited,
            "Collection settled in degraded mode"
        );

        Ok(SettlementOutcome {
            collection: settled,
            created_harvest,
            credited,
            degraded: true,
        })
    }
}
