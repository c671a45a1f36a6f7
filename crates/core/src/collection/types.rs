//! Harvest collection domain types.

use chrono::{DateTime, NaiveDate, Utc};
use mavuno_shared::types::{
    CollectionId, CompanyId, HarvestId, PaymentBatchId, PickerId, ProjectId, SaleId, UserId,
    WeighEntryId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::payout::PayoutFunding;
use crate::scope::ProjectScope;

/// Lifecycle status of a harvest collection.
///
/// The valid transitions are:
/// - Collecting → Sold (buyer price set)
/// - Collecting | Sold | PayoutComplete → Closed (buyer paid, all pickers paid)
/// - Collecting | Sold → PayoutComplete (informational, all pickers paid)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    /// Pickers are being weighed in.
    Collecting,
    /// A buyer price has been agreed.
    Sold,
    /// Every picker has been paid.
    PayoutComplete,
    /// The buyer has paid; financial records exist.
    Closed,
}

impl CollectionStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collecting => "collecting",
            Self::Sold => "sold",
            Self::PayoutComplete => "payout_complete",
            Self::Closed => "closed",
        }
    }

    /// Parses a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "collecting" => Some(Self::Collecting),
            "sold" => Some(Self::Sold),
            "payout_complete" => Some(Self::PayoutComplete),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Returns true once the collection is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A day's harvest of one crop within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestCollection {
    /// Unique identifier.
    pub id: CollectionId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Crop identifier, e.g. `french_beans`.
    pub crop_type: String,
    /// Display name.
    pub name: String,
    /// Day of the harvest.
    pub harvest_date: NaiveDate,
    /// Rate paid to pickers per kilogram.
    pub price_per_kg_picker: Decimal,
    /// Sum of all weigh entries.
    pub total_harvest_kg: Decimal,
    /// Sum of all pickers' pay.
    pub total_picker_cost: Decimal,
    /// Rate the buyer pays per kilogram.
    pub price_per_kg_buyer: Option<Decimal>,
    /// `total_harvest_kg * price_per_kg_buyer`, rounded.
    pub total_revenue: Option<Decimal>,
    /// `total_revenue - total_picker_cost`.
    pub profit: Option<Decimal>,
    /// Lifecycle status.
    pub status: CollectionStatus,
    /// Linked harvest record. Set at most once.
    pub harvest_id: Option<HarvestId>,
    /// When the buyer paid.
    pub buyer_paid_at: Option<DateTime<Utc>>,
    /// Who opened the collection.
    pub created_by: UserId,
    /// When the collection was opened.
    pub created_at: DateTime<Utc>,
}

impl HarvestCollection {
    /// Returns the project scope of this collection.
    #[must_use]
    pub fn scope(&self) -> ProjectScope {
        ProjectScope::new(self.company_id, self.project_id)
    }
}

/// Fields for opening a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCollection {
    /// Crop identifier.
    pub crop_type: String,
    /// Display name.
    pub name: String,
    /// Day of the harvest.
    pub harvest_date: NaiveDate,
    /// Rate paid to pickers per kilogram.
    pub price_per_kg_picker: Decimal,
}

/// A field worker registered on a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Picker {
    /// Unique identifier.
    pub id: PickerId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Owning collection.
    pub collection_id: CollectionId,
    /// Number on the picker's tag, unique within the collection.
    pub picker_number: u32,
    /// Name.
    pub picker_name: String,
    /// Sum of this picker's weigh entries.
    pub total_kg: Decimal,
    /// `total_kg * price_per_kg_picker`, rounded.
    pub total_pay: Decimal,
    /// Whether the picker has been paid.
    pub is_paid: bool,
    /// When the picker was paid.
    pub paid_at: Option<DateTime<Utc>>,
    /// Batch the payout belongs to, if paid through a batch.
    pub payment_batch_id: Option<PaymentBatchId>,
    /// How the payout was funded.
    pub payout_funding: Option<PayoutFunding>,
}

/// One weighing of one picker's load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeighEntry {
    /// Unique identifier.
    pub id: WeighEntryId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Picker who brought the load.
    pub picker_id: PickerId,
    /// Owning collection.
    pub collection_id: CollectionId,
    /// Weight in kilograms.
    pub weight_kg: Decimal,
    /// Trip number of the day.
    pub trip_number: u32,
    /// When the load was weighed.
    pub recorded_at: DateTime<Utc>,
}

/// Harvest record written into the Harvest/Sale domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestRecord {
    /// Unique identifier.
    pub id: HarvestId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Crop identifier.
    pub crop_type: String,
    /// Day of the harvest.
    pub harvest_date: NaiveDate,
    /// Quantity harvested.
    pub quantity_kg: Decimal,
    /// Collection the record was derived from.
    pub source_collection_id: CollectionId,
    /// Who triggered the creation.
    pub created_by: UserId,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

/// Sale record linked to a [`HarvestRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    /// Unique identifier.
    pub id: SaleId,
    /// Linked harvest.
    pub harvest_id: HarvestId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Quantity sold.
    pub quantity_kg: Decimal,
    /// Buyer price per kilogram.
    pub price_per_kg: Decimal,
    /// Total sale amount.
    pub total_amount: Decimal,
    /// Day of the sale.
    pub sale_date: NaiveDate,
    /// Collection the record was derived from.
    pub source_collection_id: CollectionId,
}

/// A harvest and its sale, created together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarvestSaleDraft {
    /// The harvest.
    pub harvest: HarvestRecord,
    /// The sale referencing it.
    pub sale: SaleRecord,
}

impl HarvestSaleDraft {
    /// Derives the harvest/sale pair from a closed collection.
    #[must_use]
    pub fn from_collection(
        collection: &HarvestCollection,
        created_by: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        let harvest = HarvestRecord {
            id: HarvestId::new(),
            company_id: collection.company_id,
            project_id: collection.project_id,
            crop_type: collection.crop_type.clone(),
            harvest_date: collection.harvest_date,
            quantity_kg: collection.total_harvest_kg,
            source_collection_id: collection.id,
            created_by,
            created_at: at,
        };
        let sale = SaleRecord {
            id: SaleId::new(),
            harvest_id: harvest.id,
            company_id: collection.company_id,
            project_id: collection.project_id,
            quantity_kg: collection.total_harvest_kg,
            price_per_kg: collection.price_per_kg_buyer.unwrap_or_default(),
            total_amount: collection.total_revenue.unwrap_or_default(),
            sale_date: at.date_naive(),
            source_collection_id: collection.id,
        };
        Self { harvest, sale }
    }
}

/// A collection with its pickers, as returned to readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    /// The collection.
    pub collection: HarvestCollection,
    /// Its pickers, ordered by picker number.
    pub pickers: Vec<Picker>,
}
