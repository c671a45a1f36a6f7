//! `SeaORM` Entity for pickers.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "pickers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub collection_id: Uuid,
    pub picker_number: i32,
    pub picker_name: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_kg: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_pay: Decimal,
    pub is_paid: bool,
    pub paid_at: Option<DateTimeWithTimeZone>,
    pub payment_batch_id: Option<Uuid>,
    pub payout_funding: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::harvest_collections::Entity",
        from = "Column::CollectionId",
        to = "super::harvest_collections::Column::Id"
    )]
    HarvestCollections,
}

impl Related<super::harvest_collections::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::HarvestCollections.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
