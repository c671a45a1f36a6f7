//! `SeaORM` Entity for harvest collections.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "harvest_collections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub company_id: Uuid,
    pub project_id: Uuid,
    pub crop_type: String,
    pub name: String,
    pub harvest_date: Date,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price_per_kg_picker: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_harvest_kg: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_picker_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub price_per_kg_buyer: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub total_revenue: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub profit: Option<Decimal>,
    pub status: String,
    pub harvest_id: Option<Uuid>,
    pub buyer_paid_at: Option<DateTimeWithTimeZone>,
    pub created_by: Uuid,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::pickers::Entity")]
    Pickers,
    #[sea_orm(has_many = "super::weigh_entries::Entity")]
    WeighEntries,
}

impl Related<super::pickers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Pickers.def()
    }
}

impl Related<super::weigh_entries::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WeighEntries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
