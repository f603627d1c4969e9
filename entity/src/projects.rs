use sea_orm::prelude::{Date, DateTimeWithTimeZone, *};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deals;

pub const NAME_MAX_CHARS: u32 = 200;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "projects")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub deal_id: Option<Uuid>,
    pub company_id: Uuid,
    pub customer_id: Uuid,
    pub manager_id: Option<Uuid>,
    pub status: ProjectStatus,
    pub value_cents: i64,
    pub currency: String,
    pub start_date: Date,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "deals::Entity",
        from = "Column::DealId",
        to = "deals::Column::Id"
    )]
    Deal,
}

impl Related<deals::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Deal.def()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum ProjectStatus {
    #[sea_orm(string_value = "planning")]
    Planning,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl ActiveModelBehavior for ActiveModel {}
