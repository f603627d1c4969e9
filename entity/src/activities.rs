use sea_orm::prelude::{DateTimeWithTimeZone, *};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TITLE_MAX_CHARS: u32 = 200;
pub const BODY_MAX_CHARS: u32 = 2000;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "activities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub target_type: TargetType,
    #[sea_orm(indexed)]
    pub target_id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub body: String,
    pub actor_id: Option<Uuid>,
    pub occurred_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum TargetType {
    #[sea_orm(string_value = "deal")]
    Deal,
    #[sea_orm(string_value = "project")]
    Project,
}

impl ActiveModelBehavior for ActiveModel {}
